//! Cached read path.
//!
//! Each logical read goes through [`ContentCache`]; on a miss the document is
//! fetched from the remote store when a repository is known, and from the
//! local mirror otherwise or when the remote fetch fails. Reads never fail:
//! when both sources are unusable the empty value is returned.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::auth::AllowListSource;
use crate::application::store::{DocumentStore, LocalMirror, StoreError};
use crate::cache::{ContentCache, ContentKey};
use crate::domain::documents::{CONFIG_PATH, DocumentPath, SCRAPS_DIR};
use crate::domain::repository::RepoRef;
use crate::domain::scraps::{ScrapListing, ScrapWithSlug, sort_newest_first};
use crate::domain::site_config::SiteConfig;
use crate::domain::slug::validate_slug;
use crate::domain::works::{WorkCategory, WorkItem, WorksData};

pub const DEFAULT_SITE_TITLE: &str = "Gitfolio";
pub const DEFAULT_SITE_SUBTITLE: &str = "Notes and works";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    pub scraps: Vec<ScrapWithSlug>,
    pub site_title: String,
    pub site_subtitle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechPage {
    pub scraps: Vec<ScrapWithSlug>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorPage {
    pub author_icon: String,
    pub author_name: String,
    pub author_one_liner: String,
    pub zenn_username: String,
    pub personal_items: Vec<WorkItem>,
    pub professional_items: Vec<WorkItem>,
    pub sidejob_items: Vec<WorkItem>,
}

/// Outcome of reading a directory of per-item documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapCollection {
    pub scraps: Vec<ScrapWithSlug>,
    pub skipped: usize,
}

impl ScrapCollection {
    /// Parse `(slug, body)` pairs, dropping entries without a body or whose
    /// body is not a valid scrap. The result is sorted newest first.
    pub fn from_documents(documents: impl IntoIterator<Item = (String, Option<Bytes>)>) -> Self {
        let mut collection = Self::default();
        for (slug, body) in documents {
            let parsed = body
                .as_deref()
                .map(|raw| ScrapWithSlug::parse(&slug, raw));
            match parsed {
                Some(Ok(scrap)) => collection.scraps.push(scrap),
                Some(Err(err)) => {
                    debug!(target = "gitfolio::content", slug = %slug, error = %err, "unparseable scrap skipped");
                    collection.skipped += 1;
                }
                None => collection.skipped += 1,
            }
        }
        sort_newest_first(&mut collection.scraps);
        collection
    }
}

/// Slug for a directory entry name, if it names a scrap document with a safe
/// identifier.
pub fn scrap_slug(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(".json")
        .filter(|slug| validate_slug(slug))
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("no reader for content key `{0}`")]
    Unsupported(ContentKey),
    #[error("failed to encode content: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct ContentReader {
    cache: Arc<ContentCache>,
    store: Arc<dyn DocumentStore>,
    local: Arc<dyn LocalMirror>,
    fallback_repo: Option<RepoRef>,
    read_token: Option<String>,
}

impl ContentReader {
    pub fn new(
        cache: Arc<ContentCache>,
        store: Arc<dyn DocumentStore>,
        local: Arc<dyn LocalMirror>,
        fallback_repo: Option<RepoRef>,
        read_token: Option<String>,
    ) -> Self {
        Self {
            cache,
            store,
            local,
            fallback_repo,
            read_token,
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn fallback_repo(&self) -> Option<&RepoRef> {
        self.fallback_repo.as_ref()
    }

    /// Where the authoritative copy lives: the repository named by the local
    /// configuration copy, else the configured fallback.
    pub async fn repository(&self) -> Option<RepoRef> {
        let local = self.read_local::<SiteConfig>(CONFIG_PATH).await;
        local
            .and_then(|config| config.repo())
            .or_else(|| self.fallback_repo.clone())
    }

    pub async fn config(&self) -> SiteConfig {
        let key = ContentKey::Config;
        self.cache
            .get_or_set(&key.as_cache_key(), || async {
                self.read_document(&key, &DocumentPath::config())
                    .await
                    .unwrap_or_default()
            })
            .await
    }

    pub async fn works(&self) -> WorksData {
        let key = ContentKey::Works;
        self.cache
            .get_or_set(&key.as_cache_key(), || async {
                self.read_document(&key, &DocumentPath::works())
                    .await
                    .unwrap_or_default()
            })
            .await
    }

    pub async fn scraps(&self) -> Vec<ScrapWithSlug> {
        let key = ContentKey::Scraps;
        self.cache
            .get_or_set(&key.as_cache_key(), || async {
                let collection = match self.repository().await {
                    Some(repo) => match self.remote_scraps(&repo).await {
                        Ok(collection) => collection,
                        Err(err) => {
                            self.note_fallback(&key, &err);
                            self.local_scraps().await
                        }
                    },
                    None => self.local_scraps().await,
                };
                if collection.skipped > 0 {
                    warn!(
                        target = "gitfolio::content",
                        skipped = collection.skipped,
                        "scrap documents skipped"
                    );
                }
                collection.scraps
            })
            .await
    }

    /// Cached scraps whose title or comments contain every term of `query`,
    /// each with a plain-text preview of its first comment.
    pub async fn search_scraps(&self, query: &str) -> Vec<ScrapListing> {
        self.scraps()
            .await
            .into_iter()
            .filter(|scrap| scrap.matches_search(query))
            .map(ScrapListing::from)
            .collect()
    }

    /// A single scrap; `None` for an unsafe slug or a missing document.
    pub async fn scrap(&self, slug: &str) -> Option<ScrapWithSlug> {
        let path = DocumentPath::scrap(slug).ok()?;
        let key = ContentKey::Scrap(slug.to_string());
        self.cache
            .get_or_set(&key.as_cache_key(), || async {
                self.read_parsed(&key, &path, |raw| ScrapWithSlug::parse(slug, raw))
                    .await
            })
            .await
    }

    pub async fn home_page(&self) -> HomePage {
        self.cache
            .get_or_set(&ContentKey::HomePage.as_cache_key(), || async {
                let (scraps, config) = tokio::join!(self.scraps(), self.config());
                HomePage {
                    scraps,
                    site_title: non_empty_or(&config.site_title, DEFAULT_SITE_TITLE),
                    site_subtitle: non_empty_or(&config.site_subtitle, DEFAULT_SITE_SUBTITLE),
                }
            })
            .await
    }

    pub async fn tech_page(&self) -> TechPage {
        self.cache
            .get_or_set(&ContentKey::TechPage.as_cache_key(), || async {
                TechPage {
                    scraps: self.scraps().await,
                }
            })
            .await
    }

    pub async fn author_page(&self) -> AuthorPage {
        self.cache
            .get_or_set(&ContentKey::AuthorPage.as_cache_key(), || async {
                let (config, works) = tokio::join!(self.config(), self.works());
                AuthorPage {
                    author_icon: config.author_icon.trim().to_string(),
                    author_name: config.author_name.trim().to_string(),
                    author_one_liner: config.author_one_liner.trim().to_string(),
                    zenn_username: config.zenn_username.trim().to_string(),
                    personal_items: works.by_category(WorkCategory::Personal),
                    professional_items: works.by_category(WorkCategory::Professional),
                    sidejob_items: works.by_category(WorkCategory::Sidejob),
                }
            })
            .await
    }

    /// Resolve any readable key to JSON.
    pub async fn read_json(&self, key: &ContentKey) -> Result<serde_json::Value, ContentError> {
        let value = match key {
            ContentKey::Config => serde_json::to_value(self.config().await)?,
            ContentKey::Works => serde_json::to_value(self.works().await)?,
            ContentKey::Scraps => serde_json::to_value(self.scraps().await)?,
            ContentKey::HomePage => serde_json::to_value(self.home_page().await)?,
            ContentKey::TechPage => serde_json::to_value(self.tech_page().await)?,
            ContentKey::AuthorPage => serde_json::to_value(self.author_page().await)?,
            ContentKey::Scrap(slug) => serde_json::to_value(self.scrap(slug).await)?,
            ContentKey::Articles | ContentKey::Blog => {
                return Err(ContentError::Unsupported(key.clone()));
            }
        };
        Ok(value)
    }

    fn token(&self) -> Option<&str> {
        self.read_token.as_deref()
    }

    async fn read_document<T: DeserializeOwned>(
        &self,
        key: &ContentKey,
        path: &DocumentPath,
    ) -> Option<T> {
        self.read_parsed(key, path, |raw| serde_json::from_slice(raw))
            .await
    }

    /// The remote document when a repository is known, reachable and its
    /// bytes parse; the local copy otherwise.
    async fn read_parsed<T, F>(&self, key: &ContentKey, path: &DocumentPath, parse: F) -> Option<T>
    where
        F: Fn(&[u8]) -> Result<T, serde_json::Error>,
    {
        if let Some(repo) = self.repository().await {
            match self.store.read_file(&repo, path, self.token()).await {
                Ok(Some(document)) => match parse(&document.content) {
                    Ok(value) => return Some(value),
                    Err(err) => {
                        let err = StoreError::malformed(format!("{path}: {err}"));
                        self.note_fallback(key, &err);
                    }
                },
                Ok(None) => {
                    debug!(target = "gitfolio::content", key = %key, path = %path, "document absent remotely");
                }
                Err(err) => self.note_fallback(key, &err),
            }
        }

        let raw = self.local_bytes(path.as_str()).await?;
        parse(&raw)
            .map_err(|err| {
                warn!(
                    target = "gitfolio::content",
                    key = %key,
                    path = %path,
                    error = %err,
                    "local document could not be parsed"
                );
            })
            .ok()
    }

    async fn remote_scraps(&self, repo: &RepoRef) -> Result<ScrapCollection, StoreError> {
        let entries = self
            .store
            .list_directory(repo, SCRAPS_DIR, self.token())
            .await?;

        let mut unsafe_names = 0;
        let mut candidates = Vec::new();
        for entry in entries {
            if !entry.name.ends_with(".json") {
                continue;
            }
            match scrap_slug(&entry.name) {
                Some(slug) => candidates.push((slug.to_string(), entry.download_url)),
                None => unsafe_names += 1,
            }
        }

        let token = self.token();
        let documents = join_all(candidates.into_iter().map(|(slug, url)| async move {
            let body = match url {
                Some(url) => self
                    .store
                    .fetch_raw(&url, token)
                    .await
                    .map_err(|err| {
                        debug!(target = "gitfolio::content", slug = %slug, error = %err, "scrap fetch failed");
                    })
                    .ok(),
                None => None,
            };
            (slug, body)
        }))
        .await;

        let mut collection = ScrapCollection::from_documents(documents);
        collection.skipped += unsafe_names;
        Ok(collection)
    }

    async fn local_scraps(&self) -> ScrapCollection {
        let names = match self.local.list_names(SCRAPS_DIR).await {
            Ok(names) => names,
            Err(err) => {
                warn!(target = "gitfolio::content", error = %err, "local scraps unreadable");
                return ScrapCollection::default();
            }
        };

        let mut unsafe_names = 0;
        let mut documents = Vec::new();
        for name in names {
            if !name.ends_with(".json") {
                continue;
            }
            let Some(slug) = scrap_slug(&name) else {
                unsafe_names += 1;
                continue;
            };
            let body = self.local_bytes(&format!("{SCRAPS_DIR}/{name}")).await;
            documents.push((slug.to_string(), body));
        }

        let mut collection = ScrapCollection::from_documents(documents);
        collection.skipped += unsafe_names;
        collection
    }

    async fn read_local<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let raw = self.local_bytes(path).await?;
        serde_json::from_slice(&raw)
            .map_err(|err| {
                warn!(target = "gitfolio::content", path, error = %err, "local document could not be parsed");
            })
            .ok()
    }

    async fn local_bytes(&self, path: &str) -> Option<Bytes> {
        match self.local.read_document(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target = "gitfolio::content", error = %err, "local read failed");
                None
            }
        }
    }

    fn note_fallback(&self, key: &ContentKey, err: &StoreError) {
        counter!("gitfolio_read_fallback_total", "key" => key.as_cache_key()).increment(1);
        warn!(
            target = "gitfolio::content",
            key = %key,
            kind = %err.kind,
            error = %err,
            "remote read failed; using local copy"
        );
    }
}

#[async_trait]
impl AllowListSource for ContentReader {
    async fn allow_list(&self) -> Vec<String> {
        self.config().await.admins
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}
