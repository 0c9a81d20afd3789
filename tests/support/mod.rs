//! Shared fixtures for the integration suites: an in-memory repository with
//! conditional writes and a fixed identity provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use gitfolio::app::{AppOptions, Application, Collaborators};
use gitfolio::application::auth::{Identity, IdentityError, IdentityProvider};
use gitfolio::application::store::{
    DirectoryEntry, DocumentStore, LocalMirror, RemoteDocument, RevisionMarker, StoreError,
    WriteFileRequest,
};
use gitfolio::cache::{CacheConfig, ContentCache};
use gitfolio::domain::documents::DocumentPath;
use gitfolio::domain::repository::RepoRef;
use gitfolio::infra::local::LocalContent;
use serde_json::json;

pub const ADMIN_SESSION: &str = "session-admin";
pub const OTHER_SESSION: &str = "session-other";
pub const ADMIN_HANDLE: &str = "octo";
pub const OTHER_HANDLE: &str = "mallory";

pub fn repo() -> RepoRef {
    RepoRef::new("octo", "notes")
}

/// Repository held in memory. Every successful write bumps a global revision
/// counter; a write whose expected marker is stale fails with a conflict.
#[derive(Default)]
pub struct InMemoryStore {
    files: Mutex<HashMap<String, (Bytes, RevisionMarker)>>,
    next_revision: AtomicU64,
    reads: AtomicUsize,
    writes: AtomicUsize,
    /// Number of upcoming writes that lose a race against another writer.
    pending_races: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, path: &str, content: impl Into<Bytes>) -> RevisionMarker {
        let revision = self.bump();
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_string(), (content.into(), revision.clone()));
        revision
    }

    pub fn seed_json(&self, path: &str, value: serde_json::Value) -> RevisionMarker {
        self.seed(path, serde_json::to_vec(&value).expect("json"))
    }

    pub fn revision(&self, path: &str) -> Option<RevisionMarker> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .map(|(_, revision)| revision.clone())
    }

    pub fn content(&self, path: &str) -> Option<Bytes> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .map(|(content, _)| content.clone())
    }

    pub fn json(&self, path: &str) -> serde_json::Value {
        let bytes = self.content(path).expect("document present");
        serde_json::from_slice(&bytes).expect("json document")
    }

    /// Make the next `count` writes observe a competing commit between the
    /// revision read and the conditional write.
    pub fn lose_next_races(&self, count: usize) {
        self.pending_races.store(count, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn bump(&self) -> RevisionMarker {
        let next = self.next_revision.fetch_add(1, Ordering::SeqCst) + 1;
        RevisionMarker::new(format!("rev-{next}"))
    }

    fn take_race(&self) -> bool {
        self.pending_races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn read_file(
        &self,
        _repo: &RepoRef,
        path: &DocumentPath,
        _token: Option<&str>,
    ) -> Result<Option<RemoteDocument>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .files
            .lock()
            .expect("files lock")
            .get(path.as_str())
            .map(|(content, revision)| RemoteDocument {
                content: content.clone(),
                revision: revision.clone(),
            }))
    }

    async fn write_file(
        &self,
        _repo: &RepoRef,
        request: WriteFileRequest<'_>,
    ) -> Result<RevisionMarker, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        if self.take_race() {
            let competing = self.bump();
            let mut files = self.files.lock().expect("files lock");
            let content = files
                .get(request.path.as_str())
                .map(|(content, _)| content.clone())
                .unwrap_or_default();
            files.insert(request.path.as_str().to_string(), (content, competing));
        }

        let mut files = self.files.lock().expect("files lock");
        let current = files.get(request.path.as_str()).map(|(_, revision)| revision);
        if current != request.expected {
            return Err(StoreError::conflict(format!(
                "{} does not match",
                request.path
            )));
        }
        let revision = self.bump();
        files.insert(
            request.path.as_str().to_string(),
            (Bytes::copy_from_slice(request.payload.as_bytes()), revision.clone()),
        );
        Ok(revision)
    }

    async fn list_directory(
        &self,
        _repo: &RepoRef,
        dir: &str,
        _token: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, StoreError> {
        let prefix = format!("{dir}/");
        let mut entries: Vec<DirectoryEntry> = self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|name| !name.contains('/'))
            .map(|name| DirectoryEntry {
                name: name.to_string(),
                download_url: Some(format!("memory://{dir}/{name}")),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn fetch_raw(
        &self,
        download_url: &str,
        _token: Option<&str>,
    ) -> Result<Bytes, StoreError> {
        let path = download_url
            .strip_prefix("memory://")
            .ok_or_else(|| StoreError::malformed("unexpected download URL"))?;
        self.content(path)
            .ok_or_else(|| StoreError::transport(format!("{path} vanished")))
    }

    fn raw_url(&self, repo: &RepoRef, path: &DocumentPath) -> String {
        format!("memory://{}/{}/{}", repo.owner, repo.repo, path)
    }
}

/// Maps session credentials to fixed account handles.
pub struct StaticIdentity {
    handles: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticIdentity {
    pub fn new(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            handles: entries
                .iter()
                .map(|(session, handle)| (session.to_string(), handle.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn user_for_credential(&self, credential: &str) -> Result<Identity, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.handles
            .get(credential)
            .map(|handle| Identity {
                user_id: Some(format!("user-{handle}")),
                account_handle: Some(handle.clone()),
            })
            .ok_or(IdentityError::InvalidSession)
    }
}

pub struct Harness {
    pub app: Application,
    pub store: Arc<InMemoryStore>,
    pub identity: Arc<StaticIdentity>,
    pub cache: Arc<ContentCache>,
    pub local: Arc<LocalContent>,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// A repository whose configuration names `octo` as the only admin.
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        store.seed_json(
            ".obsidian-log/config.json",
            json!({
                "github_repo_url": "https://github.com/octo/notes",
                "site_title": "Field Notes",
                "site_subtitle": "Things I wrote down",
                "admins": [ADMIN_HANDLE],
            }),
        );
        Self::with_store(store)
    }

    pub fn with_store(store: Arc<InMemoryStore>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = Arc::new(LocalContent::new(dir.path()));
        let identity = StaticIdentity::new(&[
            (ADMIN_SESSION, ADMIN_HANDLE),
            (OTHER_SESSION, OTHER_HANDLE),
        ]);
        let cache = Arc::new(ContentCache::new(&CacheConfig::default()));

        let app = Application::assemble(
            Collaborators {
                cache: cache.clone(),
                store: store.clone(),
                mirror: local.clone() as Arc<dyn LocalMirror>,
                identity: Some(identity.clone() as Arc<dyn IdentityProvider>),
            },
            AppOptions {
                fallback_repo: Some(repo()),
                server_token: Some("server-token".to_string()),
                max_attempts: NonZeroU32::new(3).expect("non-zero"),
                max_upload_bytes: NonZeroU64::new(1024 * 1024).expect("non-zero"),
            },
        );

        Self {
            app,
            store,
            identity,
            cache,
            local,
            _dir: dir,
        }
    }
}
