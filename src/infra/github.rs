//! [`DocumentStore`] over the GitHub contents API.
//!
//! The blob `sha` GitHub reports for a file is used as its revision marker.
//! A `PUT` carrying a stale or missing `sha` is rejected by GitHub, and that
//! rejection is mapped to [`StoreErrorKind::Conflict`] here so callers never
//! inspect message text.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::application::store::{
    DirectoryEntry, DocumentStore, RemoteDocument, RevisionMarker, StoreError, StoreErrorKind,
    WriteFileRequest,
};
use crate::config::GithubSettings;
use crate::domain::documents::DocumentPath;
use crate::domain::repository::RepoRef;

use super::error::InfraError;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";

pub fn user_agent() -> &'static str {
    concat!("gitfolio/", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone)]
pub struct GithubStore {
    client: Client,
    api_base: Url,
    raw_base: Url,
    branch: String,
}

impl GithubStore {
    pub fn new(settings: &GithubSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: settings.api_url.clone(),
            raw_base: settings.raw_url.clone(),
            branch: settings.branch.clone(),
        })
    }

    fn contents_url(&self, repo: &RepoRef, path: &str) -> Result<Url, StoreError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::malformed("GitHub API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.repo.as_str(), "contents"])
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(API_VERSION_HEADER, API_VERSION);
        match token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    fn with_ref(&self, mut url: Url) -> Url {
        url.query_pairs_mut().append_pair("ref", &self.branch);
        url
    }
}

#[async_trait]
impl DocumentStore for GithubStore {
    #[instrument(skip(self, token), fields(repo = %repo, path = %path))]
    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &DocumentPath,
        token: Option<&str>,
    ) -> Result<Option<RemoteDocument>, StoreError> {
        let url = self.with_ref(self.contents_url(repo, path.as_str())?);
        let response = self
            .request(Method::GET, url, token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(target = "gitfolio::github", "document not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(failure(response, classify_read_failure).await);
        }

        let file: ContentsFile = response
            .json()
            .await
            .map_err(|err| StoreError::malformed(format!("unexpected contents response: {err}")))?;

        let content = match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(encoded)) => decode_content(encoded)?,
            // Large files come back without inline content.
            _ => match file.download_url.as_deref() {
                Some(download_url) => self.fetch_raw(download_url, token).await?,
                None => return Err(StoreError::malformed("contents response carried no body")),
            },
        };

        Ok(Some(RemoteDocument {
            content,
            revision: RevisionMarker::new(file.sha),
        }))
    }

    #[instrument(
        skip(self, request),
        fields(repo = %repo, path = %request.path, expected = ?request.expected.map(RevisionMarker::as_str))
    )]
    async fn write_file(
        &self,
        repo: &RepoRef,
        request: WriteFileRequest<'_>,
    ) -> Result<RevisionMarker, StoreError> {
        let url = self.contents_url(repo, request.path.as_str())?;
        let body = PutContents {
            message: request.message,
            content: request.payload.to_base64(),
            branch: &self.branch,
            sha: request.expected.map(RevisionMarker::as_str),
        };

        let response = self
            .request(Method::PUT, url, Some(request.token))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure(response, classify_write_failure).await);
        }

        let written: PutContentsResponse = response
            .json()
            .await
            .map_err(|err| StoreError::malformed(format!("unexpected write response: {err}")))?;
        Ok(RevisionMarker::new(written.content.sha))
    }

    #[instrument(skip(self, token), fields(repo = %repo))]
    async fn list_directory(
        &self,
        repo: &RepoRef,
        dir: &str,
        token: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, StoreError> {
        let url = self.with_ref(self.contents_url(repo, dir)?);
        let response = self
            .request(Method::GET, url, token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(failure(response, classify_read_failure).await);
        }

        let entries: Vec<ContentsEntry> = response.json().await.map_err(|err| {
            StoreError::malformed(format!("expected a directory listing: {err}"))
        })?;
        Ok(entries
            .into_iter()
            .map(|entry| DirectoryEntry {
                name: entry.name,
                download_url: entry.download_url,
            })
            .collect())
    }

    async fn fetch_raw(
        &self,
        download_url: &str,
        token: Option<&str>,
    ) -> Result<Bytes, StoreError> {
        let url = Url::parse(download_url)
            .map_err(|err| StoreError::malformed(format!("invalid download URL: {err}")))?;
        let mut builder = self.client.get(url);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = builder.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(failure(response, classify_read_failure).await);
        }
        response.bytes().await.map_err(transport_error)
    }

    fn raw_url(&self, repo: &RepoRef, path: &DocumentPath) -> String {
        let base = self.raw_base.as_str().trim_end_matches('/');
        format!(
            "{base}/{}/{}/{}/{}",
            repo.owner, repo.repo, self.branch, path
        )
    }
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsFile,
}

#[derive(Debug, Deserialize)]
struct PutContentsFile {
    sha: String,
}

#[derive(Debug, Default, Deserialize)]
struct GithubErrorBody {
    #[serde(default)]
    message: String,
}

fn decode_content(encoded: &str) -> Result<Bytes, StoreError> {
    let compact: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(|err| StoreError::malformed(format!("content is not valid base64: {err}")))
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::transport("GitHub request timed out")
    } else {
        StoreError::transport(format!("GitHub request failed: {err}"))
    }
}

async fn failure(response: Response, classify: fn(StatusCode, &str) -> StoreErrorKind) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GithubErrorBody>(&text)
        .map(|body| body.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("GitHub responded with {status}"));
    let kind = classify(status, &message);
    debug!(target = "gitfolio::github", status = status.as_u16(), kind = %kind, message = %message, "request rejected");
    StoreError::new(kind, message)
}

fn classify_read_failure(status: StatusCode, _message: &str) -> StoreErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreErrorKind::Permission,
        StatusCode::TOO_MANY_REQUESTS => StoreErrorKind::Transport,
        status if status.is_client_error() => StoreErrorKind::Malformed,
        _ => StoreErrorKind::Transport,
    }
}

/// GitHub reports a stale `sha` as 409, and a missing one (the file appeared
/// since it was read) as 422 naming the `sha` field.
fn classify_write_failure(status: StatusCode, message: &str) -> StoreErrorKind {
    match status {
        StatusCode::CONFLICT => StoreErrorKind::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY if message.contains("sha") => StoreErrorKind::Conflict,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            StoreErrorKind::Permission
        }
        StatusCode::TOO_MANY_REQUESTS => StoreErrorKind::Transport,
        status if status.is_client_error() => StoreErrorKind::Malformed,
        _ => StoreErrorKind::Transport,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store(api: &str) -> GithubStore {
        GithubStore::new(&GithubSettings {
            api_url: Url::parse(api).expect("url"),
            raw_url: Url::parse("https://raw.githubusercontent.com").expect("url"),
            branch: "main".to_string(),
            repo: None,
            token: None,
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[test]
    fn contents_url_encodes_segments() {
        let api = store("https://api.github.com");
        let url = api
            .contents_url(&RepoRef::new("octo", "notes"), ".obsidian-log/config.json")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/notes/contents/.obsidian-log/config.json"
        );

        let prefixed = store("https://github.example/api/v3/");
        let url = prefixed
            .contents_url(&RepoRef::new("octo", "notes"), "scraps")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://github.example/api/v3/repos/octo/notes/contents/scraps"
        );
    }

    #[test]
    fn raw_url_points_at_branch() {
        let store = store("https://api.github.com");
        assert_eq!(
            store.raw_url(
                &RepoRef::new("octo", "notes"),
                &DocumentPath::config()
            ),
            "https://raw.githubusercontent.com/octo/notes/main/.obsidian-log/config.json"
        );
    }

    #[test]
    fn write_failures_are_classified() {
        assert_eq!(
            classify_write_failure(StatusCode::CONFLICT, "config.json is at abc but expected def"),
            StoreErrorKind::Conflict
        );
        assert_eq!(
            classify_write_failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid request.\n\n\"sha\" wasn't supplied."
            ),
            StoreErrorKind::Conflict
        );
        assert_eq!(
            classify_write_failure(StatusCode::UNPROCESSABLE_ENTITY, "content is not valid Base64"),
            StoreErrorKind::Malformed
        );
        assert_eq!(
            classify_write_failure(StatusCode::FORBIDDEN, "Resource not accessible"),
            StoreErrorKind::Permission
        );
        assert_eq!(
            classify_write_failure(StatusCode::BAD_GATEWAY, ""),
            StoreErrorKind::Transport
        );
    }

    #[test]
    fn read_failures_are_classified() {
        assert_eq!(
            classify_read_failure(StatusCode::UNAUTHORIZED, "Bad credentials"),
            StoreErrorKind::Permission
        );
        assert_eq!(
            classify_read_failure(StatusCode::SERVICE_UNAVAILABLE, ""),
            StoreErrorKind::Transport
        );
    }

    #[test]
    fn inline_content_tolerates_line_breaks() {
        let decoded = decode_content("eyJh\nIjox\nfQ==\n").expect("base64");
        assert_eq!(&decoded[..], br#"{"a":1}"#);
        assert!(decode_content("***").is_err());
    }
}
