//! Traits describing the document stores the application reads and writes.

use std::fmt;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::documents::DocumentPath;
use crate::domain::repository::RepoRef;

/// Opaque version token of a remote document, required as the precondition
/// of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionMarker(String);

impl RevisionMarker {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RemoteDocument {
    pub content: Bytes,
    pub revision: RevisionMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub download_url: Option<String>,
}

/// Bytes to be written. Text is committed as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.as_bytes())
    }
}

/// A conditional write. `expected = None` creates the document and fails
/// with a conflict if it already exists.
#[derive(Debug, Clone, Copy)]
pub struct WriteFileRequest<'a> {
    pub path: &'a DocumentPath,
    pub payload: &'a Payload,
    pub message: &'a str,
    pub token: &'a str,
    pub expected: Option<&'a RevisionMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The supplied revision marker no longer matches the stored one.
    Conflict,
    Permission,
    Transport,
    Malformed,
}

impl StoreErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Permission => "permission",
            StoreErrorKind::Transport => "transport",
            StoreErrorKind::Malformed => "malformed",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Conflict, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Permission, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transport, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Malformed, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == StoreErrorKind::Conflict
    }
}

/// The remote repository holding the authoritative copy of every document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current content and revision of `path`; `Ok(None)` when it does not exist.
    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &DocumentPath,
        token: Option<&str>,
    ) -> Result<Option<RemoteDocument>, StoreError>;

    /// Conditional write; returns the new revision marker.
    async fn write_file(
        &self,
        repo: &RepoRef,
        request: WriteFileRequest<'_>,
    ) -> Result<RevisionMarker, StoreError>;

    /// Entries of `dir`; a missing directory is empty.
    async fn list_directory(
        &self,
        repo: &RepoRef,
        dir: &str,
        token: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, StoreError>;

    async fn fetch_raw(&self, download_url: &str, token: Option<&str>)
    -> Result<Bytes, StoreError>;

    /// Public URL serving the committed bytes of `path`.
    fn raw_url(&self, repo: &RepoRef, path: &DocumentPath) -> String;
}

#[derive(Debug, Error)]
#[error("local content error at `{path}`: {source}")]
pub struct MirrorError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

/// Local copy of the content tree, read when no remote store is reachable and
/// refreshed after successful writes.
#[async_trait]
pub trait LocalMirror: Send + Sync {
    /// Bytes of the document at `path` relative to the content root.
    async fn read_document(&self, path: &str) -> Result<Option<Bytes>, MirrorError>;

    /// File names directly under `dir`; a missing directory is empty.
    async fn list_names(&self, dir: &str) -> Result<Vec<String>, MirrorError>;

    async fn write_document(&self, path: &DocumentPath, content: &[u8]) -> Result<(), MirrorError>;
}
