//! Optimistic-concurrency write pipeline.
//!
//! Every write is authorize → read revision → conditional write, with the
//! read/write pair retried on conflict up to a fixed attempt budget. On
//! success the cache keys derived from the written path are dropped.

use std::num::NonZeroU32;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::application::auth::{AuthError, Authorized, AuthorizationGate};
use crate::application::store::{DocumentStore, Payload, RevisionMarker, StoreError, WriteFileRequest};
use crate::cache::{ContentCache, dependents_of};
use crate::domain::documents::DocumentPath;
use crate::domain::error::DomainError;
use crate::domain::repository::RepoRef;

pub const DEFAULT_MAX_ATTEMPTS: NonZeroU32 = NonZeroU32::MIN.saturating_add(2);

#[derive(Debug, Error, PartialEq)]
pub enum WriteError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("could not save, try again")]
    ConflictExhausted { attempts: u32 },
    #[error(transparent)]
    Store(StoreError),
    #[error("repository URL is not configured")]
    RepositoryUnavailable,
    #[error("a GitHub token is required")]
    TokenUnavailable,
}

/// One document replacement.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub repo: RepoRef,
    pub path: DocumentPath,
    pub payload: Payload,
    pub message: String,
    /// Store credential used for both the revision read and the write.
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub path: DocumentPath,
    pub revision: RevisionMarker,
    pub attempts: u32,
}

/// Caller-facing outcome of a write: a success flag plus an optional reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WriteResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
            url: None,
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::succeeded()
        }
    }

    pub fn failed(error: &WriteError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            url: None,
        }
    }
}

pub struct OptimisticWriter {
    gate: Arc<AuthorizationGate>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<ContentCache>,
    max_attempts: NonZeroU32,
}

impl OptimisticWriter {
    pub fn new(
        gate: Arc<AuthorizationGate>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<ContentCache>,
        max_attempts: NonZeroU32,
    ) -> Self {
        Self {
            gate,
            store,
            cache,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> NonZeroU32 {
        self.max_attempts
    }

    pub async fn authorize(&self, credential: &str) -> Result<Authorized, WriteError> {
        Ok(self.gate.authorize(credential).await?)
    }

    pub async fn write(
        &self,
        credential: &str,
        request: &WriteRequest,
    ) -> Result<WriteReceipt, WriteError> {
        self.write_with_attempts(credential, request, self.max_attempts)
            .await
    }

    /// Authorize, then commit. An authorization failure makes no store call.
    pub async fn write_with_attempts(
        &self,
        credential: &str,
        request: &WriteRequest,
        max_attempts: NonZeroU32,
    ) -> Result<WriteReceipt, WriteError> {
        let authorized = self.authorize(credential).await?;
        self.commit_with_attempts(&authorized, request, max_attempts)
            .await
    }

    pub async fn commit(
        &self,
        authorized: &Authorized,
        request: &WriteRequest,
    ) -> Result<WriteReceipt, WriteError> {
        self.commit_with_attempts(authorized, request, self.max_attempts)
            .await
    }

    /// The read-revision → conditional-write loop. Only conflicts are
    /// retried; every other store error ends the write immediately.
    #[instrument(
        skip_all,
        fields(path = %request.path, handle = %authorized.handle(), max_attempts = max_attempts.get())
    )]
    pub async fn commit_with_attempts(
        &self,
        authorized: &Authorized,
        request: &WriteRequest,
        max_attempts: NonZeroU32,
    ) -> Result<WriteReceipt, WriteError> {
        let max_attempts = max_attempts.get();

        for attempt in 1..=max_attempts {
            counter!("gitfolio_write_attempt_total").increment(1);

            let current = self
                .store
                .read_file(&request.repo, &request.path, Some(&request.token))
                .await
                .map_err(WriteError::Store)?;
            let expected = current.as_ref().map(|document| &document.revision);

            let outcome = self
                .store
                .write_file(
                    &request.repo,
                    WriteFileRequest {
                        path: &request.path,
                        payload: &request.payload,
                        message: &request.message,
                        token: &request.token,
                        expected,
                    },
                )
                .await;

            match outcome {
                Ok(revision) => {
                    let keys = dependents_of(&request.path);
                    self.cache.invalidate_keys(&keys);
                    info!(
                        target = "gitfolio::write",
                        attempt,
                        revision = %revision,
                        "document written"
                    );
                    return Ok(WriteReceipt {
                        path: request.path.clone(),
                        revision,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_conflict() => {
                    counter!("gitfolio_write_conflict_total").increment(1);
                    debug!(
                        target = "gitfolio::write",
                        attempt,
                        error = %err,
                        "revision conflict"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "gitfolio::write",
                        attempt,
                        kind = %err.kind,
                        error = %err,
                        "write failed"
                    );
                    return Err(WriteError::Store(err));
                }
            }
        }

        warn!(
            target = "gitfolio::write",
            attempts = max_attempts,
            "conflict retries exhausted"
        );
        Err(WriteError::ConflictExhausted {
            attempts: max_attempts,
        })
    }
}
