//! Application services for the administrative surface.
//!
//! Every service validates its input first, then authorizes, then writes
//! through the [`OptimisticWriter`].

use std::sync::Arc;

use tracing::warn;

use crate::application::content::ContentReader;
use crate::application::store::{DocumentStore, LocalMirror};
use crate::application::writer::{OptimisticWriter, WriteError};
use crate::domain::documents::DocumentPath;
use crate::domain::repository::RepoRef;

pub mod settings;
pub mod uploads;
pub mod works;

pub use settings::SettingsService;
pub use uploads::UploadService;
pub use works::WorksService;

/// Collaborators shared by the admin services.
#[derive(Clone)]
pub struct AdminContext {
    pub writer: Arc<OptimisticWriter>,
    pub content: Arc<ContentReader>,
    pub store: Arc<dyn DocumentStore>,
    pub mirror: Arc<dyn LocalMirror>,
    /// Used when the caller supplies no store token of their own.
    pub server_token: Option<String>,
}

impl AdminContext {
    /// The caller's store token when present, else the server's.
    pub(crate) fn resolve_token(&self, provider_token: Option<&str>) -> Result<String, WriteError> {
        provider_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .or_else(|| self.server_token.as_deref())
            .map(str::to_string)
            .ok_or(WriteError::TokenUnavailable)
    }

    /// Repository named by the current configuration, else the configured
    /// fallback.
    pub(crate) async fn current_repo(&self) -> Result<RepoRef, WriteError> {
        self.content
            .config()
            .await
            .repo()
            .or_else(|| self.content.fallback_repo().cloned())
            .ok_or(WriteError::RepositoryUnavailable)
    }

    /// Refresh the local copy after a successful write. Failure only costs
    /// freshness of the fallback, so it is logged and swallowed.
    pub(crate) async fn mirror(&self, path: &DocumentPath, content: &[u8]) {
        if let Err(err) = self.mirror.write_document(path, content).await {
            warn!(
                target = "gitfolio::admin",
                path = %path,
                error = %err,
                "local copy not updated"
            );
        }
    }
}
