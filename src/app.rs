//! Wiring of the read path, the authorization gate and the admin services
//! over a given store, mirror and identity provider.

use std::num::{NonZeroU32, NonZeroU64};
use std::sync::Arc;

use crate::application::admin::{AdminContext, SettingsService, UploadService, WorksService};
use crate::application::auth::{AuthorizationGate, IdentityProvider};
use crate::application::content::ContentReader;
use crate::application::store::{DocumentStore, LocalMirror};
use crate::application::writer::OptimisticWriter;
use crate::cache::ContentCache;
use crate::config::Settings;
use crate::domain::repository::RepoRef;
use crate::infra::http::HttpState;

/// Adapters the application runs on.
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<ContentCache>,
    pub store: Arc<dyn DocumentStore>,
    pub mirror: Arc<dyn LocalMirror>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub fallback_repo: Option<RepoRef>,
    pub server_token: Option<String>,
    pub max_attempts: NonZeroU32,
    pub max_upload_bytes: NonZeroU64,
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            fallback_repo: settings.github.repo.clone(),
            server_token: settings.github.token.clone(),
            max_attempts: settings.writes.max_attempts,
            max_upload_bytes: settings.uploads.max_bytes,
        }
    }
}

#[derive(Clone)]
pub struct Application {
    pub content: Arc<ContentReader>,
    pub gate: Arc<AuthorizationGate>,
    pub writer: Arc<OptimisticWriter>,
    pub settings: SettingsService,
    pub works: WorksService,
    pub uploads: UploadService,
    max_upload_bytes: NonZeroU64,
}

impl Application {
    pub fn assemble(collaborators: Collaborators, options: AppOptions) -> Self {
        let Collaborators {
            cache,
            store,
            mirror,
            identity,
        } = collaborators;

        let content = Arc::new(ContentReader::new(
            cache.clone(),
            store.clone(),
            mirror.clone(),
            options.fallback_repo,
            options.server_token.clone(),
        ));
        // The allow-list is read through the cache, so a config write is
        // visible to the next authorization.
        let gate = Arc::new(AuthorizationGate::new(identity, content.clone()));
        let writer = Arc::new(OptimisticWriter::new(
            gate.clone(),
            store.clone(),
            cache,
            options.max_attempts,
        ));

        let context = AdminContext {
            writer: writer.clone(),
            content: content.clone(),
            store,
            mirror,
            server_token: options.server_token,
        };
        let uploads = UploadService::new(context.clone(), options.max_upload_bytes);
        let works = WorksService::new(context.clone(), uploads.clone());
        let settings = SettingsService::new(context);

        Self {
            content,
            gate,
            writer,
            settings,
            works,
            uploads,
            max_upload_bytes: options.max_upload_bytes,
        }
    }

    pub fn http_state(&self) -> HttpState {
        HttpState {
            content: self.content.clone(),
            gate: self.gate.clone(),
            settings: self.settings.clone(),
            works: self.works.clone(),
            uploads: self.uploads.clone(),
            body_limit: HttpState::body_limit_for(self.max_upload_bytes),
        }
    }
}
