use tracing::{info, instrument};

use crate::application::admin::AdminContext;
use crate::application::store::Payload;
use crate::application::writer::{WriteError, WriteReceipt, WriteRequest};
use crate::domain::documents::DocumentPath;
use crate::domain::repository::RepoRef;
use crate::domain::site_config::SiteConfigPatch;

const COMMIT_MESSAGE: &str = "chore: update site config";

#[derive(Clone)]
pub struct SettingsService {
    context: AdminContext,
}

impl SettingsService {
    pub fn new(context: AdminContext) -> Self {
        Self { context }
    }

    /// Replace the configuration document with the current one overlaid by
    /// `patch`.
    ///
    /// A blank repository URL in the patch keeps the current one (or the
    /// configured fallback). The admins list is kept unless the patch
    /// supplies one.
    #[instrument(skip_all)]
    pub async fn update(
        &self,
        credential: &str,
        provider_token: Option<&str>,
        patch: SiteConfigPatch,
    ) -> Result<WriteReceipt, WriteError> {
        patch.validate()?;

        let authorized = self.context.writer.authorize(credential).await?;

        let current = self.context.content.config().await;
        let repo = RepoRef::parse_optional(patch.github_repo_url.as_deref())
            .or_else(|| current.repo())
            .or_else(|| self.context.content.fallback_repo().cloned())
            .ok_or(WriteError::RepositoryUnavailable)?;
        let token = self.context.resolve_token(provider_token)?;

        let mut next = current.overlay(&patch);
        next.github_repo_url = repo.html_url();
        let body = next.to_pretty_json()?;

        let request = WriteRequest {
            repo,
            path: DocumentPath::config(),
            payload: Payload::Text(body),
            message: COMMIT_MESSAGE.to_string(),
            token,
        };
        let receipt = self.context.writer.commit(&authorized, &request).await?;

        self.context
            .mirror(&request.path, request.payload.as_bytes())
            .await;
        // The local copy decides which repository later reads go to.
        self.context.content.cache().invalidate_content();

        info!(
            target = "gitfolio::admin",
            handle = authorized.handle(),
            attempts = receipt.attempts,
            "site configuration updated"
        );
        Ok(receipt)
    }
}
