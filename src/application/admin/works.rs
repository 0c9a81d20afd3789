use tracing::{info, instrument};

use crate::application::admin::AdminContext;
use crate::application::admin::uploads::{UploadReceipt, UploadService};
use crate::application::store::Payload;
use crate::application::writer::{WriteError, WriteReceipt, WriteRequest};
use crate::domain::documents::{AssetTarget, DocumentPath};
use crate::domain::error::DomainError;
use crate::domain::works::{WorkItemInput, WorksData};

const COMMIT_MESSAGE: &str = "chore: update works";

#[derive(Clone)]
pub struct WorksService {
    context: AdminContext,
    uploads: UploadService,
}

impl WorksService {
    pub fn new(context: AdminContext, uploads: UploadService) -> Self {
        Self { context, uploads }
    }

    /// Replace the whole works list. Items without an id get a generated one.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn replace(
        &self,
        credential: &str,
        provider_token: Option<&str>,
        items: Vec<WorkItemInput>,
    ) -> Result<WriteReceipt, WriteError> {
        if items.iter().any(|item| item.title.trim().is_empty()) {
            return Err(DomainError::validation("every work needs a title").into());
        }
        let works = WorksData {
            items: items.into_iter().map(WorkItemInput::into_item).collect(),
        };
        let body = works.to_pretty_json()?;

        let authorized = self.context.writer.authorize(credential).await?;
        let repo = self.context.current_repo().await?;
        let token = self.context.resolve_token(provider_token)?;

        let request = WriteRequest {
            repo,
            path: DocumentPath::works(),
            payload: Payload::Text(body),
            message: COMMIT_MESSAGE.to_string(),
            token,
        };
        let receipt = self.context.writer.commit(&authorized, &request).await?;
        self.context
            .mirror(&request.path, request.payload.as_bytes())
            .await;

        info!(
            target = "gitfolio::admin",
            items = works.items.len(),
            attempts = receipt.attempts,
            "works updated"
        );
        Ok(receipt)
    }

    pub async fn upload_thumbnail(
        &self,
        credential: &str,
        provider_token: Option<&str>,
        work_id: &str,
        filename: &str,
        content_base64: &str,
    ) -> Result<UploadReceipt, WriteError> {
        let target = AssetTarget::work_thumbnail(work_id)?;
        self.uploads
            .upload(credential, provider_token, target, filename, content_base64)
            .await
    }
}
