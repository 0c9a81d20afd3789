use std::num::NonZeroU64;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use tracing::{info, instrument};

use crate::application::admin::AdminContext;
use crate::application::store::Payload;
use crate::application::writer::{WriteError, WriteReceipt, WriteRequest};
use crate::domain::documents::{AssetTarget, ImageExtension};
use crate::domain::error::DomainError;

/// An uploaded image after every input check has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: ImageExtension,
    pub bytes: Bytes,
}

impl DecodedImage {
    /// Check the extension, decode the payload and enforce the size limit.
    /// A `data:` URL prefix is tolerated.
    pub fn decode(
        filename: &str,
        content_base64: &str,
        max_bytes: NonZeroU64,
    ) -> Result<Self, DomainError> {
        let extension = ImageExtension::from_filename(filename)?;

        let encoded = content_base64
            .split_once(";base64,")
            .map_or(content_base64, |(_, data)| data)
            .trim();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|_| DomainError::validation("image content is not valid base64"))?;

        if bytes.is_empty() {
            return Err(DomainError::validation("image is empty"));
        }
        let limit = max_bytes.get();
        if bytes.len() as u64 > limit {
            return Err(DomainError::validation(format!(
                "image exceeds the {limit} byte limit"
            )));
        }

        Ok(Self {
            extension,
            bytes: Bytes::from(bytes),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Public URL of the committed image.
    pub url: String,
    pub write: WriteReceipt,
}

#[derive(Clone)]
pub struct UploadService {
    context: AdminContext,
    max_bytes: NonZeroU64,
}

impl UploadService {
    pub fn new(context: AdminContext, max_bytes: NonZeroU64) -> Self {
        Self { context, max_bytes }
    }

    pub async fn upload_author_icon(
        &self,
        credential: &str,
        provider_token: Option<&str>,
        filename: &str,
        content_base64: &str,
    ) -> Result<UploadReceipt, WriteError> {
        self.upload(
            credential,
            provider_token,
            AssetTarget::AuthorIcon,
            filename,
            content_base64,
        )
        .await
    }

    /// Commit an image to the path derived from `target`. Binary payloads go
    /// through the same conditional-write loop as documents.
    #[instrument(skip(self, credential, provider_token, content_base64))]
    pub async fn upload(
        &self,
        credential: &str,
        provider_token: Option<&str>,
        target: AssetTarget,
        filename: &str,
        content_base64: &str,
    ) -> Result<UploadReceipt, WriteError> {
        let image = DecodedImage::decode(filename, content_base64, self.max_bytes)?;

        let authorized = self.context.writer.authorize(credential).await?;
        let repo = self.context.current_repo().await?;
        let token = self.context.resolve_token(provider_token)?;

        let request = WriteRequest {
            path: target.path(image.extension),
            payload: Payload::Binary(image.bytes),
            message: target.commit_message().to_string(),
            repo,
            token,
        };
        let write = self.context.writer.commit(&authorized, &request).await?;
        let url = self.context.store.raw_url(&request.repo, &request.path);

        info!(
            target = "gitfolio::admin",
            path = %request.path,
            attempts = write.attempts,
            "image uploaded"
        );
        Ok(UploadReceipt { url, write })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(bytes: u64) -> NonZeroU64 {
        NonZeroU64::new(bytes).expect("non-zero")
    }

    #[test]
    fn decodes_plain_and_data_url_payloads() {
        let encoded = STANDARD.encode(b"\x89PNG");
        let image = DecodedImage::decode("me.png", &encoded, limit(1024)).expect("valid");
        assert_eq!(image.extension, ImageExtension::Png);
        assert_eq!(&image.bytes[..], b"\x89PNG");

        let data_url = format!("data:image/webp;base64,{encoded}");
        let image = DecodedImage::decode("me.webp", &data_url, limit(1024)).expect("valid");
        assert_eq!(image.extension, ImageExtension::Webp);
    }

    #[test]
    fn rejects_disallowed_extension_before_decoding() {
        let err = DecodedImage::decode("me.svg", "%%%", limit(1024)).expect_err("svg");
        assert_eq!(
            err.to_string(),
            "only png, jpg, jpeg, gif, webp are supported"
        );
    }

    #[test]
    fn rejects_bad_empty_and_oversized_payloads() {
        assert_eq!(
            DecodedImage::decode("a.png", "not base64!", limit(1024))
                .expect_err("bad")
                .to_string(),
            "image content is not valid base64"
        );
        assert_eq!(
            DecodedImage::decode("a.png", "", limit(1024))
                .expect_err("empty")
                .to_string(),
            "image is empty"
        );
        let encoded = STANDARD.encode([0u8; 16]);
        assert!(DecodedImage::decode("a.png", &encoded, limit(8)).is_err());
    }
}
