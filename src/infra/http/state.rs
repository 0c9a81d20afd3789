use std::num::NonZeroU64;
use std::sync::Arc;

use crate::application::admin::{SettingsService, UploadService, WorksService};
use crate::application::auth::AuthorizationGate;
use crate::application::content::ContentReader;

/// Request bodies beyond the image itself: JSON framing and the filename.
const BODY_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub content: Arc<ContentReader>,
    pub gate: Arc<AuthorizationGate>,
    pub settings: SettingsService,
    pub works: WorksService,
    pub uploads: UploadService,
    /// Maximum accepted request body, in bytes.
    pub body_limit: usize,
}

impl HttpState {
    /// Body limit that admits a base64-encoded image of `max_upload_bytes`.
    pub fn body_limit_for(max_upload_bytes: NonZeroU64) -> usize {
        let raw = usize::try_from(max_upload_bytes.get()).unwrap_or(usize::MAX);
        raw.div_ceil(3)
            .saturating_mul(4)
            .saturating_add(BODY_OVERHEAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_limit_covers_base64_expansion() {
        let limit = HttpState::body_limit_for(NonZeroU64::new(3 * 1024).expect("non-zero"));
        assert_eq!(limit, 4 * 1024 + BODY_OVERHEAD);
    }
}
