//! Store paths of the documents and assets the admin surface writes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::slug::{sanitize_identifier, validate_slug};

/// Directory holding every administrative document inside the repository.
pub const META_DIR: &str = ".obsidian-log";
pub const CONFIG_PATH: &str = ".obsidian-log/config.json";
pub const WORKS_PATH: &str = ".obsidian-log/works.json";
pub const SCRAPS_DIR: &str = "scraps";

const AUTHOR_ICON_STEM: &str = ".obsidian-log/author-icon";
const WORKS_ASSET_DIR: &str = ".obsidian-log/works";

/// A path inside the remote repository.
///
/// Constructed only through the helpers below, which never interpolate
/// unchecked input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn config() -> Self {
        Self(CONFIG_PATH.to_string())
    }

    pub fn works() -> Self {
        Self(WORKS_PATH.to_string())
    }

    pub fn scrap(slug: &str) -> Result<Self, DomainError> {
        if !validate_slug(slug) {
            return Err(DomainError::validation(format!("invalid scrap slug `{slug}`")));
        }
        Ok(Self(format!("{SCRAPS_DIR}/{slug}.json")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_works(&self) -> bool {
        self.0 == WORKS_PATH
    }

    pub fn is_author_icon(&self) -> bool {
        self.0
            .strip_prefix(AUTHOR_ICON_STEM)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|ext| ImageExtension::from_extension(ext).is_some())
    }

    pub fn is_work_asset(&self) -> bool {
        self.0
            .strip_prefix(WORKS_ASSET_DIR)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image formats accepted for uploaded assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageExtension {
    Png,
    Jpg,
    Jpeg,
    Gif,
    Webp,
}

impl ImageExtension {
    pub const ALL: [ImageExtension; 5] = [
        ImageExtension::Png,
        ImageExtension::Jpg,
        ImageExtension::Jpeg,
        ImageExtension::Gif,
        ImageExtension::Webp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageExtension::Png => "png",
            ImageExtension::Jpg => "jpg",
            ImageExtension::Jpeg => "jpeg",
            ImageExtension::Gif => "gif",
            ImageExtension::Webp => "webp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let lowered = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == lowered)
    }

    /// Pick the extension from an uploaded filename. A name without a dot is
    /// treated as `png`.
    pub fn from_filename(filename: &str) -> Result<Self, DomainError> {
        let ext = match filename.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => "png",
        };
        Self::from_extension(ext)
            .ok_or_else(|| DomainError::validation("only png, jpg, jpeg, gif, webp are supported"))
    }
}

/// Where an uploaded image is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetTarget {
    AuthorIcon,
    WorkThumbnail { work_id: String },
}

impl AssetTarget {
    /// Build a work-thumbnail target from a caller-supplied identifier.
    pub fn work_thumbnail(raw_id: &str) -> Result<Self, DomainError> {
        let work_id =
            sanitize_identifier(raw_id).map_err(|_| DomainError::validation("invalid work id"))?;
        Ok(Self::WorkThumbnail { work_id })
    }

    pub fn path(&self, ext: ImageExtension) -> DocumentPath {
        let ext = ext.as_str();
        match self {
            AssetTarget::AuthorIcon => DocumentPath(format!("{AUTHOR_ICON_STEM}.{ext}")),
            AssetTarget::WorkThumbnail { work_id } => {
                DocumentPath(format!("{WORKS_ASSET_DIR}/{work_id}/thumbnail.{ext}"))
            }
        }
    }

    pub fn commit_message(&self) -> &'static str {
        match self {
            AssetTarget::AuthorIcon => "chore: update author icon",
            AssetTarget::WorkThumbnail { .. } => "chore: update work thumbnail",
        }
    }
}
