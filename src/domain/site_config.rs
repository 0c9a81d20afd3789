//! Site configuration document (`.obsidian-log/config.json`).
//!
//! The document is always written whole. Partial updates are expressed as a
//! [`SiteConfigPatch`] and overlaid on the current document before writing.

use serde::{Deserialize, Serialize};

use super::documents::{ImageExtension, META_DIR};
use super::error::DomainError;
use super::repository::RepoRef;

const ZENN_USERNAME_MAX_LENGTH: usize = 50;
const SITE_TITLE_MAX_LENGTH: usize = 100;
const SITE_SUBTITLE_MAX_LENGTH: usize = 200;
const AUTHOR_NAME_MAX_LENGTH: usize = 100;
const AUTHOR_ONE_LINER_MAX_LENGTH: usize = 200;
const AUTHOR_ICON_MAX_LENGTH: usize = 2000;
const RAW_CONTENT_PREFIX: &str = "https://raw.githubusercontent.com/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub github_repo_url: String,
    pub zenn_username: String,
    pub author_name: String,
    pub admins: Vec<String>,
    pub site_title: String,
    pub site_subtitle: String,
    pub author_icon: String,
    pub author_one_liner: String,
}

impl SiteConfig {
    pub fn repo(&self) -> Option<RepoRef> {
        RepoRef::parse_optional(Some(self.github_repo_url.as_str()))
    }

    /// Apply every field the patch carries, trimming string values.
    pub fn overlay(&self, patch: &SiteConfigPatch) -> SiteConfig {
        fn pick(current: &str, supplied: Option<&String>) -> String {
            match supplied {
                Some(value) => value.trim().to_string(),
                None => current.to_string(),
            }
        }

        SiteConfig {
            github_repo_url: pick(&self.github_repo_url, patch.github_repo_url.as_ref()),
            zenn_username: pick(&self.zenn_username, patch.zenn_username.as_ref()),
            author_name: pick(&self.author_name, patch.author_name.as_ref()),
            admins: match patch.admins.as_ref() {
                Some(admins) => admins
                    .iter()
                    .map(|admin| admin.trim().to_string())
                    .filter(|admin| !admin.is_empty())
                    .collect(),
                None => self.admins.clone(),
            },
            site_title: pick(&self.site_title, patch.site_title.as_ref()),
            site_subtitle: pick(&self.site_subtitle, patch.site_subtitle.as_ref()),
            author_icon: pick(&self.author_icon, patch.author_icon.as_ref()),
            author_one_liner: pick(&self.author_one_liner, patch.author_one_liner.as_ref()),
        }
    }

    pub fn to_pretty_json(&self) -> Result<String, DomainError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| DomainError::invariant(format!("config serialization failed: {err}")))
    }
}

/// Fields a caller may change; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiteConfigPatch {
    pub github_repo_url: Option<String>,
    pub zenn_username: Option<String>,
    pub author_name: Option<String>,
    pub admins: Option<Vec<String>>,
    pub site_title: Option<String>,
    pub site_subtitle: Option<String>,
    pub author_icon: Option<String>,
    pub author_one_liner: Option<String>,
}

impl SiteConfigPatch {
    /// Reject malformed or oversized fields before anything talks to a remote.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(url) = self.github_repo_url.as_deref() {
            validate_github_repo_url(url)?;
        }
        if let Some(name) = self.zenn_username.as_deref() {
            validate_zenn_username(name)?;
        }
        if let Some(name) = self.author_name.as_deref() {
            ensure_max_chars(name, AUTHOR_NAME_MAX_LENGTH, "author name")?;
        }
        if let Some(title) = self.site_title.as_deref() {
            ensure_max_chars(title, SITE_TITLE_MAX_LENGTH, "site title")?;
        }
        if let Some(subtitle) = self.site_subtitle.as_deref() {
            ensure_max_chars(subtitle, SITE_SUBTITLE_MAX_LENGTH, "site subtitle")?;
        }
        if let Some(icon) = self.author_icon.as_deref() {
            validate_author_icon(icon)?;
        }
        if let Some(line) = self.author_one_liner.as_deref() {
            ensure_max_chars(line, AUTHOR_ONE_LINER_MAX_LENGTH, "author one-liner")?;
        }
        Ok(())
    }
}

/// An empty URL is valid and means "keep whatever is configured".
pub fn validate_github_repo_url(value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    RepoRef::parse(value).map(|_| ())
}

pub fn validate_zenn_username(value: &str) -> Result<(), DomainError> {
    ensure_max_chars(value, ZENN_USERNAME_MAX_LENGTH, "zenn username")?;
    let trimmed = value.trim();
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
    {
        return Err(DomainError::validation(
            "zenn username may only contain lowercase letters, digits, hyphens and underscores",
        ));
    }
    Ok(())
}

pub fn validate_author_icon(value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Ok(());
    }
    ensure_max_chars(value, AUTHOR_ICON_MAX_LENGTH, "author icon")?;

    let trimmed = value.trim();
    if trimmed.starts_with(RAW_CONTENT_PREFIX) {
        return Ok(());
    }
    let is_repo_image = trimmed
        .strip_prefix(META_DIR)
        .is_some_and(|rest| rest.starts_with('/'))
        && trimmed
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ImageExtension::from_extension(ext).is_some());
    if is_repo_image {
        return Ok(());
    }
    Err(DomainError::validation("author icon must be a valid image URL"))
}

fn ensure_max_chars(value: &str, max: usize, field: &str) -> Result<(), DomainError> {
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SiteConfig {
        SiteConfig {
            github_repo_url: "https://github.com/octo/blog".to_string(),
            zenn_username: "octo".to_string(),
            author_name: "Octo".to_string(),
            admins: vec!["octo".to_string()],
            site_title: "Old title".to_string(),
            site_subtitle: "Sub".to_string(),
            author_icon: String::new(),
            author_one_liner: String::new(),
        }
    }

    #[test]
    fn overlay_replaces_only_supplied_fields() {
        let patch = SiteConfigPatch {
            site_title: Some("  New title  ".to_string()),
            ..Default::default()
        };
        let next = sample().overlay(&patch);
        assert_eq!(next.site_title, "New title");
        assert_eq!(next.admins, vec!["octo".to_string()]);
        assert_eq!(next.github_repo_url, "https://github.com/octo/blog");
    }

    #[test]
    fn overlay_can_replace_admins() {
        let patch = SiteConfigPatch {
            admins: Some(vec!["alice".to_string(), " ".to_string(), " bob ".to_string()]),
            ..Default::default()
        };
        let next = sample().overlay(&patch);
        assert_eq!(next.admins, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn json_uses_document_field_names() {
        let value = serde_json::to_value(sample()).expect("serializes");
        for field in [
            "github_repo_url",
            "zenn_username",
            "author_name",
            "admins",
            "site_title",
            "site_subtitle",
            "author_icon",
            "author_one_liner",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn missing_fields_default_when_parsing() {
        let parsed: SiteConfig =
            serde_json::from_str(r#"{"admins":["a"],"site_title":"T"}"#).expect("parses");
        assert_eq!(parsed.admins, vec!["a".to_string()]);
        assert_eq!(parsed.author_name, "");
    }

    #[test]
    fn patch_validation_rejects_bad_fields() {
        let bad_url = SiteConfigPatch {
            github_repo_url: Some("https://example.com/a/b".to_string()),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let bad_zenn = SiteConfigPatch {
            zenn_username: Some("Upper".to_string()),
            ..Default::default()
        };
        assert!(bad_zenn.validate().is_err());

        let long_title = SiteConfigPatch {
            site_title: Some("t".repeat(101)),
            ..Default::default()
        };
        assert!(long_title.validate().is_err());

        let ok = SiteConfigPatch {
            github_repo_url: Some(String::new()),
            site_title: Some("t".repeat(100)),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn author_icon_accepts_raw_urls_and_repo_images() {
        assert!(validate_author_icon("").is_ok());
        assert!(validate_author_icon("https://raw.githubusercontent.com/o/r/main/x.png").is_ok());
        assert!(validate_author_icon(".obsidian-log/author-icon.webp").is_ok());
        assert!(validate_author_icon(".obsidian-log/author-icon.svg").is_err());
        assert!(validate_author_icon("https://evil.example/x.png").is_err());
    }
}
