//! Logical cache keys and the document → key dependency map.

use std::fmt;

use crate::domain::documents::DocumentPath;

/// Identifies a piece of fetched or derived content.
///
/// The string form is what the cache stores; it is distinct from the path of
/// the document the content was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    Articles,
    Scraps,
    Blog,
    /// Site configuration, including the admin allow-list.
    Config,
    Works,
    HomePage,
    TechPage,
    AuthorPage,
    /// A single scrap. Not part of [`ContentKey::CONTENT`]; expires by TTL.
    Scrap(String),
}

impl ContentKey {
    /// Every key that represents externally-sourced content.
    pub const CONTENT: [ContentKey; 8] = [
        ContentKey::Articles,
        ContentKey::Scraps,
        ContentKey::Blog,
        ContentKey::Config,
        ContentKey::Works,
        ContentKey::HomePage,
        ContentKey::TechPage,
        ContentKey::AuthorPage,
    ];

    pub fn as_cache_key(&self) -> String {
        match self {
            ContentKey::Articles => "articles".to_string(),
            ContentKey::Scraps => "scraps".to_string(),
            ContentKey::Blog => "blog".to_string(),
            ContentKey::Config => "config".to_string(),
            ContentKey::Works => "works".to_string(),
            ContentKey::HomePage => "page:home".to_string(),
            ContentKey::TechPage => "page:tech".to_string(),
            ContentKey::AuthorPage => "page:author".to_string(),
            ContentKey::Scrap(slug) => format!("scrap:{slug}"),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = match raw {
            "articles" => ContentKey::Articles,
            "scraps" => ContentKey::Scraps,
            "blog" => ContentKey::Blog,
            "config" => ContentKey::Config,
            "works" => ContentKey::Works,
            "page:home" => ContentKey::HomePage,
            "page:tech" => ContentKey::TechPage,
            "page:author" => ContentKey::AuthorPage,
            other => ContentKey::Scrap(other.strip_prefix("scrap:")?.to_string()),
        };
        Some(key)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_cache_key())
    }
}

/// Keys whose cached value may be derived from the document at `path`.
///
/// The configuration document carries the repository location and the
/// allow-list, so every content key depends on it. Unknown paths are treated
/// the same way.
pub fn dependents_of(path: &DocumentPath) -> Vec<ContentKey> {
    if path.is_works() || path.is_work_asset() {
        return vec![ContentKey::Works, ContentKey::AuthorPage];
    }
    if path.is_author_icon() {
        return vec![ContentKey::Config, ContentKey::AuthorPage];
    }
    ContentKey::CONTENT.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::documents::{AssetTarget, ImageExtension};

    #[test]
    fn string_forms_round_trip() {
        for key in ContentKey::CONTENT {
            assert_eq!(ContentKey::parse(&key.as_cache_key()), Some(key.clone()));
        }
        assert_eq!(
            ContentKey::parse("scrap:hello"),
            Some(ContentKey::Scrap("hello".to_string()))
        );
        assert_eq!(ContentKey::parse("nope"), None);
    }

    #[test]
    fn page_keys_use_colon_form() {
        assert_eq!(ContentKey::HomePage.as_cache_key(), "page:home");
        assert_eq!(ContentKey::AuthorPage.to_string(), "page:author");
    }

    #[test]
    fn config_write_touches_every_content_key() {
        let keys = dependents_of(&DocumentPath::config());
        assert!(keys.contains(&ContentKey::Config));
        assert!(keys.contains(&ContentKey::HomePage));
        assert_eq!(keys.len(), ContentKey::CONTENT.len());
    }

    #[test]
    fn works_and_assets_are_narrow() {
        assert_eq!(
            dependents_of(&DocumentPath::works()),
            vec![ContentKey::Works, ContentKey::AuthorPage]
        );
        let thumb = AssetTarget::work_thumbnail("w1")
            .expect("valid")
            .path(ImageExtension::Png);
        assert_eq!(
            dependents_of(&thumb),
            vec![ContentKey::Works, ContentKey::AuthorPage]
        );
        let icon = AssetTarget::AuthorIcon.path(ImageExtension::Png);
        assert_eq!(
            dependents_of(&icon),
            vec![ContentKey::Config, ContentKey::AuthorPage]
        );
    }
}
