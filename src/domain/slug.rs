//! Identifier hygiene for anything that ends up inside a store path.
//!
//! Document names read from a directory listing and identifiers supplied by
//! callers are both interpolated into repository paths, so both are held to
//! the same `[A-Za-z0-9_-]` alphabet. Validation rejects; sanitization strips.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("identifier is empty after sanitization")]
    Empty,
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

/// Returns `true` when `slug` may be used verbatim as a path segment.
pub fn validate_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.chars().all(is_identifier_char)
        && !slug.contains("..")
        && !slug.contains('/')
}

/// Strip every character outside `[A-Za-z0-9_-]`.
///
/// Fails when nothing is left, so callers never build a path with an empty
/// segment.
pub fn sanitize_identifier(raw: &str) -> Result<String, SlugError> {
    let cleaned: String = raw.chars().filter(|ch| is_identifier_char(*ch)).collect();
    if cleaned.is_empty() {
        return Err(SlugError::Empty);
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_slug("hello-world_2024"));
        assert!(validate_slug("A"));
    }

    #[test]
    fn rejects_traversal_and_separators() {
        assert!(!validate_slug(""));
        assert!(!validate_slug("../etc"));
        assert!(!validate_slug("a/b"));
        assert!(!validate_slug("a.b"));
        assert!(!validate_slug("space here"));
    }

    #[test]
    fn sanitize_strips_disallowed_characters() {
        assert_eq!(
            sanitize_identifier("../../work-1/..").as_deref(),
            Ok("work-1")
        );
        assert_eq!(sanitize_identifier("a b_c").as_deref(), Ok("ab_c"));
    }

    #[test]
    fn sanitize_rejects_empty_result() {
        assert_eq!(sanitize_identifier("../.."), Err(SlugError::Empty));
        assert_eq!(sanitize_identifier(""), Err(SlugError::Empty));
    }
}
