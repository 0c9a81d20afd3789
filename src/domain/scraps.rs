//! Scrap documents (`scraps/{slug}.json`).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Preview length in characters, before the ellipsis.
pub const PREVIEW_CHARS: usize = 100;

static MARKDOWN_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"#{1,6}\s+", ""),
        (r"\*\*([^*]+)\*\*", "$1"),
        (r"\*([^*]+)\*", "$1"),
        (r"`([^`]+)`", "$1"),
        (r"\[([^\]]+)\]\([^)]+\)", "$1"),
        (r"(?m)^[-*]\s+", ""),
        (r"\n+", " "),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapComment {
    pub author: String,
    pub created_at: String,
    pub body_markdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ScrapComment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scrap {
    pub title: String,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub archived: bool,
    pub created_at: String,
    #[serde(default)]
    pub comments: Vec<ScrapComment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapWithSlug {
    pub slug: String,
    #[serde(flatten)]
    pub scrap: Scrap,
}

impl ScrapWithSlug {
    pub fn parse(slug: &str, raw: &[u8]) -> Result<Self, serde_json::Error> {
        let scrap: Scrap = serde_json::from_slice(raw)?;
        Ok(Self {
            slug: slug.to_string(),
            scrap,
        })
    }
}

impl ScrapComment {
    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.body_markdown);
        for child in &self.children {
            out.push(' ');
            child.collect_text(out);
        }
    }
}

impl ScrapWithSlug {
    /// Lowercased title and every comment body, nested replies included.
    pub fn search_text(&self) -> String {
        let mut text = self.scrap.title.clone();
        for comment in &self.scrap.comments {
            text.push(' ');
            comment.collect_text(&mut text);
        }
        text.to_lowercase()
    }

    /// True when every whitespace-separated term of `query` occurs in the
    /// search text. A blank query matches everything.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        let text = self.search_text();
        query.split_whitespace().all(|term| text.contains(term))
    }

    /// First comment as plain text, cut to `max_chars` with a trailing `…`.
    pub fn preview(&self, max_chars: usize) -> String {
        let Some(first) = self.scrap.comments.first() else {
            return String::new();
        };
        let plain = MARKDOWN_RULES
            .iter()
            .fold(first.body_markdown.clone(), |text, (re, replacement)| {
                re.replace_all(&text, *replacement).into_owned()
            });
        let plain = plain.trim();
        if plain.chars().count() > max_chars {
            let mut cut: String = plain.chars().take(max_chars).collect();
            cut.push('…');
            cut
        } else {
            plain.to_string()
        }
    }
}

/// A scrap as listed, with a short plain-text preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapListing {
    #[serde(flatten)]
    pub scrap: ScrapWithSlug,
    pub preview: String,
}

impl From<ScrapWithSlug> for ScrapListing {
    fn from(scrap: ScrapWithSlug) -> Self {
        let preview = scrap.preview(PREVIEW_CHARS);
        Self { scrap, preview }
    }
}

/// Newest first. Timestamps are ISO-8601 strings, so lexical order works.
pub fn sort_newest_first(scraps: &mut [ScrapWithSlug]) {
    scraps.sort_by(|a, b| b.scrap.created_at.cmp(&a.scrap.created_at));
}
