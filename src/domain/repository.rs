//! Coordinates of the backing GitHub repository.

use std::fmt;

use url::Url;

use super::error::DomainError;

pub const REPO_URL_MAX_LENGTH: usize = 500;

const REPO_URL_FORMAT_HINT: &str = "repository URL must look like https://github.com/{owner}/{repo}";

/// `owner/repo` pair parsed from a `https://github.com/{owner}/{repo}` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse a repository URL, accepting an optional trailing slash and
    /// nothing else beyond the two path segments.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.len() > REPO_URL_MAX_LENGTH {
            return Err(DomainError::validation(format!(
                "repository URL must be at most {REPO_URL_MAX_LENGTH} characters"
            )));
        }

        let url = Url::parse(trimmed).map_err(|_| DomainError::validation(REPO_URL_FORMAT_HINT))?;
        if url.scheme() != "https"
            || url.host_str() != Some("github.com")
            || url.port().is_some()
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
        {
            return Err(DomainError::validation(REPO_URL_FORMAT_HINT));
        }

        let path = url.path().trim_start_matches('/');
        let path = path.strip_suffix('/').unwrap_or(path);
        let mut segments = path.split('/');
        let (Some(owner), Some(repo), None) = (segments.next(), segments.next(), segments.next())
        else {
            return Err(DomainError::validation(REPO_URL_FORMAT_HINT));
        };

        let owner_ok = !owner.is_empty()
            && owner
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        let repo_ok = !repo.is_empty()
            && repo
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'));
        if !owner_ok || !repo_ok {
            return Err(DomainError::validation(REPO_URL_FORMAT_HINT));
        }

        Ok(Self::new(owner, repo))
    }

    /// Convenience for callers holding an optional, possibly blank URL.
    pub fn parse_optional(raw: Option<&str>) -> Option<Self> {
        raw.filter(|value| !value.trim().is_empty())
            .and_then(|value| Self::parse(value).ok())
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
