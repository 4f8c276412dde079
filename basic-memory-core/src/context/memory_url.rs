//! memory:// URL scheme for knowledge addressing.
//!
//! ```text
//! memory://main/specs/search/*       pattern matching
//! memory://main/topic/search~ranking fuzzy within a segment
//! memory://main/specs/link-resolution exact permalink
//! ```
//!
//! The host is the project name; the path is a permalink within it.

use crate::error::{Error, Result};

/// A parsed memory:// address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryUrl {
    /// Project identifier (the URL host)
    pub project: String,
    /// Relative permalink path, without a leading slash
    pub path: String,
    /// Trailing `*`: prefix match
    pub prefix: bool,
    /// `~` anywhere in a segment: fuzzy match
    pub fuzzy: bool,
}

impl MemoryUrl {
    /// Parse a `memory://<project>/<path>` string.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .trim()
            .strip_prefix("memory://")
            .ok_or_else(|| Error::MemoryUrl(format!("must use memory:// scheme: {url}")))?;

        let (host, path) = rest
            .split_once('/')
            .ok_or_else(|| Error::MemoryUrl(format!("must include both project and path: {url}")))?;

        if host.is_empty() {
            return Err(Error::MemoryUrl(format!("missing project identifier: {url}")));
        }

        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(Error::MemoryUrl(format!("missing path: {url}")));
        }

        Ok(Self {
            project: host.to_string(),
            path: path.to_string(),
            prefix: path.ends_with('*'),
            fuzzy: path.contains('~'),
        })
    }

    /// The path with any trailing pattern marker removed.
    pub fn pattern_prefix(&self) -> &str {
        self.path.trim_end_matches('*').trim_end_matches('/')
    }

    /// Free-text form of the path for the search fallback: fuzzy markers
    /// become spaces.
    pub fn fuzzy_text(&self) -> String {
        self.pattern_prefix().replace('~', " ")
    }
}

impl std::fmt::Display for MemoryUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory://{}/{}", self.project, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact() {
        let url = MemoryUrl::parse("memory://main/specs/link-resolution").unwrap();
        assert_eq!(url.project, "main");
        assert_eq!(url.path, "specs/link-resolution");
        assert!(!url.prefix);
        assert!(!url.fuzzy);
    }

    #[test]
    fn test_parse_pattern() {
        let url = MemoryUrl::parse("memory://main/specs/search/*").unwrap();
        assert!(url.prefix);
        assert_eq!(url.pattern_prefix(), "specs/search");
    }

    #[test]
    fn test_parse_fuzzy() {
        let url = MemoryUrl::parse("memory://main/topic/search~ranking").unwrap();
        assert!(url.fuzzy);
        assert_eq!(url.fuzzy_text(), "topic/search ranking");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MemoryUrl::parse("http://main/x").is_err());
        assert!(MemoryUrl::parse("memory://main").is_err());
        assert!(MemoryUrl::parse("memory:///path").is_err());
        assert!(MemoryUrl::parse("memory://main/").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let url = MemoryUrl::parse("memory://main/notes/alpha").unwrap();
        assert_eq!(url.to_string(), "memory://main/notes/alpha");
    }
}
