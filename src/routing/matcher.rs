//! Route matching logic.
//!
//! # Responsibilities
//! - Match the request path against a configured prefix
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefixes match on segment boundaries: `/api` matches `/api` and
//!   `/api/users` but not `/apis`
//! - No regex to guarantee O(n) matching

/// Matches the request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true if `path` lies under this prefix.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || self.prefix.ends_with('/') || rest.starts_with('/'),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");

        assert!(matcher.matches("/api"));
        assert!(matcher.matches("/api/"));
        assert!(matcher.matches("/api/v1/widgets"));
        assert!(!matcher.matches("/images"));
        assert!(!matcher.matches("/apis"));
        assert!(!matcher.matches("/API/v1")); // Case sensitive
    }

    #[test]
    fn trailing_slash_prefix() {
        let matcher = PathPrefixMatcher::new("/api/");
        assert!(matcher.matches("/api/users"));
        assert!(!matcher.matches("/api"));
    }

    #[test]
    fn root_prefix_matches_everything() {
        let matcher = PathPrefixMatcher::new("/");
        assert!(matcher.matches("/"));
        assert!(matcher.matches("/anything/at/all"));
    }
}
