//! Path rewriting.
//!
//! Rewrite patterns are regular expressions written the way dev-server
//! configs spell them (`^/api`, `^/api/v[0-9]+`). Every pattern is
//! anchored at the start of the path: it is compiled as `^(?:pattern)`
//! with any leading `^` removed first, so a rule never rewrites the
//! middle of a path, even through an alternation.
//! Replacements may refer to capture groups (`$1`, `${name}`).

use regex::Regex;

/// A compiled `pattern` → `replacement` pair.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    /// Compile `pattern`, anchoring it at the start of the path.
    pub fn parse(pattern: &str, replacement: impl Into<String>) -> Result<Self, String> {
        let body = pattern.strip_prefix('^').unwrap_or(pattern);
        let anchored = format!("^(?:{})", body);
        let pattern = Regex::new(&anchored)
            .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;

        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }

    /// The anchored pattern as compiled.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Apply this rule, returning `None` if the pattern does not match.
    pub fn apply(&self, path: &str) -> Option<String> {
        if !self.pattern.is_match(path) {
            return None;
        }
        Some(
            self.pattern
                .replace(path, self.replacement.as_str())
                .into_owned(),
        )
    }
}

/// Rewrite `path` with the first rule that matches; unmatched paths pass through.
pub fn rewrite_path(path: &str, rules: &[RewriteRule]) -> String {
    rules
        .iter()
        .find_map(|rule| rule.apply(path))
        .unwrap_or_else(|| path.to_string())
}
