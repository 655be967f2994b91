//! Server-name matching for fan-out listings.
//!
//! A pattern supplied to `mcp.listTools("...")` or a search `server` filter
//! is tried as a case-insensitive regular expression first; if it does not
//! parse, it degrades to a case-insensitive literal equality match. Both the
//! capability API and the search engine go through this type so the
//! fallback behaviour stays identical.

use regex::{Regex, RegexBuilder};

/// Compiled server-name filter.
#[derive(Debug, Clone)]
pub enum ServerMatcher {
    /// No pattern supplied: every server matches.
    Any,
    /// The pattern compiled as a case-insensitive regex.
    Pattern(Regex),
    /// Unparseable pattern, kept as a lowercased literal.
    Literal(String),
}

impl ServerMatcher {
    /// Build a matcher from an optional pattern.
    pub fn new(pattern: Option<&str>) -> Self {
        let Some(p) = pattern else {
            return ServerMatcher::Any;
        };
        match RegexBuilder::new(p).case_insensitive(true).build() {
            Ok(re) => ServerMatcher::Pattern(re),
            Err(_) => ServerMatcher::Literal(p.to_lowercase()),
        }
    }

    /// Whether the given server name passes the filter.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            ServerMatcher::Any => true,
            ServerMatcher::Pattern(re) => re.is_match(name),
            ServerMatcher::Literal(lit) => name.to_lowercase() == *lit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_pattern_matches_everything() {
        let m = ServerMatcher::new(None);
        assert!(m.matches("github"));
        assert!(m.matches(""));
    }

    #[test]
    fn regex_pattern_is_case_insensitive() {
        let m = ServerMatcher::new(Some("^git"));
        assert!(m.matches("github"));
        assert!(m.matches("GitLab"));
        assert!(!m.matches("jira"));
    }

    #[test]
    fn unparseable_pattern_falls_back_to_equality() {
        // "[" is not a valid regex
        let m = ServerMatcher::new(Some("[broken"));
        assert!(matches!(m, ServerMatcher::Literal(_)));
        assert!(m.matches("[BROKEN"));
        assert!(!m.matches("[broken-extra"));
    }

    #[test]
    fn literal_fallback_lowercases_both_sides() {
        let m = ServerMatcher::new(Some("[Github"));
        assert!(m.matches("[github"));
    }

    #[test]
    fn substring_regex_matches_anywhere() {
        let m = ServerMatcher::new(Some("hub"));
        assert!(m.matches("github"));
    }
}
