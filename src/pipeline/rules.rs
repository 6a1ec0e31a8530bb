//! Keyword allow-list.
//!
//! Runs after subject parsing and before any target lookup. Only messages
//! whose keyword is an exact, case-sensitive member of the allow-list move on.

use tracing::debug;

/// Check a keyword against an allow-list.
///
/// - Empty list → deny all
/// - Exact, case-sensitive match only (no trimming, no wildcards)
pub fn is_keyword_allowed(keyword: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|a| a == keyword)
}

/// Allow-list of routing keywords eligible for forwarding.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    allowed: Vec<String>,
}

impl KeywordFilter {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Whether messages carrying `keyword` may be forwarded.
    pub fn allows(&self, keyword: &str) -> bool {
        let allowed = is_keyword_allowed(keyword, &self.allowed);
        if !allowed {
            debug!(keyword = keyword, "Keyword not in allow-list");
        }
        allowed
    }

    pub fn keywords(&self) -> &[String] {
        &self.allowed
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
