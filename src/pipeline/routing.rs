//! Subject-line routing parser.
//!
//! A routing subject has the shape `keyword - target`, e.g. `urgent - john`.
//! The first `-` is the separator; everything after it (including further
//! hyphens) belongs to the target name. There is no escaping.

use serde::{Deserialize, Serialize};

/// Separator between keyword and target name.
pub const SEPARATOR: char = '-';

/// Keyword and target name extracted from a subject line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingInstruction {
    pub keyword: String,
    pub target_name: String,
    /// True iff both `keyword` and `target_name` are non-empty.
    pub valid: bool,
}

impl RoutingInstruction {
    /// A valid instruction. Inputs are trimmed; validity is recomputed.
    pub fn new(keyword: impl AsRef<str>, target_name: impl AsRef<str>) -> Self {
        let keyword = keyword.as_ref().trim().to_string();
        let target_name = target_name.as_ref().trim().to_string();
        let valid = !keyword.is_empty() && !target_name.is_empty();
        Self {
            keyword,
            target_name,
            valid,
        }
    }

    /// An instruction that routes nowhere.
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Parse a subject line into a routing instruction.
///
/// Never fails: subjects without a usable split come back with `valid = false`.
/// `"A-B-C"` parses as keyword `"A"`, target `"B-C"`.
pub fn parse(subject: &str) -> RoutingInstruction {
    if subject.is_empty() {
        return RoutingInstruction::invalid();
    }

    match subject.split_once(SEPARATOR) {
        Some((keyword, target_name)) => RoutingInstruction::new(keyword, target_name),
        None => RoutingInstruction::invalid(),
    }
}
