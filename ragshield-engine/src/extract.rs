//! Entity extraction
//!
//! Pulls structured identifiers out of free text. The shipped extractor
//! recognizes CVE identifiers; further extractors (software names, versions)
//! must keep the same `(text) -> set` shape.

use once_cell::sync::Lazy;
use regex::Regex;

static CVE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CVE-\d{4}-\d{4,7}").expect("CVE pattern is valid"));

/// Extract CVE identifiers from text, normalized to upper case,
/// first-occurrence order, duplicates removed.
pub fn extract_identifiers(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut identifiers = Vec::new();
    for m in CVE_PATTERN.find_iter(text) {
        let normalized = m.as_str().to_uppercase();
        if seen.insert(normalized.clone()) {
            identifiers.push(normalized);
        }
    }
    identifiers
}

/// Whether the text contains at least one identifier
pub fn has_identifier(text: &str) -> bool {
    CVE_PATTERN.is_match(text)
}
