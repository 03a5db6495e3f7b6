//! Query preprocessing
//!
//! Augments queries for better embedding recall (repeated terms are weighted
//! higher by embedding models) and synthesizes an exact-match metadata filter
//! when the query names an identifier.

use crate::adapters::MetadataFilter;
use crate::extract;

/// Rough query intent, recorded in event detail only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    IdentifierLookup,
    Comparison,
    General,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::IdentifierLookup => "identifier_lookup",
            QueryKind::Comparison => "comparison",
            QueryKind::General => "general",
        }
    }
}

/// Result of preprocessing one query
#[derive(Debug, Clone)]
pub struct ProcessedQuery {
    pub augmented_text: String,
    pub filter: Option<MetadataFilter>,
    pub kind: QueryKind,
}

/// Preprocess a query: extract identifiers, boost them, and build the
/// equality filter on the first identifier found.
pub fn process(query: &str, boost_factor: usize) -> ProcessedQuery {
    let identifiers = extract::extract_identifiers(query);

    if identifiers.is_empty() {
        return ProcessedQuery {
            augmented_text: query.to_string(),
            filter: None,
            kind: QueryKind::General,
        };
    }

    let mut boosted: Vec<&str> = Vec::with_capacity(identifiers.len() * boost_factor);
    for id in &identifiers {
        for _ in 0..boost_factor {
            boosted.push(id.as_str());
        }
    }
    let augmented_text = format!("{} {}", boosted.join(" "), query);

    let kind = if ["compare", " vs ", "versus", "difference"]
        .iter()
        .any(|kw| query.to_lowercase().contains(kw))
    {
        QueryKind::Comparison
    } else {
        QueryKind::IdentifierLookup
    };

    ProcessedQuery {
        augmented_text,
        filter: Some(MetadataFilter::identifier_equals(&identifiers[0])),
        kind,
    }
}
