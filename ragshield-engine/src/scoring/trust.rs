//! Trust signal: source reputation lookup
//!
//! Scores a document by the reputation of its metadata source. The table
//! maps source prefixes to scores; the longest matching prefix wins and
//! unlisted sources score a neutral 0.5.

use ragshield_common::schemas::DocumentMetadata;

pub struct TrustScorer {
    /// (lowercased prefix, score)
    table: Vec<(String, f64)>,
}

impl TrustScorer {
    pub fn new(table: Vec<(String, f64)>) -> Self {
        let table = table
            .into_iter()
            .map(|(prefix, score)| (prefix.to_lowercase(), score.clamp(0.0, 1.0)))
            .collect();
        Self { table }
    }

    pub fn score(&self, metadata: &DocumentMetadata) -> f64 {
        let source = metadata.source.to_lowercase();

        let mut best: Option<(&str, f64)> = None;
        for (prefix, score) in &self.table {
            if source.starts_with(prefix.as_str()) {
                match best {
                    Some((current, _)) if current.len() >= prefix.len() => {}
                    _ => best = Some((prefix.as_str(), *score)),
                }
            }
        }

        best.map(|(_, score)| score).unwrap_or(0.5)
    }
}
