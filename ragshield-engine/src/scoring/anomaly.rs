//! Anomaly signal: retrieval-set distribution analysis
//!
//! Unlike the other signals this one scores the retrieved set as a whole: a
//! homogeneous result set from one source, or a set containing one document
//! whose trust is a statistical outlier, is suspicious regardless of any
//! single document's content.

use crate::retrieval::RetrievedDocument;
use crate::scoring::trust::TrustScorer;
use std::collections::HashSet;

pub struct AnomalyScorer;

impl AnomalyScorer {
    /// Score in [0, 1]; shared by every document of the current retrieval.
    pub fn score(trust: &TrustScorer, retrieved: &[RetrievedDocument]) -> f64 {
        if retrieved.is_empty() {
            return 1.0;
        }

        let unique_sources: HashSet<&str> = retrieved
            .iter()
            .map(|r| r.doc.metadata.source.as_str())
            .collect();
        let diversity_ratio = unique_sources.len() as f64 / retrieved.len() as f64;
        let diversity = if diversity_ratio >= 0.7 {
            1.0
        } else if diversity_ratio >= 0.4 {
            0.7
        } else {
            0.5
        };

        let trust_scores: Vec<f64> = retrieved
            .iter()
            .map(|r| trust.score(&r.doc.metadata))
            .collect();
        let variance_penalty: f64 = if outlier_beyond_two_sigma(&trust_scores) {
            0.3
        } else {
            0.0
        };

        (diversity - variance_penalty).clamp(0.0, 1.0)
    }
}

/// Whether the minimum trust score sits more than two sample standard
/// deviations away from the mean
fn outlier_beyond_two_sigma(scores: &[f64]) -> bool {
    if scores.len() < 2 {
        return false;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();
    if std <= 0.0 {
        return false;
    }
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    (min - mean).abs() / std > 2.0
}
