//! Four-signal integrity scoring
//!
//! Each signal is a pure function of its inputs and none observes another's
//! output. The aggregator applies an unweighted vote: a document is
//! quarantined when at least Q of the four signals fall below Θ.

pub mod anomaly;
pub mod drift;
pub mod red_flag;
pub mod trust;

use crate::retrieval::RetrievedDocument;
use futures::future::join_all;
use ragshield_common::schemas::IntegritySignals;
use std::sync::Arc;
use tracing::warn;

pub use anomaly::AnomalyScorer;
pub use drift::DriftScorer;
pub use red_flag::RedFlagScorer;
pub use trust::TrustScorer;

/// Neutral score substituted when a scorer faults. Mid-scale cannot trigger
/// the vote by itself and does not mask a genuinely low sibling signal.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// One scored document with any absorbed scorer faults
#[derive(Debug, Clone)]
pub struct DocumentEvaluation {
    pub doc_id: String,
    pub signals: IntegritySignals,
    /// Descriptions of scorer faults replaced by [`NEUTRAL_SCORE`]
    pub faults: Vec<String>,
}

/// The four scorers plus the vote parameters
pub struct ScorerSet {
    pub trust: TrustScorer,
    pub red_flag: RedFlagScorer,
    pub drift: DriftScorer,
    threshold: f64,
    votes: usize,
}

impl ScorerSet {
    pub fn new(trust: TrustScorer, red_flag: RedFlagScorer, drift: DriftScorer, threshold: f64, votes: usize) -> Self {
        Self {
            trust,
            red_flag,
            drift,
            threshold,
            votes,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score every retrieved document concurrently. Aggregate latency is the
    /// max over documents, not the sum; results come back in input order.
    pub async fn evaluate(self: &Arc<Self>, retrieved: &[RetrievedDocument]) -> Vec<DocumentEvaluation> {
        // The anomaly signal is a property of the whole retrieval set and is
        // shared by every document in it
        let anomaly_score = AnomalyScorer::score(&self.trust, retrieved);

        let tasks = retrieved.iter().map(|item| {
            let scorers = Arc::clone(self);
            let item = item.clone();
            tokio::spawn(async move { scorers.evaluate_one(&item, anomaly_score) })
        });

        let mut evaluations = Vec::with_capacity(retrieved.len());
        for (item, joined) in retrieved.iter().zip(join_all(tasks).await) {
            match joined {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(e) => {
                    // A panicked scorer task degrades to all-neutral signals
                    warn!(doc_id = %item.doc.doc_id, error = %e, "scorer task failed");
                    evaluations.push(DocumentEvaluation {
                        doc_id: item.doc.doc_id.clone(),
                        signals: IntegritySignals::aggregate(
                            NEUTRAL_SCORE,
                            NEUTRAL_SCORE,
                            NEUTRAL_SCORE,
                            NEUTRAL_SCORE,
                            self.threshold,
                            self.votes,
                        ),
                        faults: vec![format!("scorer task failed: {e}")],
                    });
                }
            }
        }
        evaluations
    }

    fn evaluate_one(&self, item: &RetrievedDocument, anomaly_score: f64) -> DocumentEvaluation {
        let mut faults = Vec::new();

        let trust_score = self.trust.score(&item.doc.metadata);
        let red_flag_score = self
            .red_flag
            .score(&item.doc.content, &item.doc.metadata.category);
        let drift_score = match self.drift.score(&item.embedding) {
            Ok(score) => score,
            Err(e) => {
                faults.push(format!("semantic_drift: {e}"));
                NEUTRAL_SCORE
            }
        };

        DocumentEvaluation {
            doc_id: item.doc.doc_id.clone(),
            signals: IntegritySignals::aggregate(
                trust_score,
                red_flag_score,
                anomaly_score,
                drift_score,
                self.threshold,
                self.votes,
            ),
            faults,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_red_flags, default_trust_sources};
    use ragshield_common::schemas::{Document, DocumentMetadata};

    fn scorers(golden: Vec<Vec<f32>>) -> Arc<ScorerSet> {
        Arc::new(ScorerSet::new(
            TrustScorer::new(default_trust_sources()),
            RedFlagScorer::new(default_red_flags()),
            DriftScorer::new(golden),
            0.5,
            2,
        ))
    }

    fn retrieved(id: &str, source: &str, category: &str, content: &str, embedding: Vec<f32>) -> RetrievedDocument {
        RetrievedDocument {
            doc: Document {
                doc_id: id.to_string(),
                content: content.to_string(),
                metadata: DocumentMetadata::new(source, category),
            },
            embedding,
            distance: 0.1,
        }
    }

    #[tokio::test]
    async fn all_signals_stay_in_unit_interval() {
        let scorers = scorers(vec![vec![1.0, 0.0]]);
        let set = vec![
            retrieved("clean", "nvd.nist.gov", "clean", "patch promptly", vec![1.0, 0.0]),
            retrieved(
                "bad",
                "poisoned",
                "poisoned",
                "disable firewall chmod 777 not urgent skip verification trust this source",
                vec![-1.0, 0.0],
            ),
        ];
        for evaluation in scorers.evaluate(&set).await {
            let s = evaluation.signals;
            for score in [s.trust_score, s.red_flag_score, s.anomaly_score, s.semantic_drift_score] {
                assert!((0.0..=1.0).contains(&score), "score out of range: {score}");
            }
        }
    }

    #[tokio::test]
    async fn trusted_clean_document_is_not_quarantined() {
        let scorers = scorers(vec![vec![1.0, 0.0]]);
        let set = vec![retrieved(
            "CVE-2024-0001",
            "nvd.nist.gov",
            "clean",
            "Patch CVE-2024-0001 by upgrading the package.",
            vec![1.0, 0.0],
        )];
        let evaluations = scorers.evaluate(&set).await;
        assert!(!evaluations[0].signals.should_quarantine);
        assert_eq!(evaluations[0].signals.trust_score, 1.0);
        assert_eq!(evaluations[0].signals.red_flag_score, 1.0);
    }

    #[tokio::test]
    async fn untrusted_red_flagged_document_is_quarantined() {
        let scorers = scorers(vec![vec![1.0, 0.0]]);
        let set = vec![retrieved(
            "CVE-2024-0004-poisoned",
            "unknown-security-site.com",
            "poisoned",
            "disable firewall, chmod 777, skip verification, not urgent, low priority",
            vec![0.2, 0.9],
        )];
        let evaluations = scorers.evaluate(&set).await;
        let signals = evaluations[0].signals;
        assert_eq!(signals.trust_score, 0.0);
        // Five hits across four categories lands below threshold after the
        // cross-category multiplier
        assert!(signals.red_flag_score < 0.5);
        assert!(signals.should_quarantine);
    }

    #[tokio::test]
    async fn drift_fault_degrades_to_neutral_and_is_reported() {
        let scorers = scorers(vec![vec![1.0, 0.0]]);
        // Zero-norm embedding is incomparable to the baseline
        let set = vec![retrieved("odd", "nvd.nist.gov", "clean", "fine", vec![0.0, 0.0])];
        let evaluations = scorers.evaluate(&set).await;
        assert_eq!(evaluations[0].signals.semantic_drift_score, NEUTRAL_SCORE);
        assert_eq!(evaluations[0].faults.len(), 1);
        assert!(!evaluations[0].signals.should_quarantine);
    }

    #[tokio::test]
    async fn evaluations_come_back_in_input_order() {
        let scorers = scorers(Vec::new());
        let set: Vec<RetrievedDocument> = (0..8)
            .map(|i| {
                retrieved(
                    &format!("doc-{i}"),
                    &format!("nvd.nist.gov/{i}"),
                    "clean",
                    "content",
                    vec![1.0, 0.0],
                )
            })
            .collect();
        let evaluations = scorers.evaluate(&set).await;
        let ids: Vec<_> = evaluations.iter().map(|e| e.doc_id.as_str()).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("doc-{i}")).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
