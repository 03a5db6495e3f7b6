//! Semantic-drift signal: similarity to the golden corpus
//!
//! Compares a document's embedding to a baseline of golden documents
//! embedded once at startup. A document that diverges from everything in
//! the trusted baseline drifts toward zero.

use crate::adapters::{cosine_similarity, Index};
use crate::error::{Error, Result};

/// Documents in this metadata category form the drift baseline
const GOLDEN_CATEGORY: &str = "golden";

pub struct DriftScorer {
    golden: Vec<Vec<f32>>,
}

impl DriftScorer {
    pub fn new(golden: Vec<Vec<f32>>) -> Self {
        Self { golden }
    }

    /// Load the golden baseline from the index. Embeddings were computed at
    /// ingestion by the same collaborator retrieval uses.
    pub async fn load(index: &dyn Index) -> Result<Self> {
        let golden = index
            .all()
            .await?
            .into_iter()
            .filter(|d| d.doc.metadata.category == GOLDEN_CATEGORY)
            .map(|d| d.embedding)
            .collect();
        Ok(Self { golden })
    }

    pub fn baseline_size(&self) -> usize {
        self.golden.len()
    }

    /// Max cosine similarity against the baseline, mapped from [-1, 1] to
    /// [0, 1]. An empty baseline is neutral (0.5).
    pub fn score(&self, embedding: &[f32]) -> Result<f64> {
        if self.golden.is_empty() {
            return Ok(0.5);
        }

        let mut best: Option<f64> = None;
        for golden in &self.golden {
            if let Some(similarity) = cosine_similarity(embedding, golden) {
                best = Some(best.map_or(similarity, |b: f64| b.max(similarity)));
            }
        }

        match best {
            Some(similarity) => Ok(((similarity + 1.0) / 2.0).clamp(0.0, 1.0)),
            // Baseline exists but nothing was comparable: a degenerate or
            // mis-dimensioned embedding is a scorer fault, not a verdict
            None => Err(Error::Scorer(
                "document embedding incomparable to golden baseline".to_string(),
            )),
        }
    }
}
