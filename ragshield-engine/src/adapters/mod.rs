//! Pluggable collaborator interfaces
//!
//! The embedding function, the vector index, and the generation model are
//! replaceable. Each is a narrow capability trait with a well-defined error
//! set; the engine never depends on a concrete provider.

pub mod index;
pub mod ollama;

use crate::error::Result;
use async_trait::async_trait;
use ragshield_common::schemas::{Document, DocumentMetadata};

pub use index::SqliteIndex;
pub use ollama::OllamaClient;

/// Equality constraint on the scalar `identifiers` metadata field.
///
/// Equality is the only operator the index contract supports; richer filter
/// shapes are deliberately out of scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub identifier: String,
}

impl MetadataFilter {
    pub fn identifier_equals(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
        }
    }
}

/// A document with its stored embedding
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub doc: Document,
    pub embedding: Vec<f32>,
}

/// One nearest-neighbor hit
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub doc: Document,
    pub embedding: Vec<f32>,
    /// Cosine distance; smaller is closer
    pub distance: f64,
}

/// Text-to-vector embedding collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Answer-generation collaborator
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate an answer from the query and the surviving context documents
    async fn generate(&self, query: &str, docs: &[Document]) -> Result<String>;

    /// Liveness probe, consulted once at startup
    async fn healthy(&self) -> bool;
}

/// Vector index collaborator.
///
/// Metadata values are scalars only; the engine is the sole writer of the
/// `is_quarantined` / `quarantine_id` fields (through `update_metadata`).
#[async_trait]
pub trait Index: Send + Sync {
    /// Insert or replace a document with its embedding
    async fn upsert(&self, doc: &Document, embedding: &[f32]) -> Result<()>;

    /// Nearest `n` documents by ascending distance, optionally constrained
    /// by a metadata equality filter
    async fn query(
        &self,
        embedding: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>>;

    /// Fetch one document by id
    async fn get(&self, doc_id: &str) -> Result<Option<Document>>;

    /// Replace a document's metadata
    async fn update_metadata(&self, doc_id: &str, metadata: &DocumentMetadata) -> Result<()>;

    /// Every stored document with its embedding (corpus-wide baselines,
    /// status reporting)
    async fn all(&self) -> Result<Vec<IndexedDocument>>;

    async fn count(&self) -> Result<u64>;

    /// Remove every document (demo reset)
    async fn clear(&self) -> Result<()>;
}

/// Cosine distance between two vectors: `1 - cos(a, b)`.
///
/// Degenerate inputs (zero norm) yield the maximum-uncertainty distance 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    match cosine_similarity(a, b) {
        Some(similarity) => 1.0 - similarity,
        None => 1.0,
    }
}

/// Cosine similarity in `[-1, 1]`, or `None` for zero-norm or
/// dimension-mismatched vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_zero_distance() {
        let v = [0.5f32, 0.25, -0.75];
        assert!(cosine_distance(&v, &v).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_have_unit_distance() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn opposite_vectors_have_distance_two() {
        let a = [1.0f32, 0.0];
        let b = [-1.0f32, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_vectors_yield_none_similarity() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
    }
}
