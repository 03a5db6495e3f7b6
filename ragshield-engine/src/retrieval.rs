//! Retrieval adapter
//!
//! Thin quarantine-aware wrapper over the pluggable embedder and vector
//! index. Owns the `is_quarantined` / `quarantine_id` metadata fields on
//! behalf of the vault; nothing else mutates them.

use crate::adapters::{Embedder, Index, IndexedDocument, MetadataFilter};
use crate::error::{Error, Result};
use crate::extract;
use ragshield_common::schemas::{Document, DocumentMetadata};
use std::sync::Arc;
use tracing::debug;

/// One retrieval hit handed to the scorers
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub doc: Document,
    pub embedding: Vec<f32>,
    pub distance: f64,
}

pub struct RetrievalAdapter {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn Index>,
    over_fetch_factor: usize,
}

impl RetrievalAdapter {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn Index>, over_fetch_factor: usize) -> Self {
        Self {
            embedder,
            index,
            over_fetch_factor: over_fetch_factor.max(1),
        }
    }

    /// Ingest a document. Identifiers are extracted from the content and the
    /// first one lands in the filterable metadata field (scalar constraint).
    pub async fn ingest(&self, doc_id: &str, content: &str, metadata: DocumentMetadata) -> Result<()> {
        let mut metadata = metadata;
        metadata.identifiers = extract::extract_identifiers(content)
            .into_iter()
            .take(1)
            .collect();

        let embedding = self.embedder.embed(content).await?;
        let doc = Document {
            doc_id: doc_id.to_string(),
            content: content.to_string(),
            metadata,
        };
        self.index.upsert(&doc, &embedding).await?;
        debug!(doc_id, "ingested document");
        Ok(())
    }

    /// Retrieve up to `k` documents nearest to `text`, in ascending distance
    /// order. Quarantined candidates are dropped when `exclude_quarantined`
    /// is set; the index over-fetches to compensate.
    pub async fn retrieve(
        &self,
        text: &str,
        k: usize,
        exclude_quarantined: bool,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedDocument>> {
        let embedding = self.embedder.embed(text).await.map_err(into_retrieval)?;

        let n = if exclude_quarantined {
            k.saturating_mul(self.over_fetch_factor)
        } else {
            k
        };

        let hits = self
            .index
            .query(&embedding, n, filter)
            .await
            .map_err(into_retrieval)?;

        let retrieved: Vec<RetrievedDocument> = hits
            .into_iter()
            .filter(|hit| !(exclude_quarantined && hit.doc.metadata.is_quarantined))
            .take(k)
            .map(|hit| RetrievedDocument {
                doc: hit.doc,
                embedding: hit.embedding,
                distance: hit.distance,
            })
            .collect();

        debug!(count = retrieved.len(), k, "retrieval completed");
        Ok(retrieved)
    }

    /// Flag a document as quarantined. Called by the vault only, under its
    /// per-document lock.
    pub async fn mark_quarantined(&self, doc_id: &str, quarantine_id: &str) -> Result<()> {
        let doc = self
            .index
            .get(doc_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document not indexed: {doc_id}")))?;

        let mut metadata = doc.metadata;
        metadata.is_quarantined = true;
        metadata.quarantine_id = quarantine_id.to_string();
        self.index.update_metadata(doc_id, &metadata).await
    }

    /// Clear a document's quarantine flag, returning it to the retrievable
    /// pool. Called by the vault only.
    pub async fn restore(&self, doc_id: &str) -> Result<()> {
        let doc = self
            .index
            .get(doc_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document not indexed: {doc_id}")))?;

        let mut metadata = doc.metadata;
        metadata.is_quarantined = false;
        metadata.quarantine_id = String::new();
        self.index.update_metadata(doc_id, &metadata).await
    }

    pub async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        self.index.get(doc_id).await
    }

    pub async fn all_documents(&self) -> Result<Vec<IndexedDocument>> {
        self.index.all().await
    }

    pub async fn document_count(&self) -> Result<u64> {
        self.index.count().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.index.clear().await
    }
}

/// Collaborator failures during retrieval surface as `RETRIEVAL_ERROR`
fn into_retrieval(err: Error) -> Error {
    match err {
        Error::Retrieval(_) => err,
        other => Error::Retrieval(other.to_string()),
    }
}
