//! SQLite-backed vector index
//!
//! Stores documents, scalar metadata, and embeddings in a single SQLite
//! table and answers nearest-neighbor queries with an exact cosine-distance
//! scan. Approximate indexing is a collaborator concern; exactness here
//! keeps retrieval deterministic at corpus scales the engine targets.

use crate::adapters::{cosine_distance, Index, IndexHit, IndexedDocument, MetadataFilter};
use crate::error::{Error, Result};
use async_trait::async_trait;
use ragshield_common::schemas::{Document, DocumentMetadata};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;
use tracing::info;

/// Persistent document index over sqlx/SQLite
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (creating if needed) the index database inside `index_dir`
    pub async fn open(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let db_path = index_dir.join("documents.db");
        let newly_created = !db_path.exists();

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                category TEXT NOT NULL,
                title TEXT,
                identifiers TEXT NOT NULL DEFAULT '',
                is_quarantined INTEGER NOT NULL DEFAULT 0,
                quarantine_id TEXT NOT NULL DEFAULT '',
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        if newly_created {
            info!("Initialized new index database: {}", db_path.display());
        } else {
            info!("Opened existing index database: {}", db_path.display());
        }

        Ok(Self { pool })
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
        let identifiers: String = row.try_get("identifiers")?;
        let metadata = DocumentMetadata {
            source: row.try_get("source")?,
            category: row.try_get("category")?,
            title: row.try_get("title")?,
            identifiers: if identifiers.is_empty() {
                Vec::new()
            } else {
                vec![identifiers]
            },
            is_quarantined: row.try_get::<i64, _>("is_quarantined")? != 0,
            quarantine_id: row.try_get("quarantine_id")?,
        };
        Ok(Document {
            doc_id: row.try_get("doc_id")?,
            content: row.try_get("content")?,
            metadata,
        })
    }

    fn row_to_indexed(row: &sqlx::sqlite::SqliteRow) -> Result<IndexedDocument> {
        let doc = Self::row_to_document(row)?;
        let blob: Vec<u8> = row.try_get("embedding")?;
        Ok(IndexedDocument {
            doc,
            embedding: decode_embedding(&blob)?,
        })
    }
}

/// Embeddings are stored as little-endian f32 sequences
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Internal(format!(
            "corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[async_trait]
impl Index for SqliteIndex {
    async fn upsert(&self, doc: &Document, embedding: &[f32]) -> Result<()> {
        // Scalar metadata only: a multi-valued identifier set collapses to
        // its first element
        let identifier = doc
            .metadata
            .identifiers
            .first()
            .cloned()
            .unwrap_or_default();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO documents
                (doc_id, content, source, category, title, identifiers,
                 is_quarantined, quarantine_id, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&doc.doc_id)
        .bind(&doc.content)
        .bind(&doc.metadata.source)
        .bind(&doc.metadata.category)
        .bind(&doc.metadata.title)
        .bind(identifier)
        .bind(i64::from(doc.metadata.is_quarantined))
        .bind(&doc.metadata.quarantine_id)
        .bind(encode_embedding(embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>> {
        let rows = match filter {
            Some(f) => {
                sqlx::query("SELECT * FROM documents WHERE identifiers = ?1")
                    .bind(&f.identifier)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query("SELECT * FROM documents").fetch_all(&self.pool).await?,
        };

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let indexed = Self::row_to_indexed(row)?;
            let distance = cosine_distance(embedding, &indexed.embedding);
            hits.push(IndexHit {
                doc: indexed.doc,
                embedding: indexed.embedding,
                distance,
            });
        }

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n);
        Ok(hits)
    }

    async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE doc_id = ?1")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn update_metadata(&self, doc_id: &str, metadata: &DocumentMetadata) -> Result<()> {
        let identifier = metadata.identifiers.first().cloned().unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET source = ?2, category = ?3, title = ?4, identifiers = ?5,
                is_quarantined = ?6, quarantine_id = ?7
            WHERE doc_id = ?1
            "#,
        )
        .bind(doc_id)
        .bind(&metadata.source)
        .bind(&metadata.category)
        .bind(&metadata.title)
        .bind(identifier)
        .bind(i64::from(metadata.is_quarantined))
        .bind(&metadata.quarantine_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("document not indexed: {doc_id}")));
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<IndexedDocument>> {
        let rows = sqlx::query("SELECT * FROM documents").fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_indexed).collect()
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM documents").execute(&self.pool).await?;
        Ok(())
    }
}
