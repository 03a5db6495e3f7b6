//! Query-lineage store
//!
//! Append-only record of every query that reached retrieval, written after
//! the integrity decision is known. Lineage is kept apart from the event log
//! because its query pattern differs: scans are by doc_id over a time
//! window, not by event code.

use crate::error::Result;
use chrono::{DateTime, Utc};
use ragshield_common::schemas::LineageRecord;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct LineageStore {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl LineageStore {
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Append one record; durable (written and flushed) before returning
    pub async fn append(&self, record: &LineageRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Records within `[since, until]`, optionally restricted to those whose
    /// retrieval included `doc_id`. Malformed lines are skipped.
    pub async fn scan(
        &self,
        doc_id: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<LineageRecord>> {
        let contents = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(record) = serde_json::from_str::<LineageRecord>(line) else {
                continue;
            };
            if record.timestamp < since || record.timestamp > until {
                continue;
            }
            if let Some(doc_id) = doc_id {
                if !record.retrieved_doc_ids.iter().any(|d| d == doc_id) {
                    continue;
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    pub async fn count(&self) -> Result<usize> {
        let contents = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        Ok(contents.lines().filter(|l| !l.trim().is_empty()).count())
    }

    /// Truncate the log (demo reset)
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&self.log_path, b"").await?;
        Ok(())
    }
}
