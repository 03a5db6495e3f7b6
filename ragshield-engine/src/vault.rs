//! Quarantine vault
//!
//! Durable per-document quarantine records with an explicit state machine
//! and an append-only audit trail. The vault is the sole mutator of the
//! retrieval adapter's `is_quarantined` / `quarantine_id` metadata, keeping
//! the flag and the presence of an active record in agreement.
//!
//! Directory layout, one directory per record:
//!
//! ```text
//! vault/
//!     Q-{timestamp}-{doc_id}/
//!         content.txt
//!         metadata.json
//!         record.json
//!         audit.jsonl
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::retrieval::RetrievalAdapter;
use chrono::Utc;
use ragshield_common::events::{EventCode, EventLevel};
use ragshield_common::schemas::{
    AuditEntry, DocumentMetadata, IntegritySignals, QuarantineRecord, QuarantineState,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

const RECORD_FILE: &str = "record.json";
const CONTENT_FILE: &str = "content.txt";
const METADATA_FILE: &str = "metadata.json";
const AUDIT_FILE: &str = "audit.jsonl";

pub struct QuarantineVault {
    vault_dir: PathBuf,
    adapter: Arc<RetrievalAdapter>,
    bus: EventBus,
    /// doc_id -> quarantine_id of the single active (non-RESTORED) record
    active: Mutex<HashMap<String, String>>,
    /// Per-document locks: same doc serialized, distinct docs in parallel
    doc_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QuarantineVault {
    /// Open the vault, rebuilding the active-record map from disk
    pub fn new(vault_dir: impl Into<PathBuf>, adapter: Arc<RetrievalAdapter>, bus: EventBus) -> Result<Self> {
        let vault_dir = vault_dir.into();
        std::fs::create_dir_all(&vault_dir)?;

        let mut active = HashMap::new();
        for record in scan_records_sync(&vault_dir)? {
            if record.state.is_active() {
                if let Some(previous) = active.insert(record.doc_id.clone(), record.quarantine_id.clone()) {
                    warn!(
                        doc_id = %record.doc_id,
                        kept = %record.quarantine_id,
                        superseded = %previous,
                        "multiple active quarantine records found on disk"
                    );
                }
            }
        }
        info!(path = %vault_dir.display(), active = active.len(), "quarantine vault opened");

        Ok(Self {
            vault_dir,
            adapter,
            bus,
            active: Mutex::new(active),
            doc_locks: Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, doc_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.doc_locks.lock().await;
        locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn record_dir(&self, quarantine_id: &str) -> PathBuf {
        self.vault_dir.join(quarantine_id)
    }

    /// Quarantine a document.
    ///
    /// Precondition: no active record exists for `doc_id`. Persists the
    /// record, then flips the adapter's quarantine flag; if the flip fails
    /// the record is removed again and a CRITICAL event is emitted, leaving
    /// the document retrievable.
    pub async fn quarantine(
        &self,
        doc_id: &str,
        content_snapshot: &str,
        metadata: &DocumentMetadata,
        signals: IntegritySignals,
        reason: &str,
        correlation_id: Option<&str>,
    ) -> Result<QuarantineRecord> {
        let doc_lock = self.lock_for(doc_id).await;
        let _guard = doc_lock.lock().await;

        {
            let active = self.active.lock().await;
            if let Some(existing) = active.get(doc_id) {
                return Err(Error::InvalidState(format!(
                    "document {doc_id} already has an active quarantine record {existing}"
                )));
            }
        }

        let quarantined_at = Utc::now();
        let quarantine_id = self.fresh_quarantine_id(doc_id, quarantined_at).await;

        let mut record = QuarantineRecord {
            quarantine_id: quarantine_id.clone(),
            doc_id: doc_id.to_string(),
            state: QuarantineState::Quarantined,
            quarantined_at,
            reason: reason.to_string(),
            signals,
            content_snapshot: content_snapshot.to_string(),
            original_metadata: metadata.clone(),
            state_history: Vec::new(),
        };
        let initial_entry = AuditEntry {
            timestamp: quarantined_at,
            action: QuarantineState::Quarantined.as_str().to_string(),
            actor: "system".to_string(),
            notes: reason.to_string(),
            previous_state: None,
        };
        record.state_history.push(initial_entry.clone());

        let dir = self.record_dir(&quarantine_id);
        self.write_record_dir(&dir, &record).await?;
        append_audit(&dir, &initial_entry).await?;

        // Flip the retrieval flag; the record only becomes real if this
        // sticks
        if let Err(e) = self.adapter.mark_quarantined(doc_id, &quarantine_id).await {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            self.bus.emit(
                EventCode::DocumentQuarantined,
                EventLevel::Critical,
                format!("quarantine aborted for {doc_id}: metadata update failed: {e}"),
                correlation_id,
                json!({ "doc_id": doc_id, "quarantine_id": quarantine_id }),
            );
            return Err(Error::Vault(format!(
                "metadata update failed for {doc_id}: {e}"
            )));
        }

        self.active
            .lock()
            .await
            .insert(doc_id.to_string(), quarantine_id.clone());

        self.bus.emit(
            EventCode::DocumentQuarantined,
            EventLevel::Warn,
            format!("Document quarantined: {doc_id}"),
            correlation_id,
            json!({
                "quarantine_id": quarantine_id,
                "doc_id": doc_id,
                "reason": reason,
                "signals": signals,
            }),
        );
        info!(doc_id, quarantine_id = %quarantine_id, "document quarantined");

        Ok(record)
    }

    /// Analyst confirms the document is malicious. Valid only from
    /// QUARANTINED; the document stays excluded from retrieval.
    pub async fn confirm(&self, quarantine_id: &str, actor: &str, notes: &str) -> Result<QuarantineRecord> {
        let record = self
            .get(quarantine_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("quarantine record not found: {quarantine_id}")))?;

        let doc_lock = self.lock_for(&record.doc_id).await;
        let _guard = doc_lock.lock().await;

        // Reload under the lock; the record may have transitioned meanwhile
        let mut record = self
            .get(quarantine_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("quarantine record not found: {quarantine_id}")))?;

        if record.state != QuarantineState::Quarantined {
            return Err(Error::InvalidState(format!(
                "cannot confirm record {quarantine_id} in state {}",
                record.state.as_str()
            )));
        }

        let entry = AuditEntry {
            timestamp: Utc::now(),
            action: QuarantineState::ConfirmedMalicious.as_str().to_string(),
            actor: actor.to_string(),
            notes: notes.to_string(),
            previous_state: Some(record.state),
        };
        record.state = QuarantineState::ConfirmedMalicious;
        record.state_history.push(entry.clone());

        let dir = self.record_dir(quarantine_id);
        write_record_file(&dir, &record).await?;
        append_audit(&dir, &entry).await?;

        self.bus.emit(
            EventCode::QuarantineConfirmed,
            EventLevel::Info,
            format!("Document confirmed malicious: {}", record.doc_id),
            None,
            json!({
                "quarantine_id": quarantine_id,
                "doc_id": record.doc_id,
                "analyst": actor,
                "notes": notes,
            }),
        );
        Ok(record)
    }

    /// Analyst restores a false positive. Valid only from QUARANTINED; the
    /// document re-enters the retrievable pool and is re-scored from scratch
    /// on future queries.
    pub async fn restore(&self, quarantine_id: &str, actor: &str, notes: &str) -> Result<QuarantineRecord> {
        let record = self
            .get(quarantine_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("quarantine record not found: {quarantine_id}")))?;

        let doc_lock = self.lock_for(&record.doc_id).await;
        let _guard = doc_lock.lock().await;

        let mut record = self
            .get(quarantine_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("quarantine record not found: {quarantine_id}")))?;

        if record.state != QuarantineState::Quarantined {
            return Err(Error::InvalidState(format!(
                "cannot restore record {quarantine_id} in state {}",
                record.state.as_str()
            )));
        }

        let entry = AuditEntry {
            timestamp: Utc::now(),
            action: QuarantineState::Restored.as_str().to_string(),
            actor: actor.to_string(),
            notes: notes.to_string(),
            previous_state: Some(record.state),
        };
        record.state = QuarantineState::Restored;
        record.state_history.push(entry.clone());

        let dir = self.record_dir(quarantine_id);
        write_record_file(&dir, &record).await?;
        append_audit(&dir, &entry).await?;
        self.active.lock().await.remove(&record.doc_id);

        // Record first, flag second: if the flip fails the document stays
        // excluded, which is the safe direction
        if let Err(e) = self.adapter.restore(&record.doc_id).await {
            self.bus.emit(
                EventCode::QuarantineRestored,
                EventLevel::Critical,
                format!(
                    "restore of {} recorded but metadata update failed: {e}",
                    record.doc_id
                ),
                None,
                json!({ "quarantine_id": quarantine_id, "doc_id": record.doc_id }),
            );
            return Err(Error::Vault(format!(
                "metadata update failed for {}: {e}",
                record.doc_id
            )));
        }

        self.bus.emit(
            EventCode::QuarantineRestored,
            EventLevel::Info,
            format!("Document restored: {}", record.doc_id),
            None,
            json!({
                "quarantine_id": quarantine_id,
                "doc_id": record.doc_id,
                "analyst": actor,
                "notes": notes,
            }),
        );
        Ok(record)
    }

    /// All records, optionally filtered by state, newest first
    pub async fn list(&self, state: Option<QuarantineState>) -> Result<Vec<QuarantineRecord>> {
        let mut records = scan_records_sync(&self.vault_dir)?;
        if let Some(wanted) = state {
            records.retain(|r| r.state == wanted);
        }
        records.sort_by(|a, b| b.quarantined_at.cmp(&a.quarantined_at));
        Ok(records)
    }

    pub async fn get(&self, quarantine_id: &str) -> Result<Option<QuarantineRecord>> {
        let record_path = self.record_dir(quarantine_id).join(RECORD_FILE);
        let contents = match tokio::fs::read_to_string(&record_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Active quarantine id for a document, if any
    pub async fn active_record_for(&self, doc_id: &str) -> Option<String> {
        self.active.lock().await.get(doc_id).cloned()
    }

    /// Total number of records, in any state
    pub async fn count(&self) -> Result<u64> {
        let mut n = 0;
        let mut dir = tokio::fs::read_dir(&self.vault_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir()
                && entry.file_name().to_string_lossy().starts_with("Q-")
            {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Delete every record (demo reset)
    pub async fn reset(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.vault_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.vault_dir).await?;
        self.active.lock().await.clear();
        Ok(())
    }

    /// Record ids collide only when the same document is re-quarantined
    /// within one second of a restore; disambiguate with a numeric suffix
    async fn fresh_quarantine_id(&self, doc_id: &str, at: chrono::DateTime<Utc>) -> String {
        let base = format!("Q-{}-{}", at.format("%Y%m%d%H%M%S"), doc_id);
        let mut candidate = base.clone();
        let mut n = 2;
        while tokio::fs::try_exists(self.record_dir(&candidate))
            .await
            .unwrap_or(false)
        {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        candidate
    }

    async fn write_record_dir(&self, dir: &Path, record: &QuarantineRecord) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(CONTENT_FILE), &record.content_snapshot).await?;
        tokio::fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&record.original_metadata)?,
        )
        .await?;
        write_record_file(dir, record).await
    }
}

async fn write_record_file(dir: &Path, record: &QuarantineRecord) -> Result<()> {
    tokio::fs::write(dir.join(RECORD_FILE), serde_json::to_string_pretty(record)?).await?;
    Ok(())
}

async fn append_audit(dir: &Path, entry: &AuditEntry) -> Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(AUDIT_FILE))
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Parse every record under the vault directory, skipping corrupt entries
fn scan_records_sync(vault_dir: &Path) -> Result<Vec<QuarantineRecord>> {
    let mut records = Vec::new();
    let entries = match std::fs::read_dir(vault_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with("Q-") || !entry.path().is_dir() {
            continue;
        }
        let record_path = entry.path().join(RECORD_FILE);
        let Ok(contents) = std::fs::read_to_string(&record_path) else {
            continue;
        };
        match serde_json::from_str::<QuarantineRecord>(&contents) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(path = %record_path.display(), error = %e, "skipping corrupt quarantine record");
            }
        }
    }
    Ok(records)
}
