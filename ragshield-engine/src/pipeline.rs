//! Integrity pipeline
//!
//! Orchestrates one protected query end to end: preprocess, retrieve, score
//! in parallel, quarantine failures, generate from the survivors, and record
//! lineage. Events for a query are emitted in causal order: RAG-1001, then
//! any RAG-2001, then RAG-4002.

use crate::adapters::Generator;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::lineage::LineageStore;
use crate::query;
use crate::retrieval::{RetrievalAdapter, RetrievedDocument};
use crate::scoring::ScorerSet;
use crate::vault::QuarantineVault;
use chrono::Utc;
use ragshield_common::events::{EventCode, EventLevel};
use ragshield_common::schemas::{Document, IntegritySignals, LineageAction, LineageRecord};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Fixed answer when an exact-identifier lookup finds nothing retrievable
pub const IDENTIFIER_UNAVAILABLE_ANSWER: &str =
    "The document for the requested identifier is unavailable: it is either \
     quarantined pending security review or not present in the corpus.";

/// Fixed answer when every retrieved document failed integrity checks
pub const ALL_QUARANTINED_ANSWER: &str =
    "This query cannot be answered safely at this moment. The retrieved \
     documents have been flagged for security review. Please contact your \
     security team.";

/// Fixed answer for an empty corpus
pub const NO_DOCUMENTS_ANSWER: &str = "No documents available to answer this query.";

/// Pipeline tuning knobs carried over from the engine configuration
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub boost_factor: usize,
    pub query_deadline: Duration,
}

/// Result of one protected (or unsafe) query
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query_id: String,
    pub answer: String,
    pub signals_by_doc: BTreeMap<String, IntegritySignals>,
    pub retrieved_doc_ids: Vec<String>,
    pub quarantined_doc_ids: Vec<String>,
}

pub struct IntegrityPipeline {
    adapter: Arc<RetrievalAdapter>,
    vault: Arc<QuarantineVault>,
    scorers: Arc<ScorerSet>,
    generator: Arc<dyn Generator>,
    lineage: Arc<LineageStore>,
    bus: EventBus,
    options: PipelineOptions,
}

impl IntegrityPipeline {
    pub fn new(
        adapter: Arc<RetrievalAdapter>,
        vault: Arc<QuarantineVault>,
        scorers: Arc<ScorerSet>,
        generator: Arc<dyn Generator>,
        lineage: Arc<LineageStore>,
        bus: EventBus,
        options: PipelineOptions,
    ) -> Self {
        Self {
            adapter,
            vault,
            scorers,
            generator,
            lineage,
            bus,
            options,
        }
    }

    /// Execute a protected query
    pub async fn query(&self, text: &str, user_id: &str, k: usize) -> Result<QueryOutcome> {
        let query_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.options.query_deadline;

        let processed = query::process(text, self.options.boost_factor);
        self.bus.emit(
            EventCode::QueryReceived,
            EventLevel::Info,
            format!("Query received from {user_id}"),
            Some(&query_id),
            json!({
                "user_id": user_id,
                "query": excerpt(text),
                "kind": processed.kind.as_str(),
            }),
        );

        let retrieved = self
            .adapter
            .retrieve(&processed.augmented_text, k, true, processed.filter.as_ref())
            .await?;

        // Exact-identifier lookup with nothing retrievable: answer with the
        // fixed unavailability message instead of falling back to unrelated
        // material, preserving the integrity contract
        if processed.filter.is_some() && retrieved.is_empty() {
            let identifier = processed.filter.as_ref().map(|f| f.identifier.clone());
            self.bus.emit(
                EventCode::RetrievalFallback,
                EventLevel::Warn,
                format!(
                    "Exact-identifier retrieval returned no documents for {}",
                    identifier.as_deref().unwrap_or("?")
                ),
                Some(&query_id),
                json!({ "identifier": identifier }),
            );
            self.append_lineage(&query_id, text, user_id, &[], &[], LineageAction::Blocked)
                .await;
            return Ok(QueryOutcome {
                query_id,
                answer: IDENTIFIER_UNAVAILABLE_ANSWER.to_string(),
                signals_by_doc: BTreeMap::new(),
                retrieved_doc_ids: Vec::new(),
                quarantined_doc_ids: Vec::new(),
            });
        }

        // Empty corpus, no filter in play: nothing to score or generate from
        if retrieved.is_empty() {
            self.append_lineage(&query_id, text, user_id, &[], &[], LineageAction::Clean)
                .await;
            return Ok(QueryOutcome {
                query_id,
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                signals_by_doc: BTreeMap::new(),
                retrieved_doc_ids: Vec::new(),
                quarantined_doc_ids: Vec::new(),
            });
        }

        let retrieved_doc_ids: Vec<String> =
            retrieved.iter().map(|r| r.doc.doc_id.clone()).collect();
        self.bus.emit(
            EventCode::RetrievalCompleted,
            EventLevel::Info,
            format!("Retrieved {} documents", retrieved.len()),
            Some(&query_id),
            json!({ "doc_ids": retrieved_doc_ids, "count": retrieved.len() }),
        );

        // Score every document concurrently, bounded by the query deadline
        let remaining = deadline.saturating_duration_since(Instant::now());
        let evaluations = match tokio::time::timeout(remaining, self.scorers.evaluate(&retrieved)).await {
            Ok(evaluations) => evaluations,
            Err(_) => {
                self.emit_deadline_warning(&query_id, "scoring");
                return Err(Error::Timeout("query deadline exceeded during scoring".to_string()));
            }
        };

        let mut signals_by_doc = BTreeMap::new();
        for evaluation in &evaluations {
            for fault in &evaluation.faults {
                self.bus.emit(
                    EventCode::RetrievalFallback,
                    EventLevel::Warn,
                    format!("Scorer degraded to neutral for {}: {fault}", evaluation.doc_id),
                    Some(&query_id),
                    json!({ "doc_id": evaluation.doc_id, "fault": fault }),
                );
            }
            signals_by_doc.insert(evaluation.doc_id.clone(), evaluation.signals);
        }

        // Quarantine the failures; writes for the same document serialize in
        // the vault
        let mut quarantined_doc_ids = Vec::new();
        let mut clean = Vec::new();
        for item in &retrieved {
            let signals = signals_by_doc[&item.doc.doc_id];
            if signals.should_quarantine {
                match self.quarantine_document(item, signals, &query_id).await {
                    Ok(()) => quarantined_doc_ids.push(item.doc.doc_id.clone()),
                    // An active record already covers the document
                    Err(Error::InvalidState(_)) => quarantined_doc_ids.push(item.doc.doc_id.clone()),
                    Err(e) => {
                        // Vault write failed: the document stays retrievable
                        // and flows on as not-quarantined. The vault already
                        // surfaced a CRITICAL event.
                        warn!(doc_id = %item.doc.doc_id, error = %e, "quarantine failed");
                        clean.push(item.clone());
                    }
                }
            } else {
                self.bus.emit(
                    EventCode::IntegrityPassed,
                    EventLevel::Info,
                    format!("Integrity checks passed for {}", item.doc.doc_id),
                    Some(&query_id),
                    json!({ "doc_id": item.doc.doc_id, "signals": signals }),
                );
                clean.push(item.clone());
            }
        }

        let answer = if clean.is_empty() {
            ALL_QUARANTINED_ANSWER.to_string()
        } else {
            let docs: Vec<Document> = clean.iter().map(|r| r.doc.clone()).collect();
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.generator.generate(text, &docs)).await {
                Ok(Ok(answer)) => {
                    self.bus.emit(
                        EventCode::GenerationCompleted,
                        EventLevel::Info,
                        format!("Generated answer from {} documents", docs.len()),
                        Some(&query_id),
                        json!({ "clean_count": docs.len() }),
                    );
                    answer
                }
                Ok(Err(e)) => {
                    // Generation failure yields a user-visible error string;
                    // the query id stays valid and lineage is still written
                    warn!(error = %e, "generation failed");
                    format!("Error generating response: {e}")
                }
                Err(_) => {
                    self.emit_deadline_warning(&query_id, "generation");
                    if !quarantined_doc_ids.is_empty() {
                        self.append_lineage(
                            &query_id,
                            text,
                            user_id,
                            &retrieved_doc_ids,
                            &quarantined_doc_ids,
                            LineageAction::Partial,
                        )
                        .await;
                    }
                    return Err(Error::Timeout(
                        "query deadline exceeded during generation".to_string(),
                    ));
                }
            }
        };

        let action = if quarantined_doc_ids.is_empty() {
            LineageAction::Clean
        } else if clean.is_empty() {
            LineageAction::Blocked
        } else {
            LineageAction::Partial
        };
        self.append_lineage(
            &query_id,
            text,
            user_id,
            &retrieved_doc_ids,
            &quarantined_doc_ids,
            action,
        )
        .await;

        info!(
            query_id = %query_id,
            retrieved = retrieved_doc_ids.len(),
            quarantined = quarantined_doc_ids.len(),
            "query completed"
        );

        Ok(QueryOutcome {
            query_id,
            answer,
            signals_by_doc,
            retrieved_doc_ids,
            quarantined_doc_ids,
        })
    }

    /// Demonstration path: retrieval without quarantine filtering and no
    /// integrity evaluation. Exists to prove the protected path's value;
    /// unreachable unless explicitly enabled in configuration.
    pub async fn query_unsafe(&self, text: &str, user_id: &str, k: usize) -> Result<QueryOutcome> {
        let query_id = format!("unsafe-{}", Uuid::new_v4());

        let processed = query::process(text, self.options.boost_factor);
        self.bus.emit(
            EventCode::QueryReceived,
            EventLevel::Warn,
            format!("Unsafe query received from {user_id} (integrity checks skipped)"),
            Some(&query_id),
            json!({ "user_id": user_id, "query": excerpt(text), "unsafe": true }),
        );

        let retrieved = self
            .adapter
            .retrieve(&processed.augmented_text, k, false, processed.filter.as_ref())
            .await?;

        if retrieved.is_empty() {
            return Ok(QueryOutcome {
                query_id,
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                signals_by_doc: BTreeMap::new(),
                retrieved_doc_ids: Vec::new(),
                quarantined_doc_ids: Vec::new(),
            });
        }

        let retrieved_doc_ids: Vec<String> =
            retrieved.iter().map(|r| r.doc.doc_id.clone()).collect();
        let docs: Vec<Document> = retrieved.iter().map(|r| r.doc.clone()).collect();

        let answer = match tokio::time::timeout(
            self.options.query_deadline,
            self.generator.generate(text, &docs),
        )
        .await
        {
            Ok(Ok(answer)) => {
                self.bus.emit(
                    EventCode::GenerationCompleted,
                    EventLevel::Info,
                    format!("Generated unsafe answer from {} documents", docs.len()),
                    Some(&query_id),
                    json!({ "clean_count": docs.len(), "unsafe": true }),
                );
                answer
            }
            Ok(Err(e)) => format!("Error generating response: {e}"),
            Err(_) => {
                return Err(Error::Timeout(
                    "query deadline exceeded during generation".to_string(),
                ))
            }
        };

        Ok(QueryOutcome {
            query_id,
            answer,
            signals_by_doc: BTreeMap::new(),
            retrieved_doc_ids,
            quarantined_doc_ids: Vec::new(),
        })
    }

    async fn quarantine_document(
        &self,
        item: &RetrievedDocument,
        signals: IntegritySignals,
        query_id: &str,
    ) -> Result<()> {
        let threshold = self.scorers.threshold();
        let (_, red_flag_count) = self.scorers.red_flag.detect(&item.doc.content);
        let reason = format!(
            "Triggered quarantine on query {query_id}. Low signals: {}. Red flags: {red_flag_count} detected.",
            signals.low_signals(threshold).join(", "),
        );

        self.vault
            .quarantine(
                &item.doc.doc_id,
                &item.doc.content,
                &item.doc.metadata,
                signals,
                &reason,
                Some(query_id),
            )
            .await?;
        Ok(())
    }

    /// Lineage is appended only after every quarantine record for the query
    /// is durable; a sink failure here must not fail the query
    async fn append_lineage(
        &self,
        query_id: &str,
        query_text: &str,
        user_id: &str,
        retrieved: &[String],
        quarantined: &[String],
        action: LineageAction,
    ) {
        let record = LineageRecord {
            query_id: query_id.to_string(),
            query_text: query_text.to_string(),
            user_id: user_id.to_string(),
            retrieved_doc_ids: retrieved.to_vec(),
            quarantined_doc_ids: quarantined.to_vec(),
            timestamp: Utc::now(),
            action,
        };
        if let Err(e) = self.lineage.append(&record).await {
            warn!(query_id, error = %e, "lineage append failed");
        }
    }

    fn emit_deadline_warning(&self, query_id: &str, stage: &str) {
        self.bus.emit(
            EventCode::RetrievalFallback,
            EventLevel::Warn,
            format!("Query deadline exceeded during {stage}"),
            Some(query_id),
            json!({ "stage": stage }),
        );
    }
}

/// Queries are logged truncated; full text lives in lineage only
fn excerpt(text: &str) -> String {
    const LIMIT: usize = 100;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}
