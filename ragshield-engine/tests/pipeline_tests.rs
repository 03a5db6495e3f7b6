//! End-to-end pipeline tests over the mock collaborators: clean queries,
//! quarantine decisions, identifier misses, restore/re-score, generation
//! failure, and deadline handling.

mod helpers;

use helpers::{seed_standard_corpus, stage};
use ragshield_common::events::EventCode;
use ragshield_common::schemas::{LineageAction, QuarantineState};
use ragshield_engine::error::Error;
use ragshield_engine::pipeline::{ALL_QUARANTINED_ANSWER, IDENTIFIER_UNAVAILABLE_ANSWER};
use std::time::Duration;
use tempfile::TempDir;

/// Event ids (in emission order) for one query's causal chain
async fn event_codes_for(app: &helpers::TestApp, query_id: &str) -> Vec<EventCode> {
    let mut events = app.bus.recent(1000, None).await.unwrap();
    events.retain(|e| e.correlation_id.as_deref() == Some(query_id));
    events.sort_by_key(|e| e.event_id);
    events.iter().map(|e| e.code).collect()
}

#[tokio::test]
async fn clean_query_from_trusted_source_passes() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;

    let outcome = app
        .pipeline
        .query("How do I patch CVE-2024-0001?", "analyst-1", 5)
        .await
        .unwrap();

    // Exact-identifier retrieval puts the advisory at rank 1
    assert_eq!(outcome.retrieved_doc_ids, vec!["CVE-2024-0001"]);
    assert!(outcome.quarantined_doc_ids.is_empty());
    assert!(outcome.answer.contains("CVE-2024-0001"));

    let signals = outcome.signals_by_doc["CVE-2024-0001"];
    assert_eq!(signals.trust_score, 1.0);
    assert_eq!(signals.red_flag_score, 1.0);
    assert!(signals.anomaly_score >= 0.7);
    assert!(signals.semantic_drift_score >= 0.5);
    assert!(!signals.should_quarantine);

    // Causal event order: received, retrieval completed, ..., generated
    let codes = event_codes_for(&app, &outcome.query_id).await;
    assert_eq!(codes.first(), Some(&EventCode::QueryReceived));
    assert!(codes.contains(&EventCode::RetrievalCompleted));
    assert_eq!(codes.last(), Some(&EventCode::GenerationCompleted));
    let retrieval_pos = codes.iter().position(|c| *c == EventCode::RetrievalCompleted).unwrap();
    assert!(retrieval_pos > 0 && retrieval_pos < codes.len() - 1);

    // Lineage records the clean disposition
    let records = app
        .lineage
        .scan(Some("CVE-2024-0001"), chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, LineageAction::Clean);
    assert_eq!(records[0].user_id, "analyst-1");
}

#[tokio::test]
async fn poisoned_document_is_quarantined_and_query_blocked() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;

    let outcome = app
        .pipeline
        .query("How to mitigate CVE-2024-0004?", "analyst-1", 5)
        .await
        .unwrap();

    assert_eq!(outcome.retrieved_doc_ids, vec!["CVE-2024-0004-poisoned"]);
    assert_eq!(outcome.quarantined_doc_ids, vec!["CVE-2024-0004-poisoned"]);
    assert_eq!(outcome.answer, ALL_QUARANTINED_ANSWER);

    let signals = outcome.signals_by_doc["CVE-2024-0004-poisoned"];
    assert_eq!(signals.trust_score, 0.0);
    assert!(signals.red_flag_score < 0.5);
    assert!(signals.should_quarantine);

    // Vault holds a fresh QUARANTINED record and the flag agrees
    let records = app.vault.list(Some(QuarantineState::Quarantined)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].doc_id, "CVE-2024-0004-poisoned");
    assert!(records[0].reason.contains("trust"));
    let doc = app.adapter.get("CVE-2024-0004-poisoned").await.unwrap().unwrap();
    assert!(doc.metadata.is_quarantined);

    // RAG-1001 precedes RAG-2001 for this query; no generation happened
    let codes = event_codes_for(&app, &outcome.query_id).await;
    let received = codes.iter().position(|c| *c == EventCode::QueryReceived).unwrap();
    let quarantined = codes.iter().position(|c| *c == EventCode::DocumentQuarantined).unwrap();
    assert!(received < quarantined);
    assert!(!codes.contains(&EventCode::GenerationCompleted));

    // Lineage reflects the blocked disposition, and the quarantine record
    // was durable before the lineage append
    let lineage = app
        .lineage
        .scan(Some("CVE-2024-0004-poisoned"), chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].action, LineageAction::Blocked);
    assert_eq!(lineage[0].quarantined_doc_ids, vec!["CVE-2024-0004-poisoned"]);
}

#[tokio::test]
async fn quarantined_document_is_excluded_from_later_retrieval() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;

    app.pipeline
        .query("How to mitigate CVE-2024-0004?", "analyst-1", 5)
        .await
        .unwrap();

    // The same lookup now misses: the only matching document is quarantined
    let outcome = app
        .pipeline
        .query("How to mitigate CVE-2024-0004?", "analyst-2", 5)
        .await
        .unwrap();
    assert!(outcome.retrieved_doc_ids.is_empty());
    assert_eq!(outcome.answer, IDENTIFIER_UNAVAILABLE_ANSWER);
}

#[tokio::test]
async fn identifier_miss_short_circuits_with_blocked_lineage() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;

    let outcome = app
        .pipeline
        .query("What about CVE-2099-9999?", "analyst-1", 5)
        .await
        .unwrap();

    assert_eq!(outcome.answer, IDENTIFIER_UNAVAILABLE_ANSWER);
    assert!(outcome.retrieved_doc_ids.is_empty());
    assert!(outcome.quarantined_doc_ids.is_empty());
    assert!(outcome.signals_by_doc.is_empty());

    let codes = event_codes_for(&app, &outcome.query_id).await;
    assert_eq!(codes, vec![EventCode::QueryReceived, EventCode::RetrievalFallback]);

    let lineage = app
        .lineage
        .scan(None, chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].action, LineageAction::Blocked);
    assert!(lineage[0].retrieved_doc_ids.is_empty());
}

#[tokio::test]
async fn restore_rescans_from_scratch_and_requarantines() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;

    let first = app
        .pipeline
        .query("How to mitigate CVE-2024-0004?", "analyst-1", 5)
        .await
        .unwrap();
    let first_record = app.vault.list(Some(QuarantineState::Quarantined)).await.unwrap();
    let first_id = first_record[0].quarantine_id.clone();

    app.vault.restore(&first_id, "analyst-1", "testing").await.unwrap();

    // Re-query: the document is re-retrieved, re-scored from scratch, and
    // (scores unchanged) re-quarantined under a new id
    let second = app
        .pipeline
        .query("How to mitigate CVE-2024-0004?", "analyst-1", 5)
        .await
        .unwrap();
    assert_eq!(second.quarantined_doc_ids, vec!["CVE-2024-0004-poisoned"]);
    assert_eq!(
        second.signals_by_doc["CVE-2024-0004-poisoned"].trust_score,
        first.signals_by_doc["CVE-2024-0004-poisoned"].trust_score
    );

    let all = app.vault.list(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let active: Vec<_> = all.iter().filter(|r| r.state.is_active()).collect();
    assert_eq!(active.len(), 1, "at most one active record per doc");
    assert_ne!(active[0].quarantine_id, first_id);
}

#[tokio::test]
async fn mixed_retrieval_generates_from_survivors_only() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;

    // No identifier: retrieval is purely semantic and returns everything
    let outcome = app
        .pipeline
        .query("guidance for handling security advisories and patching", "analyst-1", 5)
        .await
        .unwrap();

    assert_eq!(outcome.retrieved_doc_ids.len(), 3);
    assert_eq!(outcome.quarantined_doc_ids, vec!["CVE-2024-0004-poisoned"]);
    // The generator saw only the surviving documents
    assert!(outcome.answer.contains("CVE-2024-0001"));
    assert!(!outcome.answer.contains("CVE-2024-0004-poisoned"));

    let lineage = app
        .lineage
        .scan(Some("CVE-2024-0004-poisoned"), chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(lineage[0].action, LineageAction::Partial);
}

#[tokio::test]
async fn generation_failure_yields_error_answer_but_valid_query() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;
    app.generator.set_fail(true);

    let outcome = app
        .pipeline
        .query("How do I patch CVE-2024-0001?", "analyst-1", 5)
        .await
        .unwrap();

    assert!(outcome.answer.contains("Error generating response"));
    assert!(!outcome.query_id.is_empty());

    // Lineage is still written despite the generation failure
    let lineage = app
        .lineage
        .scan(Some("CVE-2024-0001"), chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].action, LineageAction::Clean);

    // Generation never completed, so RAG-4002 was not emitted
    let codes = event_codes_for(&app, &outcome.query_id).await;
    assert!(!codes.contains(&EventCode::GenerationCompleted));
}

#[tokio::test]
async fn generation_deadline_returns_timeout_with_partial_lineage() {
    let tmp = TempDir::new().unwrap();
    let mut stage = stage(tmp.path()).await;
    stage.config.query_deadline = Duration::from_millis(200);
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;
    app.generator.set_delay(Some(Duration::from_secs(5)));

    // Mixed retrieval: the poisoned doc is quarantined before generation
    // stalls past the deadline
    let result = app
        .pipeline
        .query("guidance for handling security advisories and patching", "analyst-1", 5)
        .await;
    assert!(matches!(result, Err(Error::Timeout(_))));

    // Quarantine writes that happened remain durable
    let records = app.vault.list(Some(QuarantineState::Quarantined)).await.unwrap();
    assert_eq!(records.len(), 1);

    // Best-effort lineage with action=partial
    let lineage = app
        .lineage
        .scan(Some("CVE-2024-0004-poisoned"), chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].action, LineageAction::Partial);
}

#[tokio::test]
async fn empty_corpus_answers_without_lineage_noise() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    let app = stage.finish().await;

    let outcome = app
        .pipeline
        .query("anything at all", "analyst-1", 5)
        .await
        .unwrap();
    assert_eq!(outcome.answer, ragshield_engine::pipeline::NO_DOCUMENTS_ANSWER);
    assert!(outcome.retrieved_doc_ids.is_empty());
}

#[tokio::test]
async fn unsafe_path_returns_poisoned_material_unchecked() {
    let tmp = TempDir::new().unwrap();
    let stage = stage(tmp.path()).await;
    seed_standard_corpus(&stage).await;
    let app = stage.finish().await;

    // Quarantine the poisoned doc through the protected path first
    app.pipeline
        .query("How to mitigate CVE-2024-0004?", "analyst-1", 5)
        .await
        .unwrap();

    // The unsafe path retrieves it anyway and sends it to the generator
    let outcome = app
        .pipeline
        .query_unsafe("How to mitigate CVE-2024-0004?", "analyst-1", 5)
        .await
        .unwrap();
    assert_eq!(outcome.retrieved_doc_ids, vec!["CVE-2024-0004-poisoned"]);
    assert!(outcome.quarantined_doc_ids.is_empty());
    assert!(outcome.signals_by_doc.is_empty());
    assert!(outcome.answer.contains("CVE-2024-0004-poisoned"));
    assert!(outcome.query_id.starts_with("unsafe-"));
}
