//! Blast-radius analysis
//!
//! Answers "who was exposed to this document, and when?" by scanning the
//! query-lineage log over a time window and classifying the impact.

use crate::error::Result;
use crate::events::EventBus;
use crate::lineage::LineageStore;
use chrono::{Duration as ChronoDuration, Utc};
use ragshield_common::events::{EventCode, EventLevel};
use ragshield_common::schemas::{AffectedQuery, BlastRadiusReport, Severity};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub struct BlastRadiusAnalyzer {
    lineage: Arc<LineageStore>,
    bus: EventBus,
}

impl BlastRadiusAnalyzer {
    pub fn new(lineage: Arc<LineageStore>, bus: EventBus) -> Self {
        Self { lineage, bus }
    }

    /// Produce an impact report for `doc_id` over the trailing `window`
    pub async fn analyze(&self, doc_id: &str, window: Duration) -> Result<BlastRadiusReport> {
        self.bus.emit(
            EventCode::BlastRadiusRequested,
            EventLevel::Info,
            format!("Blast radius assessment requested for {doc_id}"),
            None,
            json!({ "doc_id": doc_id, "window_seconds": window.as_secs() }),
        );

        let until = Utc::now();
        let since = until
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::hours(24));

        let records = self.lineage.scan(Some(doc_id), since, until).await?;

        let mut affected_users: BTreeSet<String> = BTreeSet::new();
        let mut query_details = Vec::with_capacity(records.len());
        let mut window_start = until;
        let mut window_end = since;
        for record in &records {
            affected_users.insert(record.user_id.clone());
            window_start = window_start.min(record.timestamp);
            window_end = window_end.max(record.timestamp);
            query_details.push(AffectedQuery {
                query_id: record.query_id.clone(),
                query_text: record.query_text.clone(),
                user_id: record.user_id.clone(),
                timestamp: record.timestamp,
                action: record.action,
            });
        }
        if records.is_empty() {
            window_start = until;
            window_end = until;
        }

        let severity = classify_severity(records.len(), affected_users.len());
        let recommended_actions =
            recommendations(severity, affected_users.len(), doc_id, records.is_empty());

        if severity >= Severity::High {
            self.bus.emit(
                EventCode::BlastRadiusHighImpact,
                EventLevel::Warn,
                format!("High-impact blast radius for {doc_id}: {severity:?}"),
                None,
                json!({
                    "doc_id": doc_id,
                    "severity": severity,
                    "affected_queries": records.len(),
                    "affected_users": affected_users.len(),
                }),
            );
        }

        Ok(BlastRadiusReport {
            doc_id: doc_id.to_string(),
            affected_query_count: records.len(),
            affected_users,
            query_details,
            time_window_start: window_start,
            time_window_end: window_end,
            severity,
            recommended_actions,
        })
    }
}

/// Classify by the query-count row and the user-count row independently and
/// take the higher of the two.
pub fn classify_severity(query_count: usize, user_count: usize) -> Severity {
    let by_queries = match query_count {
        0..=2 => Severity::Low,
        3..=5 => Severity::Medium,
        6..=10 => Severity::High,
        _ => Severity::Critical,
    };
    let by_users = match user_count {
        0..=1 => Severity::Low,
        2..=3 => Severity::Medium,
        4..=6 => Severity::High,
        _ => Severity::Critical,
    };
    by_queries.max(by_users)
}

fn recommendations(severity: Severity, user_count: usize, doc_id: &str, empty: bool) -> Vec<String> {
    if empty {
        return vec!["No affected queries found in lookback window".to_string()];
    }

    let mut actions = vec![
        format!("Review query lineage log for document {doc_id}"),
        format!("Notify {user_count} affected user(s) about potentially compromised guidance"),
    ];

    if severity >= Severity::High {
        actions.extend([
            "Conduct full security audit of recent actions".to_string(),
            "Review any remediation steps taken based on this document".to_string(),
            "Consider investigating document source for additional compromised content".to_string(),
            "Escalate to security incident response team".to_string(),
        ]);
    }

    if severity == Severity::Critical {
        actions.extend([
            "Initiate emergency response protocol".to_string(),
            "Audit all user sessions in affected time window".to_string(),
            "Consider temporary suspension of affected document source".to_string(),
        ]);
    }

    actions
}
