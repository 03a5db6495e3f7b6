//! Core data model: documents, integrity signals, quarantine records,
//! query lineage, and blast-radius reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn clip_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.5;
    }
    value.clamp(0.0, 1.0)
}

/// Document metadata as seen by the core.
///
/// The engine owns `is_quarantined` and `quarantine_id`; all other fields are
/// written at ingestion and treated as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// Open set: `clean`, `poisoned`, `golden`, `unknown`, ...
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Extracted identifiers. The index stores only the first element
    /// (scalar metadata constraint), so this holds at most one entry after a
    /// round trip through storage.
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub is_quarantined: bool,
    /// Empty when the document is not quarantined
    #[serde(default)]
    pub quarantine_id: String,
}

impl DocumentMetadata {
    pub fn new(source: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            category: category.into(),
            title: None,
            identifiers: Vec::new(),
            is_quarantined: false,
            quarantine_id: String::new(),
        }
    }
}

/// A document with its metadata, as returned by the retrieval adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Four-signal integrity scores plus the derived quarantine decision.
///
/// Every signal lies in `[0, 1]`; higher is safer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegritySignals {
    pub trust_score: f64,
    pub red_flag_score: f64,
    pub anomaly_score: f64,
    pub semantic_drift_score: f64,
    pub should_quarantine: bool,
}

impl IntegritySignals {
    /// Clip the raw scores to `[0, 1]` and apply the vote rule: quarantine
    /// when at least `votes` signals fall below `threshold`.
    ///
    /// The decision is an unweighted vote; signal weights are reserved for a
    /// future weighted mode.
    pub fn aggregate(
        trust: f64,
        red_flag: f64,
        anomaly: f64,
        semantic_drift: f64,
        threshold: f64,
        votes: usize,
    ) -> Self {
        let trust_score = clip_unit(trust);
        let red_flag_score = clip_unit(red_flag);
        let anomaly_score = clip_unit(anomaly);
        let semantic_drift_score = clip_unit(semantic_drift);
        let below = [trust_score, red_flag_score, anomaly_score, semantic_drift_score]
            .iter()
            .filter(|s| **s < threshold)
            .count();
        Self {
            trust_score,
            red_flag_score,
            anomaly_score,
            semantic_drift_score,
            should_quarantine: below >= votes,
        }
    }

    /// Signal names scoring below `threshold`, formatted for reason strings
    pub fn low_signals(&self, threshold: f64) -> Vec<String> {
        let mut low = Vec::new();
        for (name, score) in [
            ("trust", self.trust_score),
            ("red_flag", self.red_flag_score),
            ("anomaly", self.anomaly_score),
            ("semantic_drift", self.semantic_drift_score),
        ] {
            if score < threshold {
                low.push(format!("{} ({:.2})", name, score));
            }
        }
        low
    }
}

/// Quarantine record state machine
///
/// `QUARANTINED` is the only state with outgoing transitions; `CONFIRMED_MALICIOUS`
/// and `RESTORED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuarantineState {
    Quarantined,
    ConfirmedMalicious,
    Restored,
}

impl QuarantineState {
    /// Active records keep the document excluded from retrieval
    pub fn is_active(&self) -> bool {
        !matches!(self, QuarantineState::Restored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuarantineState::Quarantined => "QUARANTINED",
            QuarantineState::ConfirmedMalicious => "CONFIRMED_MALICIOUS",
            QuarantineState::Restored => "RESTORED",
        }
    }
}

/// One entry of a record's append-only state history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<QuarantineState>,
}

/// A vault entry for one quarantined document.
///
/// Records are never deleted; a document may accumulate multiple historical
/// records, but at most one of them is in a non-RESTORED state at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub quarantine_id: String,
    pub doc_id: String,
    pub state: QuarantineState,
    pub quarantined_at: DateTime<Utc>,
    pub reason: String,
    pub signals: IntegritySignals,
    pub content_snapshot: String,
    pub original_metadata: DocumentMetadata,
    #[serde(default)]
    pub state_history: Vec<AuditEntry>,
}

/// Disposition of a query after the integrity decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageAction {
    /// No retrieved document was quarantined
    Clean,
    /// Some retrieved documents were quarantined
    Partial,
    /// Every retrieved document was quarantined, or an exact-identifier
    /// lookup found nothing retrievable
    Blocked,
}

/// Append-only record of one query that reached retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub query_id: String,
    pub query_text: String,
    pub user_id: String,
    pub retrieved_doc_ids: Vec<String>,
    #[serde(default)]
    pub quarantined_doc_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub action: LineageAction,
}

/// Blast-radius severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One affected query inside a blast-radius report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedQuery {
    pub query_id: String,
    pub query_text: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: LineageAction,
}

/// Impact analysis for one document over a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastRadiusReport {
    pub doc_id: String,
    pub affected_query_count: usize,
    pub affected_users: BTreeSet<String>,
    pub query_details: Vec<AffectedQuery>,
    pub time_window_start: DateTime<Utc>,
    pub time_window_end: DateTime<Utc>,
    pub severity: Severity,
    pub recommended_actions: Vec<String>,
}
