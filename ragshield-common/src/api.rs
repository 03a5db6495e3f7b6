//! HTTP API request/response types
//!
//! Wire shapes for the engine's JSON surface. Field names are part of the
//! external contract and must not drift.

use crate::events::Event;
use crate::schemas::{IntegritySignals, QuarantineRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_user_id() -> String {
    "demo-user".to_string()
}

/// `POST /api/query` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

/// Per-document signal scores as exposed on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalScores {
    pub trust_score: f64,
    pub red_flag_score: f64,
    pub anomaly_score: f64,
    pub semantic_drift_score: f64,
}

impl From<IntegritySignals> for SignalScores {
    fn from(signals: IntegritySignals) -> Self {
        Self {
            trust_score: signals.trust_score,
            red_flag_score: signals.red_flag_score,
            anomaly_score: signals.anomaly_score,
            semantic_drift_score: signals.semantic_drift_score,
        }
    }
}

/// `POST /api/query` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub integrity_signals: BTreeMap<String, SignalScores>,
    pub retrieved_docs: Vec<String>,
    pub quarantined_docs: Vec<String>,
    pub query_id: String,
}

/// Body for `POST /api/quarantine/{id}/confirm` and `.../restore`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystAction {
    pub analyst: String,
    #[serde(default)]
    pub notes: String,
}

/// `GET /api/quarantine` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineListResponse {
    pub quarantined: Vec<QuarantineRecord>,
}

/// `GET /api/events` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
}

/// `GET /api/status` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub documents_indexed: u64,
    pub vault_size: u64,
    pub uptime_seconds: u64,
    pub version: String,
}

/// `POST /api/demo/reset` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
    pub message: String,
}

/// Uniform error body for non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
