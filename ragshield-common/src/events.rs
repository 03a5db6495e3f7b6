//! Event taxonomy and event records
//!
//! Every observable action in the engine is reported as an [`Event`] carrying
//! a code from a closed taxonomy (`RAG-1001` .. `RAG-4002`). Events are
//! appended to a durable JSONL log and fanned out to live SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Event severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
    Critical,
}

/// Event category, derived from the code range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCategory {
    Integrity,
    Quarantine,
    BlastRadius,
    System,
}

/// Closed event-code taxonomy. Codes outside this set are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    /// RAG-1001: query received
    QueryReceived,
    /// RAG-1002: retrieval fallback or quarantine-only result
    RetrievalFallback,
    /// RAG-1003: integrity check passed
    IntegrityPassed,
    /// RAG-2001: document quarantined
    DocumentQuarantined,
    /// RAG-2002: quarantine confirmed malicious
    QuarantineConfirmed,
    /// RAG-2003: quarantine restored (false positive)
    QuarantineRestored,
    /// RAG-3001: blast-radius assessment requested
    BlastRadiusRequested,
    /// RAG-3002: high/critical blast radius detected
    BlastRadiusHighImpact,
    /// RAG-4001: retrieval completed
    RetrievalCompleted,
    /// RAG-4002: generation completed
    GenerationCompleted,
}

impl EventCode {
    /// Numeric code within the `RAG-NNNN` taxonomy
    pub fn code(&self) -> u16 {
        match self {
            EventCode::QueryReceived => 1001,
            EventCode::RetrievalFallback => 1002,
            EventCode::IntegrityPassed => 1003,
            EventCode::DocumentQuarantined => 2001,
            EventCode::QuarantineConfirmed => 2002,
            EventCode::QuarantineRestored => 2003,
            EventCode::BlastRadiusRequested => 3001,
            EventCode::BlastRadiusHighImpact => 3002,
            EventCode::RetrievalCompleted => 4001,
            EventCode::GenerationCompleted => 4002,
        }
    }

    /// Look up a code number; unknown numbers are rejected with `None`
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1001 => Some(EventCode::QueryReceived),
            1002 => Some(EventCode::RetrievalFallback),
            1003 => Some(EventCode::IntegrityPassed),
            2001 => Some(EventCode::DocumentQuarantined),
            2002 => Some(EventCode::QuarantineConfirmed),
            2003 => Some(EventCode::QuarantineRestored),
            3001 => Some(EventCode::BlastRadiusRequested),
            3002 => Some(EventCode::BlastRadiusHighImpact),
            4001 => Some(EventCode::RetrievalCompleted),
            4002 => Some(EventCode::GenerationCompleted),
            _ => None,
        }
    }

    /// Category is fully determined by the thousands range of the code
    pub fn category(&self) -> EventCategory {
        match self.code() / 1000 {
            1 => EventCategory::Integrity,
            2 => EventCategory::Quarantine,
            3 => EventCategory::BlastRadius,
            _ => EventCategory::System,
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RAG-{:04}", self.code())
    }
}

/// Error for code strings/numbers outside the taxonomy
#[derive(Debug, Error)]
#[error("unknown event code: {0}")]
pub struct UnknownEventCode(pub String);

impl FromStr for EventCode {
    type Err = UnknownEventCode;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("RAG-")
            .ok_or_else(|| UnknownEventCode(s.to_string()))?;
        let code: u16 = digits
            .parse()
            .map_err(|_| UnknownEventCode(s.to_string()))?;
        EventCode::from_code(code).ok_or_else(|| UnknownEventCode(s.to_string()))
    }
}

impl Serialize for EventCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One structured event, as appended to `events.jsonl` and streamed over SSE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically unique per process installation
    pub event_id: u64,
    pub code: EventCode,
    pub level: EventLevel,
    pub category: EventCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Query id when the event belongs to a query's causal chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Opaque structured detail
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip_through_display_and_fromstr() {
        for code in [
            EventCode::QueryReceived,
            EventCode::RetrievalFallback,
            EventCode::IntegrityPassed,
            EventCode::DocumentQuarantined,
            EventCode::QuarantineConfirmed,
            EventCode::QuarantineRestored,
            EventCode::BlastRadiusRequested,
            EventCode::BlastRadiusHighImpact,
            EventCode::RetrievalCompleted,
            EventCode::GenerationCompleted,
        ] {
            let rendered = code.to_string();
            assert_eq!(rendered.parse::<EventCode>().unwrap(), code);
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert!(EventCode::from_code(1999).is_none());
        assert!(EventCode::from_code(4003).is_none());
        assert!("RAG-9999".parse::<EventCode>().is_err());
        assert!("EVT-1001".parse::<EventCode>().is_err());
    }

    #[test]
    fn category_follows_code_range() {
        assert_eq!(EventCode::QueryReceived.category(), EventCategory::Integrity);
        assert_eq!(EventCode::DocumentQuarantined.category(), EventCategory::Quarantine);
        assert_eq!(EventCode::BlastRadiusRequested.category(), EventCategory::BlastRadius);
        assert_eq!(EventCode::GenerationCompleted.category(), EventCategory::System);
    }

    #[test]
    fn event_serializes_code_as_string() {
        let event = Event {
            event_id: 7,
            code: EventCode::DocumentQuarantined,
            level: EventLevel::Warn,
            category: EventCode::DocumentQuarantined.category(),
            message: "quarantined".to_string(),
            timestamp: Utc::now(),
            correlation_id: Some("q-1".to_string()),
            payload: serde_json::json!({"doc_id": "d-1"}),
        };
        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains("\"RAG-2001\""));
        assert!(line.contains("\"WARN\""));
        let back: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(back.code, EventCode::DocumentQuarantined);
        assert_eq!(back.event_id, 7);
    }
}
