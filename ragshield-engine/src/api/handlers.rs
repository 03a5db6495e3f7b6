//! Endpoint handlers

use crate::api::ApiError;
use crate::sse;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use ragshield_common::api::{
    AnalystAction, EventsResponse, QuarantineListResponse, QueryRequest, QueryResponse,
    ResetResponse, SignalScores, StatusResponse,
};
use ragshield_common::events::EventLevel;
use ragshield_common::schemas::{BlastRadiusReport, QuarantineState};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "ragshield-engine",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/query
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let k = validate_query(&state, &request)?;

    let outcome = state
        .pipeline
        .query(request.query.trim(), &request.user_id, k)
        .await?;

    Ok(Json(to_query_response(outcome)))
}

/// POST /api/query/unsafe
///
/// Demonstration path without integrity checks; 403 unless explicitly
/// enabled in configuration.
pub async fn query_unsafe(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if !state.config.enable_unsafe_queries {
        return Err(ApiError::forbidden("unsafe query path is disabled"));
    }
    let k = validate_query(&state, &request)?;

    let outcome = state
        .pipeline
        .query_unsafe(request.query.trim(), &request.user_id, k)
        .await?;

    Ok(Json(to_query_response(outcome)))
}

fn validate_query(state: &AppState, request: &QueryRequest) -> Result<usize, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let k = request.k.unwrap_or(state.config.default_k);
    if k == 0 || k > state.config.max_k {
        return Err(ApiError::bad_request(format!(
            "k must lie in 1..={}",
            state.config.max_k
        )));
    }
    Ok(k)
}

fn to_query_response(outcome: crate::pipeline::QueryOutcome) -> QueryResponse {
    let integrity_signals: BTreeMap<String, SignalScores> = outcome
        .signals_by_doc
        .into_iter()
        .map(|(doc_id, signals)| (doc_id, SignalScores::from(signals)))
        .collect();
    QueryResponse {
        answer: outcome.answer,
        integrity_signals,
        retrieved_docs: outcome.retrieved_doc_ids,
        quarantined_docs: outcome.quarantined_doc_ids,
        query_id: outcome.query_id,
    }
}

#[derive(Debug, Deserialize)]
pub struct QuarantineListParams {
    #[serde(default)]
    pub include_restored: Option<String>,
}

/// GET /api/quarantine
pub async fn quarantine_list(
    State(state): State<AppState>,
    Query(params): Query<QuarantineListParams>,
) -> Result<Json<QuarantineListResponse>, ApiError> {
    let include_restored = matches!(params.include_restored.as_deref(), Some("1") | Some("true"));

    let mut quarantined = state.vault.list(None).await?;
    if !include_restored {
        quarantined.retain(|r| r.state != QuarantineState::Restored);
    }

    Ok(Json(QuarantineListResponse { quarantined }))
}

/// GET /api/quarantine/:quarantine_id
pub async fn quarantine_get(
    State(state): State<AppState>,
    Path(quarantine_id): Path<String>,
) -> Result<Json<ragshield_common::schemas::QuarantineRecord>, ApiError> {
    let record = state.vault.get(&quarantine_id).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("quarantine record not found: {quarantine_id}"),
        )
    })?;
    Ok(Json(record))
}

/// POST /api/quarantine/:quarantine_id/confirm
pub async fn quarantine_confirm(
    State(state): State<AppState>,
    Path(quarantine_id): Path<String>,
    Json(action): Json<AnalystAction>,
) -> Result<StatusCode, ApiError> {
    if action.analyst.trim().is_empty() {
        return Err(ApiError::bad_request("analyst must not be empty"));
    }
    state
        .vault
        .confirm(&quarantine_id, &action.analyst, &action.notes)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/quarantine/:quarantine_id/restore
pub async fn quarantine_restore(
    State(state): State<AppState>,
    Path(quarantine_id): Path<String>,
    Json(action): Json<AnalystAction>,
) -> Result<StatusCode, ApiError> {
    if action.analyst.trim().is_empty() {
        return Err(ApiError::bad_request("analyst must not be empty"));
    }
    state
        .vault
        .restore(&quarantine_id, &action.analyst, &action.notes)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BlastRadiusParams {
    pub window_hours: Option<u64>,
}

/// GET /api/blast-radius/:doc_id
pub async fn blast_radius(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Query(params): Query<BlastRadiusParams>,
) -> Result<Json<BlastRadiusReport>, ApiError> {
    let hours = params.window_hours.unwrap_or(24);
    if hours == 0 {
        return Err(ApiError::bad_request("window_hours must be at least 1"));
    }
    let report = state
        .blast
        .analyze(&doc_id, Duration::from_secs(hours * 3600))
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub limit: Option<usize>,
    pub level: Option<EventLevel>,
}

/// GET /api/events
pub async fn events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(100).min(1000);
    let events = state.bus.recent(limit, params.level).await?;
    Ok(Json(EventsResponse { events }))
}

/// GET /api/events/stream
pub async fn events_stream(State(state): State<AppState>) -> impl IntoResponse {
    sse::live_event_stream(&state.bus)
}

/// POST /api/demo/reset
///
/// DESTRUCTIVE: clears events, lineage, vault, and index. 403 unless
/// explicitly allowed in configuration.
pub async fn demo_reset(State(state): State<AppState>) -> Result<Json<ResetResponse>, ApiError> {
    if !state.config.allow_demo_reset {
        return Err(ApiError::forbidden("demo reset is disabled"));
    }

    state.adapter.clear().await?;
    state.vault.reset().await?;
    state.lineage.reset().await?;
    state.bus.reset().await?;
    info!("demo reset completed: events, lineage, vault, and index cleared");

    Ok(Json(ResetResponse {
        status: "reset".to_string(),
        message: "All state cleared successfully.".to_string(),
    }))
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let documents_indexed = state.adapter.document_count().await?;
    let vault_size = state.vault.count().await?;
    Ok(Json(StatusResponse {
        documents_indexed,
        vault_size,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
