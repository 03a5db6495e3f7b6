//! HTTP server setup and routing

use crate::api::handlers;
use crate::error::Result;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

/// Build the full router; shared with the integration tests
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/query", post(handlers::query))
        .route("/api/query/unsafe", post(handlers::query_unsafe))
        .route("/api/quarantine", get(handlers::quarantine_list))
        .route("/api/quarantine/:quarantine_id", get(handlers::quarantine_get))
        .route(
            "/api/quarantine/:quarantine_id/confirm",
            post(handlers::quarantine_confirm),
        )
        .route(
            "/api/quarantine/:quarantine_id/restore",
            post(handlers::quarantine_restore),
        )
        .route("/api/blast-radius/:doc_id", get(handlers::blast_radius))
        .route("/api/events", get(handlers::events))
        .route("/api/events/stream", get(handlers::events_stream))
        .route("/api/demo/reset", post(handlers::demo_reset))
        .route("/api/status", get(handlers::status))
        // Browser dashboards are served from another origin in development
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until shutdown
pub async fn start(bind_addr: &str, state: AppState) -> Result<()> {
    let bus = state.bus.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Drain the event queue so everything published is durable
    bus.shutdown().await;
    Ok(())
}
