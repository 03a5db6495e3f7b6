//! # RAGShield Engine (ragshield-engine)
//!
//! Security middleware between vector-store retrieval and LLM generation.
//!
//! **Purpose:** inspect every retrieved document, score it on four
//! independent integrity signals, isolate failures in a persistent
//! quarantine vault, track exposure through an append-only query-lineage
//! log, and serve an HTTP/SSE control surface for analysts.
//!
//! **Architecture:** event bus -> lineage store -> retrieval adapter ->
//! quarantine vault -> scorer set -> integrity pipeline -> HTTP surface,
//! each injected as an explicit handle (no singletons).

pub mod adapters;
pub mod api;
pub mod blast;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod ingest;
pub mod lineage;
pub mod pipeline;
pub mod query;
pub mod retrieval;
pub mod scoring;
pub mod server;
pub mod sse;
pub mod state;
pub mod vault;

pub use error::{Error, Result};
pub use state::AppState;
