//! Error types for ragshield-engine
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Each variant maps onto one propagation rule of the error
//! handling design (HTTP status, absorbed-with-default, or fail-fast).

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed client input; rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// The retrieval adapter or its collaborators failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// A single scorer failed; callers substitute a neutral score
    #[error("Scorer error: {0}")]
    Scorer(String),

    /// Quarantine vault write failed; the document stays retrievable
    #[error("Vault error: {0}")]
    Vault(String),

    /// State-machine transition attempted from a terminal state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The generation collaborator failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// A suspending operation exceeded the query deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error (startup only)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Index storage errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors on the durable sinks
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
