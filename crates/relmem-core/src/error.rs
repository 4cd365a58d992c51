//! Error types for the memory core.

use thiserror::Error;

/// Errors surfaced by the core's operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Store(#[from] relmem_store::StoreError),

    #[error("Inference error: {0}")]
    Infer(#[from] relmem_infer::InferError),

    /// Rejected before any write happened.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The embedder is down and no graph-only fallback applies.
    #[error("Embedding service unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
