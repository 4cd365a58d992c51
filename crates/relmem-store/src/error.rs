//! Error types for the store crate.

use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid UUID format.
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Invalid data or parameters.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation not allowed in the current state (e.g. re-resolving a
    /// terminal conflict).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An edge from an entry to itself was rejected.
    #[error("Self-loop rejected for entry {0}")]
    SelfLoop(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Whether a rusqlite error is a unique/primary-key constraint violation.
///
/// Enrichment treats these as no-op success: the unique indexes are what
/// make retried jobs idempotent.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                ..
            },
            _,
        )
    )
}
