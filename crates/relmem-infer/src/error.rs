//! Error types for the inference crate.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the inference error type.
pub type Result<T> = std::result::Result<T, InferError>;

/// Errors from external embedding/LLM calls.
#[derive(Debug, Error)]
pub enum InferError {
    /// Network-level failure (connection refused, DNS, TLS).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider rejected the request or returned a non-success status.
    #[error("Provider error: HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    /// The provider asked us to slow down.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Provider-specified wait, if any.
        retry_after: Option<Duration>,
    },

    /// The call exceeded its deadline.
    #[error("Inference call timed out after {0:?}")]
    Timeout(Duration),

    /// The model answered, but not with the structure we asked for.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or malformed configuration (API key, base URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The capability is disabled or has no backing implementation.
    #[error("Inference unavailable: {0}")]
    Unavailable(String),
}

/// Whether a failed call is worth retrying with backoff.
///
/// Malformed responses and configuration problems will not fix themselves;
/// network hiccups, timeouts, rate limits, and 5xx responses might.
pub fn is_retryable(err: &InferError) -> bool {
    match err {
        InferError::Network(e) => !e.is_builder(),
        InferError::Timeout(_) => true,
        InferError::RateLimited { .. } => true,
        InferError::Provider { status, .. } => *status >= 500 || *status == 429,
        InferError::InvalidResponse(_)
        | InferError::Serialization(_)
        | InferError::Config(_)
        | InferError::Unavailable(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&InferError::Timeout(Duration::from_secs(30))));
        assert!(is_retryable(&InferError::RateLimited {
            message: "slow down".into(),
            retry_after: None,
        }));
        assert!(is_retryable(&InferError::Provider {
            status: 503,
            message: "overloaded".into(),
        }));
        assert!(!is_retryable(&InferError::Provider {
            status: 400,
            message: "bad request".into(),
        }));
        assert!(!is_retryable(&InferError::InvalidResponse(
            "not json".into()
        )));
        assert!(!is_retryable(&InferError::Config("no api key".into())));
    }
}
