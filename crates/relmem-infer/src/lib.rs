//! External inference capabilities for the relational memory core.
//!
//! The core treats every external model call as a fallible, rate-limited,
//! billable dependency behind a narrow trait:
//!
//! - [`Embedder`]: text → fixed-length vector, used for storage and queries
//! - [`Inference`]: prompt → structured JSON, used by the entity extractor,
//!   the relation builder's escalation path, and the semantic conflict scan
//!
//! Both traits ship with deterministic mocks so the core is fully testable
//! without a live service, plus OpenAI-compatible HTTP implementations for
//! production. Errors carry retryability so callers know whether to back
//! off or to fall back to their rule-based path.

pub mod embeddings;
pub mod error;
pub mod inference;
pub mod retry;

pub use embeddings::{
    Embedder, FailingEmbedder, HttpEmbedder, HttpEmbedderConfig, MockEmbedder, SharedEmbedder,
};
pub use error::{InferError, Result, is_retryable};
pub use inference::{
    HttpInference, HttpInferenceConfig, Inference, MockInference, SharedInference,
    strip_json_fences,
};
pub use retry::with_retry;
