//! SQLite-backed storage for the relational memory core.
//!
//! One database file is the single source of truth: memory entries with
//! version lineage, deduplicated entity tags with entry links, typed
//! relation edges, detected conflicts, and the durable enrichment-job
//! queue. Vector similarity search runs in-process via sqlite-vec.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │  MemoryStore (single SQLite file, WAL mode)                        │
//! │  entries ──┬── entry_entities ── entities                          │
//! │            ├── relations (typed edges, unique triple)              │
//! │            ├── conflicts (canonical pair, unique)                  │
//! │            ├── jobs (durable enrichment queue)                     │
//! │            └── entry_embeddings (vec0, cosine)                     │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutation goes through the store. The two shared counters are
//! handled natively: `is_latest` flips commit in the same transaction as
//! the insert that causes them, and entity mention counts are incremented
//! with SQL upserts rather than read-modify-write.

pub mod error;
pub mod scoring;
pub mod store;
pub mod vector;

pub use error::{Result, StoreError};
pub use scoring::{QualityTier, ScoringParams, score_entry, time_decay, usage_boost};
pub use store::{
    ClaimMismatch, ConflictFilter, MemoryStore, ScopeFilter, SimilarEntry, StoreStats, VersionDiff,
};
pub use vector::{
    count_embeddings, get_embedding, init_vector_extension, search_similar, store_embedding,
};
