//! Relational memory core: the assembled system.
//!
//! This crate wires the storage layer into a working memory substrate for
//! agent fleets. Writes return as soon as the entry and its embedding are
//! durable; a background worker pool then extracts entities, infers typed
//! relations, and checks for conflicts, checkpointing progress in the
//! durable job queue.
//!
//! # Architecture
//!
//! ```text
//!            write                     query
//!              │                         │
//!      ┌───────▼───────┐        ┌────────▼────────┐
//!      │  WriteRouter   │        │ HybridRetriever │
//!      │ validate+embed │        │ seeds + graph   │
//!      └───────┬───────┘        └────────┬────────┘
//!              │  entry + job            │
//!      ┌───────▼─────────────────────────▼───────┐
//!      │               MemoryStore                │
//!      └───────▲─────────────────────────▲───────┘
//!              │                         │
//!      ┌───────┴────────┐       ┌────────┴────────┐
//!      │ EnrichmentPool │       │ SemanticScanner │
//!      │ 3-phase jobs   │       │ periodic sweep  │
//!      └────────────────┘       └─────────────────┘
//! ```
//!
//! [`RelationalMemory`] is the front door; the individual pieces are
//! exported for embedders that want to run only part of the pipeline.

pub mod config;
pub mod conflicts;
pub mod error;
pub mod extract;
pub mod memory;
pub mod relations;
pub mod retrieve;
pub mod router;
pub mod version;
pub mod worker;

pub use config::RmcConfig;
pub use conflicts::{ConflictDetector, SemanticScanner};
pub use error::{CoreError, Result};
pub use extract::EntityExtractor;
pub use memory::RelationalMemory;
pub use relations::RelationBuilder;
pub use retrieve::{
    HybridRetriever, InferencePath, PathKind, RetrievalOptions, RetrievalResult, RetrievedEntry,
};
pub use router::{MemoryWrite, WriteRouter};
pub use version::{VersionNode, VersionTree};
pub use worker::{EnrichmentPipeline, EnrichmentWorkerPool};
