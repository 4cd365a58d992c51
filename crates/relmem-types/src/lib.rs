//! Shared data model for the relmem relational memory core.
//!
//! This crate defines the types that flow between the store, the inference
//! layer, and the core algorithms: memory entries with version lineage,
//! deduplicated entity tags, typed relations, detected conflicts, and the
//! durable enrichment jobs that decouple writes from inference.

pub mod conflict;
pub mod entity;
pub mod entry;
pub mod ids;
pub mod job;
pub mod relation;

pub use conflict::{ConflictStatus, ConflictType, MemoryConflict};
pub use entity::{EntityMention, EntityTag, EntityType, normalize_entity_name};
pub use entry::{ContentType, MemoryEntry, Scope};
pub use ids::{ConflictId, EntityId, EntryId, JobId, RelationId};
pub use job::{EnrichmentJob, EnrichmentStatus, JobPriority, JobStatus};
pub use relation::{MemoryRelation, RelationType};

/// Timestamp type used throughout the system.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
