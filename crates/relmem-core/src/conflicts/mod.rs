//! Conflict detection.
//!
//! Structural detection is cheap and runs inline in the enrichment worker
//! after every insert of a claimed entry. Semantic detection is expensive
//! and runs as a periodic scan over the strategic pool; see [`semantic`].

pub mod semantic;

use std::sync::Arc;

use relmem_store::MemoryStore;
use relmem_types::{ConflictType, EntryId, MemoryConflict};
use tracing::info;

pub use semantic::SemanticScanner;

use crate::error::Result;

/// Structural (claim-based) conflict detection.
pub struct ConflictDetector {
    store: Arc<MemoryStore>,
}

impl ConflictDetector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Flag a `claim_mismatch` conflict against every latest entry in the
    /// same tenant that disagrees on this entry's claim. Returns the number
    /// of new conflicts; pairs already flagged are skipped.
    pub fn detect_structural(&self, entry_id: EntryId) -> Result<usize> {
        let mut created = 0;
        for mismatch in self.store.find_claim_mismatches(entry_id)? {
            let conflict =
                MemoryConflict::between(entry_id, mismatch.other_id, ConflictType::ClaimMismatch);
            if self.store.insert_conflict(&conflict)? {
                info!(
                    "Claim mismatch between {} and {} (other value {:?})",
                    entry_id, mismatch.other_id, mismatch.other_value
                );
                created += 1;
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_store::ConflictFilter;
    use relmem_types::{ConflictStatus, ContentType, MemoryEntry, Scope};

    fn test_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::open_in_memory(4).unwrap())
    }

    fn claimed(store: &MemoryStore, tenant: &str, value: &str) -> MemoryEntry {
        let e = MemoryEntry::new(
            ContentType::Fact,
            format!("db is {value}"),
            0.9,
            Scope::new(tenant),
        )
        .with_claim("db_engine", value);
        store.commit_entry(&e, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        e
    }

    #[test]
    fn test_mismatch_creates_single_pending_conflict() {
        let store = test_store();
        let detector = ConflictDetector::new(store.clone());

        let a = claimed(&store, "acme", "postgres");
        let b = claimed(&store, "acme", "mongo");

        assert_eq!(detector.detect_structural(b.id).unwrap(), 1);

        let conflicts = store.list_conflicts(&ConflictFilter::new()).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].status, ConflictStatus::Pending);
        assert!(conflicts[0].involves(a.id) && conflicts[0].involves(b.id));
    }

    #[test]
    fn test_detection_from_either_side_dedupes() {
        let store = test_store();
        let detector = ConflictDetector::new(store.clone());

        let a = claimed(&store, "acme", "postgres");
        let b = claimed(&store, "acme", "mongo");

        assert_eq!(detector.detect_structural(a.id).unwrap(), 1);
        assert_eq!(detector.detect_structural(b.id).unwrap(), 0);
        assert_eq!(store.list_conflicts(&ConflictFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_agreeing_and_cross_tenant_claims_do_not_conflict() {
        let store = test_store();
        let detector = ConflictDetector::new(store.clone());

        let a = claimed(&store, "acme", "postgres");
        let _agrees = claimed(&store, "acme", "postgres");
        let _foreign = claimed(&store, "globex", "mongo");

        assert_eq!(detector.detect_structural(a.id).unwrap(), 0);
    }
}
