//! Version lineage queries.
//!
//! Version writes happen in [`MemoryStore::commit_entry`]; this module is
//! the read side of lineage: history, tree edges, and field-level diffs.

use relmem_types::{EntryId, MemoryEntry};
use rusqlite::params;

use crate::error::{Result, StoreError};

use super::MemoryStore;
use super::entry_ops::{ENTRY_COLUMNS_SQL, row_to_entry};
use super::query::VersionDiff;

impl MemoryStore {
    /// All versions in a lineage, oldest first.
    pub fn versions_for_root(&self, root_id: EntryId) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTRY_COLUMNS_SQL} WHERE root_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let mut rows = stmt.query(params![root_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }

    /// The single latest version of a lineage.
    pub fn latest_for_root(&self, root_id: EntryId) -> Result<Option<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTRY_COLUMNS_SQL} WHERE root_id = ?1 AND is_latest = 1"
        ))?;
        let mut rows = stmt.query(params![root_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_entry(row)?))
        } else {
            Ok(None)
        }
    }

    /// Direct children of a version. Non-empty for every version except
    /// leaves; more than one child means the lineage forked at some point.
    pub fn children_of(&self, parent_id: EntryId) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTRY_COLUMNS_SQL} WHERE parent_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let mut rows = stmt.query(params![parent_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }

    /// Field-by-field diff between two versions of the same lineage.
    pub fn compare_versions(&self, left: EntryId, right: EntryId) -> Result<Vec<VersionDiff>> {
        let a = self
            .get_entry(left)?
            .ok_or_else(|| StoreError::NotFound(format!("Entry {}", left)))?;
        let b = self
            .get_entry(right)?
            .ok_or_else(|| StoreError::NotFound(format!("Entry {}", right)))?;

        if a.root_id != b.root_id {
            return Err(StoreError::InvalidData(format!(
                "entries {} and {} belong to different lineages",
                left, right
            )));
        }

        Ok(diff_entries(&a, &b))
    }
}

fn diff_entries(a: &MemoryEntry, b: &MemoryEntry) -> Vec<VersionDiff> {
    let mut diffs = Vec::new();
    let mut push = |field: &str, left: Option<String>, right: Option<String>| {
        if left != right {
            diffs.push(VersionDiff {
                field: field.to_string(),
                left,
                right,
            });
        }
    };

    push("content", Some(a.content.clone()), Some(b.content.clone()));
    push(
        "content_type",
        Some(a.content_type.as_str().to_string()),
        Some(b.content_type.as_str().to_string()),
    );
    push(
        "confidence",
        Some(a.confidence.to_string()),
        Some(b.confidence.to_string()),
    );
    push("claim_key", a.claim_key.clone(), b.claim_key.clone());
    push("claim_value", a.claim_value.clone(), b.claim_value.clone());
    push(
        "created_by",
        Some(a.created_by.clone()),
        Some(b.created_by.clone()),
    );

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_types::{ContentType, Scope};

    fn create_test_store() -> MemoryStore {
        MemoryStore::open_in_memory(4).unwrap()
    }

    fn lineage(store: &MemoryStore) -> (MemoryEntry, MemoryEntry, MemoryEntry) {
        let v1 = MemoryEntry::new(ContentType::Fact, "v1", 0.7, Scope::new("acme"));
        store.commit_entry(&v1, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        let v2 = MemoryEntry::new_version(&v1, "v2", 0.8);
        store.commit_entry(&v2, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        let v3 = MemoryEntry::new_version(&v2, "v3", 0.9);
        store.commit_entry(&v3, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        (v1, v2, v3)
    }

    #[test]
    fn test_versions_for_root_ordering() {
        let store = create_test_store();
        let (v1, v2, v3) = lineage(&store);

        let versions = store.versions_for_root(v1.id).unwrap();
        let ids: Vec<_> = versions.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![v1.id, v2.id, v3.id]);
        assert!(versions[2].is_latest);
        assert!(!versions[0].is_latest && !versions[1].is_latest);
    }

    #[test]
    fn test_latest_for_root() {
        let store = create_test_store();
        let (v1, _, v3) = lineage(&store);

        let latest = store.latest_for_root(v1.id).unwrap().unwrap();
        assert_eq!(latest.id, v3.id);

        assert!(store.latest_for_root(EntryId::new()).unwrap().is_none());
    }

    #[test]
    fn test_children_of() {
        let store = create_test_store();
        let (v1, v2, v3) = lineage(&store);

        let kids = store.children_of(v1.id).unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].id, v2.id);
        assert!(store.children_of(v3.id).unwrap().is_empty());
    }

    #[test]
    fn test_compare_versions() {
        let store = create_test_store();
        let (v1, _, v3) = lineage(&store);

        let diffs = store.compare_versions(v1.id, v3.id).unwrap();
        let fields: Vec<_> = diffs.iter().map(|d| d.field.as_str()).collect();
        assert!(fields.contains(&"content"));
        assert!(fields.contains(&"confidence"));
        assert!(!fields.contains(&"claim_key"));

        // Identical versions diff empty
        assert!(store.compare_versions(v1.id, v1.id).unwrap().is_empty());
    }

    #[test]
    fn test_compare_rejects_cross_lineage() {
        let store = create_test_store();
        let (v1, _, _) = lineage(&store);
        let stranger = MemoryEntry::new(ContentType::Fact, "other", 0.9, Scope::new("acme"));
        store.commit_entry(&stranger, &[1.0, 0.0, 0.0, 0.0], None).unwrap();

        assert!(store.compare_versions(v1.id, stranger.id).is_err());
    }
}
