//! Conflict operations: detection records and their resolution lifecycle.

use relmem_types::{
    ConflictId, ConflictStatus, ConflictType, EntryId, MemoryConflict, now,
};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{Result, StoreError, is_unique_violation};

use super::MemoryStore;
use super::entry_ops::parse_timestamp;
use super::query::{ClaimMismatch, ConflictFilter};

impl MemoryStore {
    /// Record a detected conflict.
    ///
    /// Returns `Ok(false)` when the pair is already flagged, regardless of
    /// conflict type or status, so repeated detection passes stay quiet.
    pub fn insert_conflict(&self, conflict: &MemoryConflict) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            r#"
            INSERT INTO conflicts (id, entry_a, entry_b, conflict_type, status,
                                   resolution_entry_id, detected_at, resolved_at, resolved_by, note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                conflict.id.to_string(),
                conflict.entry_a.to_string(),
                conflict.entry_b.to_string(),
                conflict.conflict_type.as_str(),
                conflict.status.as_str(),
                conflict.resolution_entry_id.map(|id| id.to_string()),
                conflict.detected_at.to_rfc3339(),
                conflict.resolved_at.map(|t| t.to_rfc3339()),
                conflict.resolved_by,
                conflict.note,
            ],
        );

        match result {
            Ok(_) => {
                debug!(
                    "Flagged {} conflict between {} and {}",
                    conflict.conflict_type.as_str(),
                    conflict.entry_a,
                    conflict.entry_b
                );
                Ok(true)
            }
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a conflict by id.
    pub fn get_conflict(&self, id: ConflictId) -> Result<Option<MemoryConflict>> {
        let conn = self.conn.lock().unwrap();
        get_conflict_tx(&conn, id)
    }

    /// List conflicts matching the filter, newest first.
    pub fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("{CONFLICT_COLUMNS_SQL} WHERE 1=1");
        let mut bound: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", bound.len() + 1));
            bound.push(Box::new(status.as_str()));
        }
        if let Some(ct) = filter.conflict_type {
            sql.push_str(&format!(" AND conflict_type = ?{}", bound.len() + 1));
            bound.push(Box::new(ct.as_str()));
        }
        sql.push_str(&format!(
            " ORDER BY detected_at DESC LIMIT ?{} OFFSET ?{}",
            bound.len() + 1,
            bound.len() + 2
        ));
        bound.push(Box::new(filter.limit as i64));
        bound.push(Box::new(filter.offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())))?;
        let mut conflicts = Vec::new();
        while let Some(row) = rows.next()? {
            conflicts.push(row_to_conflict(row)?);
        }
        Ok(conflicts)
    }

    /// The conflict recorded for a pair, if any. Order-insensitive.
    pub fn conflict_between(
        &self,
        a: EntryId,
        b: EntryId,
    ) -> Result<Option<MemoryConflict>> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{CONFLICT_COLUMNS_SQL} WHERE entry_a = ?1 AND entry_b = ?2"
        ))?;
        let mut rows = stmt.query(params![lo.to_string(), hi.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_conflict(row)?))
        } else {
            Ok(None)
        }
    }

    /// Pending conflicts involving an entry.
    pub fn pending_conflicts_for(&self, entry_id: EntryId) -> Result<Vec<MemoryConflict>> {
        let conn = self.conn.lock().unwrap();
        let id = entry_id.to_string();
        let mut stmt = conn.prepare(&format!(
            "{CONFLICT_COLUMNS_SQL}
             WHERE status = 'pending' AND (entry_a = ?1 OR entry_b = ?1)
             ORDER BY detected_at DESC"
        ))?;
        let mut rows = stmt.query(params![id])?;
        let mut conflicts = Vec::new();
        while let Some(row) = rows.next()? {
            conflicts.push(row_to_conflict(row)?);
        }
        Ok(conflicts)
    }

    /// Resolve a conflict in favor of one of its two entries.
    ///
    /// Fails if the conflict is already resolved or ignored, or if the
    /// winner is not part of the pair.
    pub fn resolve_conflict(
        &self,
        id: ConflictId,
        winner: EntryId,
        resolved_by: &str,
        note: Option<&str>,
    ) -> Result<MemoryConflict> {
        let conn = self.conn.lock().unwrap();
        let conflict = get_conflict_tx(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Conflict {}", id)))?;

        if conflict.status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "conflict {} is already {}",
                id,
                conflict.status.as_str()
            )));
        }
        if !conflict.involves(winner) {
            return Err(StoreError::InvalidData(format!(
                "entry {} is not part of conflict {}",
                winner, id
            )));
        }

        conn.execute(
            "UPDATE conflicts SET status = 'resolved', resolution_entry_id = ?2,
                    resolved_at = ?3, resolved_by = ?4, note = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                winner.to_string(),
                now().to_rfc3339(),
                resolved_by,
                note,
            ],
        )?;

        get_conflict_tx(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Conflict {}", id)))
    }

    /// Dismiss a conflict without picking a winner.
    pub fn ignore_conflict(
        &self,
        id: ConflictId,
        resolved_by: &str,
        note: Option<&str>,
    ) -> Result<MemoryConflict> {
        let conn = self.conn.lock().unwrap();
        let conflict = get_conflict_tx(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Conflict {}", id)))?;

        if conflict.status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "conflict {} is already {}",
                id,
                conflict.status.as_str()
            )));
        }

        conn.execute(
            "UPDATE conflicts SET status = 'ignored', resolved_at = ?2,
                    resolved_by = ?3, note = ?4
             WHERE id = ?1",
            params![id.to_string(), now().to_rfc3339(), resolved_by, note],
        )?;

        get_conflict_tx(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Conflict {}", id)))
    }

    /// Latest entries in the same tenant carrying the same claim key with a
    /// different value. This is the structural side of conflict detection.
    pub fn find_claim_mismatches(&self, entry_id: EntryId) -> Result<Vec<ClaimMismatch>> {
        let conn = self.conn.lock().unwrap();

        let claim: Option<(String, String, String)> = conn
            .query_row(
                "SELECT tenant_id, claim_key, claim_value FROM entries
                 WHERE id = ?1 AND claim_key IS NOT NULL AND claim_value IS NOT NULL",
                params![entry_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((tenant_id, claim_key, claim_value)) = claim else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT id, claim_value FROM entries
            WHERE tenant_id = ?1 AND claim_key = ?2 AND is_latest = 1
              AND id <> ?3 AND claim_value <> ?4
            "#,
        )?;
        let mut rows = stmt.query(params![
            tenant_id,
            claim_key,
            entry_id.to_string(),
            claim_value
        ])?;

        let mut mismatches = Vec::new();
        while let Some(row) = rows.next()? {
            let other_id: String = row.get(0)?;
            let other_value: String = row.get(1)?;
            mismatches.push(ClaimMismatch {
                other_id: EntryId::parse(&other_id)?,
                other_value,
            });
        }
        Ok(mismatches)
    }
}

const CONFLICT_COLUMNS_SQL: &str = r#"
    SELECT id, entry_a, entry_b, conflict_type, status, resolution_entry_id,
           detected_at, resolved_at, resolved_by, note
    FROM conflicts
"#;

fn get_conflict_tx(conn: &Connection, id: ConflictId) -> Result<Option<MemoryConflict>> {
    let mut stmt = conn.prepare(&format!("{CONFLICT_COLUMNS_SQL} WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id.to_string()])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row_to_conflict(row)?))
    } else {
        Ok(None)
    }
}

fn row_to_conflict(row: &rusqlite::Row) -> Result<MemoryConflict> {
    let id_str: String = row.get(0)?;
    let a_str: String = row.get(1)?;
    let b_str: String = row.get(2)?;
    let type_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let resolution_str: Option<String> = row.get(5)?;
    let detected_at_str: String = row.get(6)?;
    let resolved_at_str: Option<String> = row.get(7)?;
    let resolved_by: Option<String> = row.get(8)?;
    let note: Option<String> = row.get(9)?;

    let conflict_type = ConflictType::parse(&type_str)
        .ok_or_else(|| StoreError::InvalidData(format!("Unknown conflict type: {}", type_str)))?;
    let status = ConflictStatus::parse(&status_str)
        .ok_or_else(|| StoreError::InvalidData(format!("Unknown conflict status: {}", status_str)))?;

    Ok(MemoryConflict {
        id: ConflictId::parse(&id_str)?,
        entry_a: EntryId::parse(&a_str)?,
        entry_b: EntryId::parse(&b_str)?,
        conflict_type,
        status,
        resolution_entry_id: resolution_str.as_deref().map(EntryId::parse).transpose()?,
        detected_at: parse_timestamp(&detected_at_str)?,
        resolved_at: resolved_at_str.as_deref().map(parse_timestamp).transpose()?,
        resolved_by,
        note,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_types::{ContentType, MemoryEntry, Scope};

    fn create_test_store() -> MemoryStore {
        MemoryStore::open_in_memory(4).unwrap()
    }

    fn committed_entry(store: &MemoryStore, content: &str) -> MemoryEntry {
        let e = MemoryEntry::new(ContentType::Fact, content, 0.9, Scope::new("acme"));
        store.commit_entry(&e, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        e
    }

    #[test]
    fn test_insert_conflict_dedupes_pair() {
        let store = create_test_store();
        let a = committed_entry(&store, "a");
        let b = committed_entry(&store, "b");

        let c1 = MemoryConflict::between(a.id, b.id, ConflictType::ClaimMismatch);
        assert!(store.insert_conflict(&c1).unwrap());

        // Reversed pair and different type still collide on the canonical pair
        let c2 = MemoryConflict::between(b.id, a.id, ConflictType::SemanticContradiction);
        assert!(!store.insert_conflict(&c2).unwrap());
    }

    #[test]
    fn test_conflict_between_is_order_insensitive() {
        let store = create_test_store();
        let a = committed_entry(&store, "a");
        let b = committed_entry(&store, "b");

        assert!(store.conflict_between(a.id, b.id).unwrap().is_none());
        store
            .insert_conflict(&MemoryConflict::between(a.id, b.id, ConflictType::ClaimMismatch))
            .unwrap();
        assert!(store.conflict_between(a.id, b.id).unwrap().is_some());
        assert!(store.conflict_between(b.id, a.id).unwrap().is_some());
    }

    #[test]
    fn test_pending_conflicts_for_entry() {
        let store = create_test_store();
        let a = committed_entry(&store, "a");
        let b = committed_entry(&store, "b");
        let c = committed_entry(&store, "c");

        let ab = MemoryConflict::between(a.id, b.id, ConflictType::ClaimMismatch);
        let bc = MemoryConflict::between(b.id, c.id, ConflictType::SemanticContradiction);
        store.insert_conflict(&ab).unwrap();
        store.insert_conflict(&bc).unwrap();

        assert_eq!(store.pending_conflicts_for(b.id).unwrap().len(), 2);
        assert_eq!(store.pending_conflicts_for(a.id).unwrap().len(), 1);

        // Resolved conflicts drop out of the pending view
        store.resolve_conflict(ab.id, a.id, "reviewer", None).unwrap();
        let remaining = store.pending_conflicts_for(b.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, bc.id);
    }

    #[test]
    fn test_resolve_lifecycle() {
        let store = create_test_store();
        let a = committed_entry(&store, "a");
        let b = committed_entry(&store, "b");

        let conflict = MemoryConflict::between(a.id, b.id, ConflictType::ClaimMismatch);
        store.insert_conflict(&conflict).unwrap();

        let resolved = store
            .resolve_conflict(conflict.id, a.id, "moderator", Some("a is newer"))
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolution_entry_id, Some(a.id));
        assert_eq!(resolved.resolved_by.as_deref(), Some("moderator"));
        assert!(resolved.resolved_at.is_some());

        // Terminal: cannot resolve or ignore again
        assert!(store
            .resolve_conflict(conflict.id, b.id, "moderator", None)
            .is_err());
        assert!(store.ignore_conflict(conflict.id, "moderator", None).is_err());
    }

    #[test]
    fn test_resolve_rejects_outside_winner() {
        let store = create_test_store();
        let a = committed_entry(&store, "a");
        let b = committed_entry(&store, "b");
        let other = committed_entry(&store, "other");

        let conflict = MemoryConflict::between(a.id, b.id, ConflictType::ClaimMismatch);
        store.insert_conflict(&conflict).unwrap();

        let result = store.resolve_conflict(conflict.id, other.id, "moderator", None);
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_ignore_conflict() {
        let store = create_test_store();
        let a = committed_entry(&store, "a");
        let b = committed_entry(&store, "b");

        let conflict = MemoryConflict::between(a.id, b.id, ConflictType::SemanticContradiction);
        store.insert_conflict(&conflict).unwrap();

        let ignored = store
            .ignore_conflict(conflict.id, "moderator", Some("both true in context"))
            .unwrap();
        assert_eq!(ignored.status, ConflictStatus::Ignored);
        assert!(ignored.resolution_entry_id.is_none());
    }

    #[test]
    fn test_list_conflicts_filters() {
        let store = create_test_store();
        let a = committed_entry(&store, "a");
        let b = committed_entry(&store, "b");
        let c = committed_entry(&store, "c");

        store
            .insert_conflict(&MemoryConflict::between(a.id, b.id, ConflictType::ClaimMismatch))
            .unwrap();
        let semantic = MemoryConflict::between(a.id, c.id, ConflictType::SemanticContradiction);
        store.insert_conflict(&semantic).unwrap();
        store
            .resolve_conflict(semantic.id, a.id, "moderator", None)
            .unwrap();

        let all = store.list_conflicts(&ConflictFilter::new()).unwrap();
        assert_eq!(all.len(), 2);

        let pending = store
            .list_conflicts(&ConflictFilter::new().with_status(ConflictStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].conflict_type, ConflictType::ClaimMismatch);

        let semantic_only = store
            .list_conflicts(
                &ConflictFilter::new().with_type(ConflictType::SemanticContradiction),
            )
            .unwrap();
        assert_eq!(semantic_only.len(), 1);
    }

    #[test]
    fn test_find_claim_mismatches() {
        let store = create_test_store();

        let a = MemoryEntry::new(ContentType::Fact, "db is postgres", 0.9, Scope::new("acme"))
            .with_claim("primary_database", "postgres");
        store.commit_entry(&a, &[1.0, 0.0, 0.0, 0.0], None).unwrap();

        let agrees = MemoryEntry::new(ContentType::Fact, "also postgres", 0.9, Scope::new("acme"))
            .with_claim("primary_database", "postgres");
        store.commit_entry(&agrees, &[1.0, 0.0, 0.0, 0.0], None).unwrap();

        let disagrees = MemoryEntry::new(ContentType::Fact, "db is mysql", 0.9, Scope::new("acme"))
            .with_claim("primary_database", "mysql");
        store.commit_entry(&disagrees, &[1.0, 0.0, 0.0, 0.0], None).unwrap();

        let foreign = MemoryEntry::new(ContentType::Fact, "mysql", 0.9, Scope::new("globex"))
            .with_claim("primary_database", "mysql");
        store.commit_entry(&foreign, &[1.0, 0.0, 0.0, 0.0], None).unwrap();

        let mismatches = store.find_claim_mismatches(a.id).unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].other_id, disagrees.id);
        assert_eq!(mismatches[0].other_value, "mysql");

        // Entries without claims never mismatch
        let unclaimed = committed_entry(&store, "no claim");
        assert!(store.find_claim_mismatches(unclaimed.id).unwrap().is_empty());
    }
}
