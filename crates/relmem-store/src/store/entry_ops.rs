//! Entry operations: versioned insertion, lookup, usage tracking, search.

use chrono::{DateTime, Utc};
use relmem_types::{
    ContentType, EnrichmentJob, EntryId, MemoryEntry, Scope, now,
};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::error::{Result, StoreError};

use super::query::{ScopeFilter, SimilarEntry};
use super::MemoryStore;

/// Insert an entry row (no embedding, no job). Transaction-composable.
pub(crate) fn insert_entry_tx(conn: &Connection, entry: &MemoryEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO entries (id, content, content_type, confidence, tenant_id, department, role,
                             claim_key, claim_value, created_at, created_by, access_count,
                             last_accessed, parent_id, root_id, is_latest)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            entry.id.to_string(),
            entry.content,
            entry.content_type.as_str(),
            entry.confidence,
            entry.scope.tenant_id,
            entry.scope.department,
            entry.scope.role,
            entry.claim_key,
            entry.claim_value,
            entry.created_at.to_rfc3339(),
            entry.created_by,
            entry.access_count,
            entry.last_accessed.to_rfc3339(),
            entry.parent_id.map(|id| id.to_string()),
            entry.root_id.to_string(),
            entry.is_latest as i32,
        ],
    )?;
    Ok(())
}

/// Mark an entry as superseded. Transaction-composable.
pub(crate) fn clear_latest_tx(conn: &Connection, id: EntryId) -> Result<()> {
    let rows = conn.execute(
        "UPDATE entries SET is_latest = 0 WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(StoreError::NotFound(format!("Entry {}", id)));
    }
    Ok(())
}

impl MemoryStore {
    /// Persist a new entry atomically with its embedding and enrichment job.
    ///
    /// If the entry has a parent, the parent's `is_latest` flips to false in
    /// the same transaction; the parent must currently be the latest version
    /// of its lineage. Job publish rides in the transaction too, so a failed
    /// publish rolls the entry back rather than leaving it silently
    /// un-enriched.
    pub fn commit_entry(
        &self,
        entry: &MemoryEntry,
        embedding: &[f32],
        job: Option<&EnrichmentJob>,
    ) -> Result<()> {
        if embedding.len() != self.dims() {
            return Err(StoreError::InvalidData(format!(
                "embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.dims()
            )));
        }

        self.with_transaction(|conn| {
            if let Some(parent_id) = entry.parent_id {
                let parent = get_entry_tx(conn, parent_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("Parent entry {}", parent_id)))?;
                if !parent.is_latest {
                    return Err(StoreError::InvalidState(format!(
                        "parent {} is not the latest version of its lineage",
                        parent_id
                    )));
                }
                if parent.root_id != entry.root_id {
                    return Err(StoreError::InvalidData(
                        "entry root does not match its parent's root".into(),
                    ));
                }
                // Clear before insert so the one-latest-per-root index holds
                clear_latest_tx(conn, parent_id)?;
            }

            insert_entry_tx(conn, entry)?;
            crate::vector::store_embedding(conn, entry.id, embedding)?;

            if let Some(job) = job {
                super::job_ops::insert_job_tx(conn, job)?;
            }

            Ok(())
        })?;

        debug!("Committed entry {} (root {})", entry.id, entry.root_id);
        Ok(())
    }

    /// Insert a bare entry row. Test and tooling convenience; production
    /// writes go through [`MemoryStore::commit_entry`].
    pub fn insert_entry(&self, entry: &MemoryEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_entry_tx(&conn, entry)
    }

    /// Get an entry by id.
    pub fn get_entry(&self, id: EntryId) -> Result<Option<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        get_entry_tx(&conn, id)
    }

    /// Record an access: bumps the usage counter and timestamp.
    pub fn touch_entry(&self, id: EntryId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE entries SET access_count = access_count + 1, last_accessed = ?2 WHERE id = ?1",
            params![id.to_string(), now().to_rfc3339()],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Entry {}", id)));
        }
        Ok(())
    }

    /// List latest entries visible under the filter, newest first.
    pub fn list_latest(
        &self,
        filter: &ScopeFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTRY_COLUMNS_SQL} WHERE tenant_id = ?1 AND is_latest = 1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        ))?;

        let mut rows = stmt.query(params![filter.tenant_id, limit as i64, offset as i64])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let entry = row_to_entry(row)?;
            if filter.allows(&entry.scope) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// The stored embedding for an entry.
    pub fn embedding_for(&self, id: EntryId) -> Result<Option<Vec<f32>>> {
        let conn = self.conn.lock().unwrap();
        crate::vector::get_embedding(&conn, id)
    }

    /// Latest entries in a tenant carrying a claim key, regardless of value.
    pub fn latest_with_claim_key(
        &self,
        tenant_id: &str,
        claim_key: &str,
    ) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTRY_COLUMNS_SQL} WHERE tenant_id = ?1 AND claim_key = ?2 AND is_latest = 1
             ORDER BY created_at DESC"
        ))?;
        let mut rows = stmt.query(params![tenant_id, claim_key])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }

    /// Latest entries with at least `min_access_count` accesses, most used
    /// first. Score-based filtering happens in the caller, where decay can
    /// be computed against the current clock.
    pub fn frequently_used(
        &self,
        min_access_count: u32,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTRY_COLUMNS_SQL} WHERE is_latest = 1 AND access_count >= ?1
             ORDER BY access_count DESC, created_at DESC LIMIT ?2"
        ))?;
        let mut rows = stmt.query(params![min_access_count, limit as i64])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }

    /// Top-k latest entries by cosine similarity, respecting the filter.
    ///
    /// Over-fetches from the vector index because superseded and
    /// out-of-scope entries are dropped after the fact.
    pub fn search_similar_entries(
        &self,
        query_embedding: &[f32],
        filter: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<SimilarEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();

        let hits = crate::vector::search_similar(&conn, query_embedding, k * 4)?;

        let mut results = Vec::new();
        for hit in hits {
            let Some(entry) = get_entry_tx(&conn, hit.entry_id)? else {
                continue;
            };
            if !entry.is_latest || !filter.allows(&entry.scope) {
                continue;
            }
            results.push(SimilarEntry {
                entry,
                similarity: 1.0 - hit.distance,
            });
            if results.len() == k {
                break;
            }
        }
        Ok(results)
    }
}

/// Columns in the order `row_to_entry` expects.
pub(crate) const ENTRY_COLUMNS_SQL: &str = r#"
    SELECT id, content, content_type, confidence, tenant_id, department, role,
           claim_key, claim_value, created_at, created_by, access_count,
           last_accessed, parent_id, root_id, is_latest
    FROM entries
"#;

pub(crate) fn get_entry_tx(conn: &Connection, id: EntryId) -> Result<Option<MemoryEntry>> {
    let mut stmt = conn.prepare(&format!("{ENTRY_COLUMNS_SQL} WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id.to_string()])?;

    if let Some(row) = rows.next()? {
        Ok(Some(row_to_entry(row)?))
    } else {
        Ok(None)
    }
}

/// Convert a database row to a MemoryEntry.
pub(crate) fn row_to_entry(row: &rusqlite::Row) -> Result<MemoryEntry> {
    let id_str: String = row.get(0)?;
    let content: String = row.get(1)?;
    let content_type_str: String = row.get(2)?;
    let confidence: f32 = row.get(3)?;
    let tenant_id: String = row.get(4)?;
    let department: Option<String> = row.get(5)?;
    let role: Option<String> = row.get(6)?;
    let claim_key: Option<String> = row.get(7)?;
    let claim_value: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let created_by: String = row.get(10)?;
    let access_count: u32 = row.get(11)?;
    let last_accessed_str: String = row.get(12)?;
    let parent_id_str: Option<String> = row.get(13)?;
    let root_id_str: String = row.get(14)?;
    let is_latest_int: i32 = row.get(15)?;

    let content_type = ContentType::parse(&content_type_str).ok_or_else(|| {
        StoreError::InvalidData(format!("Unknown content type: {}", content_type_str))
    })?;

    Ok(MemoryEntry {
        id: EntryId::parse(&id_str)?,
        content,
        content_type,
        confidence,
        scope: Scope {
            tenant_id,
            department,
            role,
        },
        claim_key,
        claim_value,
        created_at: parse_timestamp(&created_at_str)?,
        created_by,
        access_count,
        last_accessed: parse_timestamp(&last_accessed_str)?,
        parent_id: parent_id_str.as_deref().map(EntryId::parse).transpose()?,
        root_id: EntryId::parse(&root_id_str)?,
        is_latest: is_latest_int != 0,
    })
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad timestamp {s:?}: {e}")))
}
