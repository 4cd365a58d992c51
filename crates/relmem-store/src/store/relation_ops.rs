//! Relation operations: typed directed edges between entries.

use relmem_types::{EntryId, MemoryRelation, RelationId, RelationType};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::error::{Result, StoreError, is_unique_violation};

use super::MemoryStore;
use super::entry_ops::parse_timestamp;

impl MemoryStore {
    /// Insert a relation edge.
    ///
    /// Returns `Ok(false)` when the (source, target, type) triple already
    /// exists, so enrichment re-runs are idempotent. Self-loops are
    /// rejected outright.
    pub fn insert_relation(&self, relation: &MemoryRelation) -> Result<bool> {
        if relation.source_id == relation.target_id {
            return Err(StoreError::SelfLoop(relation.source_id.to_string()));
        }

        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            r#"
            INSERT INTO relations (id, source_id, target_id, relation_type, strength, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                relation.id.to_string(),
                relation.source_id.to_string(),
                relation.target_id.to_string(),
                relation.relation_type.as_str(),
                relation.strength,
                relation.reason,
                relation.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {
                debug!(
                    "Stored {} relation {} -> {}",
                    relation.relation_type.as_str(),
                    relation.source_id,
                    relation.target_id
                );
                Ok(true)
            }
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Outgoing relations from an entry, optionally filtered by type.
    pub fn relations_from(
        &self,
        source_id: EntryId,
        relation_type: Option<RelationType>,
    ) -> Result<Vec<MemoryRelation>> {
        let conn = self.conn.lock().unwrap();
        match relation_type {
            Some(rt) => query_relations(
                &conn,
                &format!("{RELATION_COLUMNS_SQL} WHERE source_id = ?1 AND relation_type = ?2"),
                params![source_id.to_string(), rt.as_str()],
            ),
            None => query_relations(
                &conn,
                &format!("{RELATION_COLUMNS_SQL} WHERE source_id = ?1"),
                params![source_id.to_string()],
            ),
        }
    }

    /// All relations touching an entry, in either direction. This is the
    /// edge set graph expansion walks.
    pub fn relations_touching(&self, id: EntryId) -> Result<Vec<MemoryRelation>> {
        let conn = self.conn.lock().unwrap();
        query_relations(
            &conn,
            &format!("{RELATION_COLUMNS_SQL} WHERE source_id = ?1 OR target_id = ?1"),
            params![id.to_string()],
        )
    }

}

const RELATION_COLUMNS_SQL: &str = r#"
    SELECT id, source_id, target_id, relation_type, strength, reason, created_at
    FROM relations
"#;

fn query_relations(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MemoryRelation>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut relations = Vec::new();
    while let Some(row) = rows.next()? {
        relations.push(row_to_relation(row)?);
    }
    Ok(relations)
}

fn row_to_relation(row: &rusqlite::Row) -> Result<MemoryRelation> {
    let id_str: String = row.get(0)?;
    let source_str: String = row.get(1)?;
    let target_str: String = row.get(2)?;
    let type_str: String = row.get(3)?;
    let strength: f32 = row.get(4)?;
    let reason: Option<String> = row.get(5)?;
    let created_at_str: String = row.get(6)?;

    let relation_type = RelationType::parse(&type_str)
        .ok_or_else(|| StoreError::InvalidData(format!("Unknown relation type: {}", type_str)))?;

    Ok(MemoryRelation {
        id: RelationId::parse(&id_str)?,
        source_id: EntryId::parse(&source_str)?,
        target_id: EntryId::parse(&target_str)?,
        relation_type,
        strength,
        reason,
        created_at: parse_timestamp(&created_at_str)?,
    })
}
