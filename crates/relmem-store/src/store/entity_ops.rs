//! Entity operations: deduplicated mention recording and lookups.

use relmem_types::{EntityId, EntityMention, EntityTag, EntityType, EntryId, MemoryEntry};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{Result, StoreError};

use super::MemoryStore;
use super::entry_ops::{ENTRY_COLUMNS_SQL, parse_timestamp, row_to_entry};
use super::query::ScopeFilter;

impl MemoryStore {
    /// Record that an entry mentions an entity.
    ///
    /// Entities deduplicate on (normalized name, type). The mention count
    /// only grows when a new entry/entity link is created, so re-running
    /// extraction on the same entry never inflates it.
    pub fn record_mention(&self, entry_id: EntryId, mention: &EntityMention) -> Result<EntityTag> {
        let conn = self.conn.lock().unwrap();

        let normalized = mention.normalized_name();
        let candidate = EntityTag::new(&mention.name, mention.entity_type, mention.confidence);

        let inserted_entity = conn.execute(
            r#"
            INSERT OR IGNORE INTO entities
                (id, name, normalized_name, entity_type, mention_count, confidence, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)
            "#,
            params![
                candidate.id.to_string(),
                candidate.name,
                normalized,
                candidate.entity_type.as_str(),
                candidate.confidence,
                candidate.created_at.to_rfc3339(),
            ],
        )? == 1;

        let entity_id: String = conn.query_row(
            "SELECT id FROM entities WHERE normalized_name = ?1 AND entity_type = ?2",
            params![normalized, mention.entity_type.as_str()],
            |row| row.get(0),
        )?;

        let linked = conn.execute(
            "INSERT OR IGNORE INTO entry_entities (entry_id, entity_id) VALUES (?1, ?2)",
            params![entry_id.to_string(), entity_id],
        )? == 1;

        if linked && !inserted_entity {
            conn.execute(
                "UPDATE entities SET mention_count = mention_count + 1,
                        confidence = MAX(confidence, ?2)
                 WHERE id = ?1",
                params![entity_id, mention.confidence],
            )?;
        }

        if linked {
            debug!("Linked entry {} to entity {:?}", entry_id, mention.name);
        }

        get_entity_tx(&conn, EntityId::parse(&entity_id)?)?
            .ok_or_else(|| StoreError::NotFound(format!("Entity {}", entity_id)))
    }

    /// Get an entity by id.
    pub fn get_entity(&self, id: EntityId) -> Result<Option<EntityTag>> {
        let conn = self.conn.lock().unwrap();
        get_entity_tx(&conn, id)
    }

    /// Look up an entity by name and type. The name is normalized first.
    pub fn find_entity(&self, name: &str, entity_type: EntityType) -> Result<Option<EntityTag>> {
        let conn = self.conn.lock().unwrap();
        let normalized = relmem_types::normalize_entity_name(name);
        conn.query_row(
            &format!("{ENTITY_COLUMNS_SQL} WHERE normalized_name = ?1 AND entity_type = ?2"),
            params![normalized, entity_type.as_str()],
            row_to_entity,
        )
        .optional()
        .map_err(StoreError::from)?
        .transpose()
    }

    /// Entities mentioned by an entry.
    pub fn entities_for_entry(&self, entry_id: EntryId) -> Result<Vec<EntityTag>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTITY_COLUMNS_SQL}
             JOIN entry_entities ee ON ee.entity_id = entities.id
             WHERE ee.entry_id = ?1
             ORDER BY entities.mention_count DESC"
        ))?;
        let rows = stmt.query_map(params![entry_id.to_string()], row_to_entity)?;
        collect(rows)
    }

    /// Latest entries that mention an entity, visible under the filter.
    pub fn entries_for_entity(
        &self,
        entity_id: EntityId,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTRY_COLUMNS_SQL}
             JOIN entry_entities ee ON ee.entry_id = entries.id
             WHERE ee.entity_id = ?1 AND entries.tenant_id = ?2 AND entries.is_latest = 1
             ORDER BY entries.created_at DESC"
        ))?;

        let mut rows = stmt.query(params![entity_id.to_string(), filter.tenant_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let entry = row_to_entry(row)?;
            if filter.allows(&entry.scope) {
                entries.push(entry);
                if entries.len() == limit {
                    break;
                }
            }
        }
        Ok(entries)
    }

    /// Most-mentioned entities across the store.
    pub fn hot_entities(&self, limit: usize) -> Result<Vec<EntityTag>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ENTITY_COLUMNS_SQL} ORDER BY mention_count DESC, created_at ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_entity)?;
        collect(rows)
    }

    /// Number of entities two entries share.
    pub fn entity_overlap_count(&self, a: EntryId, b: EntryId) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM entry_entities ea
            JOIN entry_entities eb ON ea.entity_id = eb.entity_id
            WHERE ea.entry_id = ?1 AND eb.entry_id = ?2
            "#,
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Entry ids that share at least one entity with the given entry,
    /// restricted to latest entries in the same tenant.
    pub fn entries_sharing_entities(
        &self,
        entry_id: EntryId,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<EntryId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT other.entry_id, COUNT(*) AS shared
            FROM entry_entities mine
            JOIN entry_entities other ON other.entity_id = mine.entity_id
            JOIN entries e ON e.id = other.entry_id
            WHERE mine.entry_id = ?1
              AND other.entry_id <> ?1
              AND e.tenant_id = ?2
              AND e.is_latest = 1
            GROUP BY other.entry_id
            ORDER BY shared DESC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![entry_id.to_string(), tenant_id, limit as i64],
            |row| row.get::<_, String>(0),
        )?;

        let mut ids = Vec::new();
        for id_str in rows {
            ids.push(EntryId::parse(&id_str?)?);
        }
        Ok(ids)
    }
}

const ENTITY_COLUMNS_SQL: &str = r#"
    SELECT entities.id, entities.name, entities.normalized_name, entities.entity_type,
           entities.mention_count, entities.confidence, entities.created_at
    FROM entities
"#;

fn get_entity_tx(conn: &Connection, id: EntityId) -> Result<Option<EntityTag>> {
    conn.query_row(
        &format!("{ENTITY_COLUMNS_SQL} WHERE entities.id = ?1"),
        params![id.to_string()],
        row_to_entity,
    )
    .optional()
    .map_err(StoreError::from)?
    .transpose()
}

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Result<EntityTag>> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let normalized_name: String = row.get(2)?;
    let entity_type_str: String = row.get(3)?;
    let mention_count: u32 = row.get(4)?;
    let confidence: f32 = row.get(5)?;
    let created_at_str: String = row.get(6)?;

    Ok(build_entity(
        id_str,
        name,
        normalized_name,
        entity_type_str,
        mention_count,
        confidence,
        created_at_str,
    ))
}

fn build_entity(
    id_str: String,
    name: String,
    normalized_name: String,
    entity_type_str: String,
    mention_count: u32,
    confidence: f32,
    created_at_str: String,
) -> Result<EntityTag> {
    let entity_type = EntityType::parse(&entity_type_str).ok_or_else(|| {
        StoreError::InvalidData(format!("Unknown entity type: {}", entity_type_str))
    })?;
    Ok(EntityTag {
        id: EntityId::parse(&id_str)?,
        name,
        normalized_name,
        entity_type,
        mention_count,
        confidence,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<Result<EntityTag>>>,
) -> Result<Vec<EntityTag>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}
