//! Embedding storage and similarity search using sqlite-vec.

use relmem_types::EntryId;
use rusqlite::{Connection, params};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::Result;

/// Initialize the sqlite-vec extension.
///
/// Must be called before opening connections that use vector operations.
/// Registered via `sqlite3_auto_extension`, so it applies globally.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// Create the embeddings virtual table with cosine distance.
pub fn create_vector_table(conn: &Connection, dims: usize) -> Result<()> {
    let sql = format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS entry_embeddings USING vec0(
            entry_id TEXT PRIMARY KEY,
            embedding float[{dims}] distance_metric=cosine
        )
        "#
    );

    conn.execute_batch(&sql)?;

    info!("Created entry_embeddings table with {} dimensions", dims);
    Ok(())
}

/// Store an embedding for an entry, replacing any existing one.
pub fn store_embedding(conn: &Connection, entry_id: EntryId, embedding: &[f32]) -> Result<()> {
    // vec0 doesn't support INSERT OR REPLACE, so delete first
    conn.execute(
        "DELETE FROM entry_embeddings WHERE entry_id = ?1",
        params![entry_id.to_string()],
    )?;

    conn.execute(
        "INSERT INTO entry_embeddings (entry_id, embedding) VALUES (?1, ?2)",
        params![entry_id.to_string(), embedding.as_bytes()],
    )?;

    debug!("Stored embedding for entry {}", entry_id);
    Ok(())
}

/// Fetch the stored embedding for an entry.
pub fn get_embedding(conn: &Connection, entry_id: EntryId) -> Result<Option<Vec<f32>>> {
    use rusqlite::OptionalExtension;

    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT embedding FROM entry_embeddings WHERE entry_id = ?1",
            params![entry_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    // sqlite-vec stores float[] as packed little-endian f32
    Ok(blob.map(|bytes| {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }))
}

/// A raw similarity hit: entry id plus cosine distance.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub entry_id: EntryId,
    /// Cosine distance (lower = more similar; similarity = 1 - distance).
    pub distance: f32,
}

/// Top-k nearest entries to the query embedding.
pub fn search_similar(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<VectorHit>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT entry_id, distance
        FROM entry_embeddings
        WHERE embedding MATCH ?1
        ORDER BY distance
        LIMIT ?2
        "#,
    )?;

    let mut rows = stmt.query(params![query_embedding.as_bytes(), limit as i64])?;

    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let entry_id_str: String = row.get(0)?;
        let distance: f32 = row.get(1)?;
        results.push(VectorHit {
            entry_id: EntryId::parse(&entry_id_str)?,
            distance,
        });
    }

    debug!("Found {} similar entries (limit: {})", results.len(), limit);
    Ok(results)
}

/// Count of stored embeddings.
pub fn count_embeddings(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM entry_embeddings", [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}
