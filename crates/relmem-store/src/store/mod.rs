//! Store implementation using SQLite.
//!
//! Provides the durable tables behind the relational memory core and the
//! composite operations that must be atomic: versioned entry insertion with
//! its `is_latest` flip and the enrichment-job publish that rides in the
//! same transaction.

mod conflict_ops;
mod entity_ops;
mod entry_ops;
mod job_ops;
pub mod query;
mod relation_ops;
mod version_ops;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use crate::error::{Result, StoreError};

pub use query::{ClaimMismatch, ConflictFilter, ScopeFilter, SimilarEntry, StoreStats, VersionDiff};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// The store backing the relational memory core.
///
/// Uses WAL mode for concurrent read performance. The embedding
/// dimensionality is fixed at open time and recorded in the meta table;
/// reopening with a different dimensionality is rejected.
pub struct MemoryStore {
    /// The SQLite connection (wrapped in Mutex for thread safety).
    pub(crate) conn: Mutex<Connection>,
    /// Embedding dimensionality for the vec0 table.
    dims: usize,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Open or create a store at the given path.
    ///
    /// `dims` is the embedding dimensionality; it must match the embedder
    /// in use and, for an existing database, the recorded dimensionality.
    pub fn open(path: impl AsRef<Path>, dims: usize) -> Result<Self> {
        crate::vector::init_vector_extension();

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|_| {
                    StoreError::Database(rusqlite::Error::InvalidPath(path.to_path_buf()))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            dims,
        };
        store.initialize()?;

        info!("Memory store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory(dims: usize) -> Result<Self> {
        crate::vector::init_vector_extension();

        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            dims,
        };
        store.initialize()?;

        debug!("In-memory store created");
        Ok(store)
    }

    /// Embedding dimensionality this store was opened with.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Initialize pragmas, schema, and the vector table.
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        self.create_schema(&conn)?;
        crate::vector::create_vector_table(&conn, self.dims)?;

        // Record and verify embedding dimensionality
        let recorded: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'embedding.dimensions'",
                [],
                |row| row.get(0),
            )
            .ok();
        match recorded.and_then(|s| s.parse::<usize>().ok()) {
            Some(stored) if stored != self.dims => {
                return Err(StoreError::InvalidData(format!(
                    "store has {}-dim embeddings, opened with {}",
                    stored, self.dims
                )));
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.dimensions', ?1)",
                    params![self.dims.to_string()],
                )?;
            }
        }

        Ok(())
    }

    /// Create the database schema.
    fn create_schema(&self, conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        conn.execute_batch(
            r#"
            -- Entries: the unit of knowledge, with version lineage
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                tenant_id TEXT NOT NULL,
                department TEXT,
                role TEXT,
                claim_key TEXT,
                claim_value TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT NOT NULL,
                parent_id TEXT REFERENCES entries(id),
                root_id TEXT NOT NULL,
                is_latest INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_entries_tenant
                ON entries(tenant_id, is_latest);

            CREATE INDEX IF NOT EXISTS idx_entries_claim
                ON entries(tenant_id, claim_key) WHERE claim_key IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_entries_root
                ON entries(root_id);

            -- Exactly one latest version per lineage
            CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_latest_per_root
                ON entries(root_id) WHERE is_latest = 1;

            -- Entities: deduplicated on (normalized_name, entity_type)
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                mention_count INTEGER NOT NULL DEFAULT 1,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (normalized_name, entity_type)
            );

            CREATE INDEX IF NOT EXISTS idx_entities_mentions
                ON entities(mention_count DESC);

            -- Entry <-> entity links
            CREATE TABLE IF NOT EXISTS entry_entities (
                entry_id TEXT NOT NULL REFERENCES entries(id),
                entity_id TEXT NOT NULL REFERENCES entities(id),
                PRIMARY KEY (entry_id, entity_id)
            );

            CREATE INDEX IF NOT EXISTS idx_entry_entities_entity
                ON entry_entities(entity_id);

            -- Relations: directed typed edges, unique triple, no self-loops
            CREATE TABLE IF NOT EXISTS relations (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES entries(id),
                target_id TEXT NOT NULL REFERENCES entries(id),
                relation_type TEXT NOT NULL,
                strength REAL NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (source_id, target_id, relation_type),
                CHECK (source_id <> target_id)
            );

            CREATE INDEX IF NOT EXISTS idx_relations_source
                ON relations(source_id);

            CREATE INDEX IF NOT EXISTS idx_relations_type_strength
                ON relations(relation_type, strength);

            -- Conflicts: canonical ordered pair, unique
            CREATE TABLE IF NOT EXISTS conflicts (
                id TEXT PRIMARY KEY,
                entry_a TEXT NOT NULL REFERENCES entries(id),
                entry_b TEXT NOT NULL REFERENCES entries(id),
                conflict_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                resolution_entry_id TEXT,
                detected_at TEXT NOT NULL,
                resolved_at TEXT,
                resolved_by TEXT,
                note TEXT,
                UNIQUE (entry_a, entry_b),
                CHECK (entry_a < entry_b)
            );

            CREATE INDEX IF NOT EXISTS idx_conflicts_status
                ON conflicts(status);

            -- Jobs: the durable enrichment queue
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                entry_id TEXT NOT NULL REFERENCES entries(id),
                priority INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                next_run_at TEXT NOT NULL,
                last_error TEXT,
                entities_done INTEGER NOT NULL DEFAULT 0,
                relations_done INTEGER NOT NULL DEFAULT 0,
                conflicts_done INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_claim
                ON jobs(status, next_run_at, priority);

            CREATE INDEX IF NOT EXISTS idx_jobs_entry
                ON jobs(entry_id);

            -- Schema metadata
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Execute a function within a transaction.
    ///
    /// All operations within the closure are executed atomically; an error
    /// rolls everything back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            // Transaction rolls back when dropped
            Err(e) => Err(e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Operations
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Get a metadata value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Set a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Database statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            entry_count: count("SELECT COUNT(*) FROM entries")?,
            entity_count: count("SELECT COUNT(*) FROM entities")?,
            relation_count: count("SELECT COUNT(*) FROM relations")?,
            conflict_count: count("SELECT COUNT(*) FROM conflicts")?,
            pending_job_count: count(
                "SELECT COUNT(*) FROM jobs WHERE status IN ('pending', 'failed')",
            )?,
            embedding_count: crate::vector::count_embeddings(&conn).unwrap_or(0),
            schema_version: SCHEMA_VERSION,
            embedding_dimensions: self.dims,
        })
    }
}
