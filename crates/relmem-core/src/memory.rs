//! The assembled memory system.
//!
//! [`RelationalMemory`] wires the store, the write router, the hybrid
//! retriever, the version machinery, and the background enrichment
//! workers into one handle. It is the only type most embedders of this
//! crate need.

use std::sync::Arc;

use relmem_infer::{SharedEmbedder, SharedInference};
use relmem_store::{ConflictFilter, MemoryStore, ScopeFilter, StoreStats, VersionDiff};
use relmem_types::{
    ConflictId, EnrichmentJob, EnrichmentStatus, EntityTag, EntityType, EntryId, JobId,
    MemoryConflict, MemoryEntry,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RmcConfig;
use crate::conflicts::SemanticScanner;
use crate::error::{CoreError, Result};
use crate::retrieve::{HybridRetriever, RetrievalOptions, RetrievalResult};
use crate::router::{MemoryWrite, WriteRouter};
use crate::version::{VersionNode, VersionTree};
use crate::worker::EnrichmentWorkerPool;

pub struct RelationalMemory {
    store: Arc<MemoryStore>,
    config: RmcConfig,
    inference: Option<SharedInference>,
    router: WriteRouter,
    retriever: HybridRetriever,
    versions: VersionTree,
    pool: Option<EnrichmentWorkerPool>,
    scanner_token: CancellationToken,
    scanner_handle: Option<JoinHandle<()>>,
}

impl RelationalMemory {
    /// Assemble the system. Background work does not run until
    /// [`start`](Self::start) is called.
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: SharedEmbedder,
        inference: Option<SharedInference>,
        config: RmcConfig,
    ) -> Self {
        Self {
            router: WriteRouter::new(Arc::clone(&store), Arc::clone(&embedder)),
            retriever: HybridRetriever::new(Arc::clone(&store), Some(Arc::clone(&embedder)), &config),
            versions: VersionTree::new(Arc::clone(&store), embedder),
            pool: None,
            scanner_token: CancellationToken::new(),
            scanner_handle: None,
            inference,
            config,
            store,
        }
    }

    /// Start the enrichment workers and, when an inference backend is
    /// configured, the periodic semantic conflict scan.
    pub fn start(&mut self) {
        if self.pool.is_some() {
            return;
        }
        let mut pool =
            EnrichmentWorkerPool::new(Arc::clone(&self.store), self.inference.clone(), &self.config);
        pool.start();
        self.pool = Some(pool);

        match &self.inference {
            Some(inference) => {
                let scanner = Arc::new(SemanticScanner::new(
                    Arc::clone(&self.store),
                    Arc::clone(inference),
                    &self.config,
                ));
                self.scanner_handle = Some(scanner.spawn(self.scanner_token.clone()));
            }
            None => {
                info!("No inference backend, semantic conflict scanning disabled");
            }
        }
    }

    /// Stop background work, waiting for in-flight jobs.
    pub async fn shutdown(&mut self) {
        self.scanner_token.cancel();
        if let Some(handle) = self.scanner_handle.take() {
            if let Err(e) = handle.await {
                warn!("Semantic scanner task failed on shutdown: {e}");
            }
        }
        if let Some(mut pool) = self.pool.take() {
            pool.stop().await;
        }
    }

    // ─── Writes ─────────────────────────────────────────────────────────

    /// Commit a memory. Returns once the entry and its enrichment job are
    /// durable; enrichment itself runs in the background.
    pub async fn create(&self, write: MemoryWrite) -> Result<MemoryEntry> {
        self.router.commit(write).await
    }

    // ─── Reads ──────────────────────────────────────────────────────────

    /// Hybrid retrieval. Returned entries are recorded as accessed, which
    /// feeds their usage score.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: &ScopeFilter,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult> {
        let result = self.retriever.retrieve(query, filter, options).await?;
        for retrieved in &result.entries {
            self.store.touch_entry(retrieved.entry.id)?;
        }
        Ok(result)
    }

    /// Fetch one entry by id, recording the access.
    pub fn get(&self, id: EntryId) -> Result<MemoryEntry> {
        let entry = self
            .store
            .get_entry(id)?
            .ok_or_else(|| CoreError::NotFound(format!("entry {id}")))?;
        self.store.touch_entry(id)?;
        Ok(entry)
    }

    /// Page through the latest entries visible under a filter.
    pub fn list(&self, filter: &ScopeFilter, limit: usize, offset: usize) -> Result<Vec<MemoryEntry>> {
        Ok(self.store.list_latest(filter, limit, offset)?)
    }

    /// Freshness/usage score of an entry at this moment.
    pub fn score(&self, entry: &MemoryEntry) -> f32 {
        relmem_store::score_entry(entry, relmem_types::now(), &self.config.scoring.params())
    }

    /// The entry's current quality tier.
    pub fn quality(&self, entry: &MemoryEntry) -> relmem_store::QualityTier {
        relmem_store::QualityTier::from_score(self.score(entry))
    }

    // ─── Entities ───────────────────────────────────────────────────────

    /// Look up a deduplicated entity by surface name and type.
    pub fn find_entity(&self, name: &str, entity_type: EntityType) -> Result<Option<EntityTag>> {
        Ok(self.store.find_entity(name, entity_type)?)
    }

    /// Latest entries mentioning a named entity, within scope.
    pub fn entries_about(
        &self,
        name: &str,
        entity_type: EntityType,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        match self.store.find_entity(name, entity_type)? {
            Some(entity) => Ok(self.store.entries_for_entity(entity.id, filter, limit)?),
            None => Ok(Vec::new()),
        }
    }

    /// Most-mentioned entities across the store.
    pub fn hot_entities(&self, limit: usize) -> Result<Vec<EntityTag>> {
        Ok(self.store.hot_entities(limit)?)
    }

    // ─── Conflicts ──────────────────────────────────────────────────────

    pub fn conflicts(&self, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>> {
        Ok(self.store.list_conflicts(filter)?)
    }

    /// Unresolved conflicts a specific entry is party to.
    pub fn conflicts_for(&self, entry_id: EntryId) -> Result<Vec<MemoryConflict>> {
        Ok(self.store.pending_conflicts_for(entry_id)?)
    }

    /// Resolve a conflict in favor of one of its two entries.
    pub fn resolve_conflict(
        &self,
        id: ConflictId,
        winner: EntryId,
        resolved_by: &str,
        note: Option<&str>,
    ) -> Result<MemoryConflict> {
        Ok(self.store.resolve_conflict(id, winner, resolved_by, note)?)
    }

    /// Dismiss a conflict without picking a winner.
    pub fn ignore_conflict(
        &self,
        id: ConflictId,
        resolved_by: &str,
        note: Option<&str>,
    ) -> Result<MemoryConflict> {
        Ok(self.store.ignore_conflict(id, resolved_by, note)?)
    }

    // ─── Versions ───────────────────────────────────────────────────────

    pub fn history(&self, root_id: EntryId) -> Result<Vec<MemoryEntry>> {
        self.versions.history(root_id)
    }

    pub fn version_tree(&self, root_id: EntryId) -> Result<VersionNode> {
        self.versions.tree(root_id)
    }

    pub fn compare_versions(&self, left: EntryId, right: EntryId) -> Result<Vec<VersionDiff>> {
        self.versions.compare(left, right)
    }

    pub async fn rollback(
        &self,
        root_id: EntryId,
        target: EntryId,
        actor: &str,
    ) -> Result<MemoryEntry> {
        self.versions.rollback(root_id, target, actor).await
    }

    // ─── Enrichment visibility ──────────────────────────────────────────

    /// Observable enrichment state of an entry.
    pub fn enrichment_status(&self, entry_id: EntryId) -> Result<EnrichmentStatus> {
        let job = self
            .store
            .job_for_entry(entry_id)?
            .ok_or_else(|| CoreError::NotFound(format!("no enrichment job for entry {entry_id}")))?;
        Ok(EnrichmentStatus::from_job(&job))
    }

    /// Jobs that exhausted their retries.
    pub fn dead_letter_jobs(&self, limit: usize) -> Result<Vec<EnrichmentJob>> {
        Ok(self.store.dead_letter_jobs(limit)?)
    }

    /// Requeue a dead-lettered job with a fresh attempt budget.
    pub fn retry_job(&self, id: JobId) -> Result<()> {
        Ok(self.store.retry_job(id)?)
    }

    // ─── Introspection ──────────────────────────────────────────────────

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}
