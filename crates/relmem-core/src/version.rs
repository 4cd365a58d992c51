//! Version lineage: history, tree, diff, rollback.
//!
//! Rollback never rewrites history. Rolling back to an earlier version
//! creates a fresh entry carrying that version's content, parented on the
//! current latest, so the lineage keeps a full record of the detour and
//! the return. The rolled-back entry is re-embedded and re-enriched like
//! any other write.

use std::sync::Arc;

use relmem_infer::SharedEmbedder;
use relmem_store::{MemoryStore, VersionDiff};
use relmem_types::{EnrichmentJob, EntryId, JobPriority, MemoryEntry};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CoreError, Result};

/// One node in a rendered version tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionNode {
    pub entry: MemoryEntry,
    pub children: Vec<VersionNode>,
}

pub struct VersionTree {
    store: Arc<MemoryStore>,
    embedder: SharedEmbedder,
}

impl VersionTree {
    pub fn new(store: Arc<MemoryStore>, embedder: SharedEmbedder) -> Self {
        Self { store, embedder }
    }

    /// All versions of a lineage in creation order.
    pub fn history(&self, root_id: EntryId) -> Result<Vec<MemoryEntry>> {
        let versions = self.store.versions_for_root(root_id)?;
        if versions.is_empty() {
            return Err(CoreError::NotFound(format!("lineage {root_id}")));
        }
        Ok(versions)
    }

    /// The lineage as a parent/child tree rooted at the original entry.
    pub fn tree(&self, root_id: EntryId) -> Result<VersionNode> {
        let root = self
            .store
            .get_entry(root_id)?
            .filter(|e| e.id == e.root_id)
            .ok_or_else(|| CoreError::NotFound(format!("lineage root {root_id}")))?;
        self.build_node(root)
    }

    fn build_node(&self, entry: MemoryEntry) -> Result<VersionNode> {
        let mut children = Vec::new();
        for child in self.store.children_of(entry.id)? {
            children.push(self.build_node(child)?);
        }
        Ok(VersionNode { entry, children })
    }

    /// Field-level differences between two versions of the same lineage.
    pub fn compare(&self, left: EntryId, right: EntryId) -> Result<Vec<VersionDiff>> {
        Ok(self.store.compare_versions(left, right)?)
    }

    /// Roll a lineage back to an earlier version's content.
    pub async fn rollback(
        &self,
        root_id: EntryId,
        target: EntryId,
        actor: &str,
    ) -> Result<MemoryEntry> {
        let target_entry = self
            .store
            .get_entry(target)?
            .ok_or_else(|| CoreError::NotFound(format!("version {target}")))?;
        if target_entry.root_id != root_id {
            return Err(CoreError::Validation(format!(
                "version {target} does not belong to lineage {root_id}"
            )));
        }

        let latest = self
            .store
            .latest_for_root(root_id)?
            .ok_or_else(|| CoreError::NotFound(format!("lineage {root_id}")))?;
        if latest.id == target {
            return Err(CoreError::Validation(
                "target is already the latest version".into(),
            ));
        }

        let mut restored =
            MemoryEntry::new_version(&latest, target_entry.content.clone(), target_entry.confidence);
        restored.claim_key = target_entry.claim_key.clone();
        restored.claim_value = target_entry.claim_value.clone();
        restored.created_by = actor.to_string();

        let embedding = self.embedder.embed(&restored.content).await?;
        let job = EnrichmentJob::new(restored.id, JobPriority::Normal);
        self.store.commit_entry(&restored, &embedding, Some(&job))?;

        info!(
            root_id = %root_id,
            target = %target,
            restored = %restored.id,
            "Rolled lineage back"
        );
        Ok(restored)
    }
}
