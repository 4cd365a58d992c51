//! Write path: validate, embed, commit.
//!
//! A write returns as soon as the entry and its enrichment job are
//! committed in one transaction. Entity extraction, relation inference,
//! and conflict detection all happen later, driven by the job.

use std::sync::Arc;

use relmem_infer::SharedEmbedder;
use relmem_store::MemoryStore;
use relmem_types::{ContentType, EnrichmentJob, EntryId, JobPriority, MemoryEntry, Scope};
use tracing::info;

use crate::error::{CoreError, Result};

/// A validated-on-commit write request.
#[derive(Debug, Clone)]
pub struct MemoryWrite {
    pub content: String,
    pub content_type: ContentType,
    pub confidence: f32,
    pub scope: Scope,
    /// Structured claim, key and value together.
    pub claim: Option<(String, String)>,
    /// Writing agent identifier.
    pub agent: Option<String>,
    /// Set to revise an existing entry; the new entry joins its lineage.
    pub parent: Option<EntryId>,
    pub priority: JobPriority,
}

impl MemoryWrite {
    pub fn new(content_type: ContentType, content: impl Into<String>, confidence: f32, scope: Scope) -> Self {
        Self {
            content: content.into(),
            content_type,
            confidence,
            scope,
            claim: None,
            agent: None,
            parent: None,
            priority: JobPriority::Normal,
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claim = Some((key.into(), value.into()));
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn revising(mut self, parent: EntryId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }
}

pub struct WriteRouter {
    store: Arc<MemoryStore>,
    embedder: SharedEmbedder,
}

impl WriteRouter {
    pub fn new(store: Arc<MemoryStore>, embedder: SharedEmbedder) -> Self {
        Self { store, embedder }
    }

    /// Commit a write. The entry, its embedding, and its enrichment job
    /// land in a single transaction; the entry comes back immediately.
    pub async fn commit(&self, write: MemoryWrite) -> Result<MemoryEntry> {
        self.validate(&write)?;

        let entry = self.build_entry(&write)?;
        let embedding = self.embedder.embed(&entry.content).await?;

        let job = EnrichmentJob::new(entry.id, write.priority);
        self.store.commit_entry(&entry, &embedding, Some(&job))?;

        info!(
            entry_id = %entry.id,
            job_id = %job.id,
            content_type = entry.content_type.as_str(),
            "Committed memory entry"
        );
        Ok(entry)
    }

    fn validate(&self, write: &MemoryWrite) -> Result<()> {
        if write.content.trim().is_empty() {
            return Err(CoreError::Validation("content must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&write.confidence) {
            return Err(CoreError::Validation(format!(
                "confidence must be in [0, 1], got {}",
                write.confidence
            )));
        }
        if write.scope.tenant_id.trim().is_empty() {
            return Err(CoreError::Validation("tenant_id must not be empty".into()));
        }
        if let Some((key, value)) = &write.claim {
            if key.trim().is_empty() || value.trim().is_empty() {
                return Err(CoreError::Validation(
                    "claim key and value must both be non-empty".into(),
                ));
            }
        }
        Ok(())
    }

    fn build_entry(&self, write: &MemoryWrite) -> Result<MemoryEntry> {
        let mut entry = match write.parent {
            Some(parent_id) => {
                let parent = self
                    .store
                    .get_entry(parent_id)?
                    .ok_or_else(|| CoreError::NotFound(format!("parent entry {parent_id}")))?;
                if !parent.is_latest {
                    return Err(CoreError::Validation(format!(
                        "parent {parent_id} is superseded; revise the latest version"
                    )));
                }
                if parent.scope.tenant_id != write.scope.tenant_id {
                    return Err(CoreError::Validation(
                        "revision must stay within the parent's tenant".into(),
                    ));
                }
                MemoryEntry::new_version(&parent, write.content.clone(), write.confidence)
            }
            None => MemoryEntry::new(
                write.content_type,
                write.content.clone(),
                write.confidence,
                write.scope.clone(),
            ),
        };

        if let Some((key, value)) = &write.claim {
            entry = entry.with_claim(key.clone(), value.clone());
        }
        if let Some(agent) = &write.agent {
            entry = entry.with_agent(agent.clone());
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_infer::{FailingEmbedder, MockEmbedder};
    use relmem_types::JobStatus;

    const DIMS: usize = 8;

    fn router() -> (Arc<MemoryStore>, WriteRouter) {
        let store = Arc::new(MemoryStore::open_in_memory(DIMS).unwrap());
        let embedder: SharedEmbedder = Arc::new(MockEmbedder::new(DIMS));
        (store.clone(), WriteRouter::new(store, embedder))
    }

    fn write(content: &str) -> MemoryWrite {
        MemoryWrite::new(ContentType::Fact, content, 0.9, Scope::new("acme"))
    }

    #[tokio::test]
    async fn test_commit_stores_entry_embedding_and_job() {
        let (store, router) = router();
        let entry = router.commit(write("postgres is primary")).await.unwrap();

        let stored = store.get_entry(entry.id).unwrap().unwrap();
        assert!(stored.is_latest);
        assert!(store.embedding_for(entry.id).unwrap().is_some());

        let job = store.job_for_entry(entry.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (_, router) = router();
        let err = router.commit(write("   ")).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_rejected() {
        let (_, router) = router();
        let mut w = write("x");
        w.confidence = 1.2;
        assert!(matches!(
            router.commit(w).await.unwrap_err(),
            CoreError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_blank_claim_rejected() {
        let (_, router) = router();
        let w = write("db choice").with_claim("db_engine", " ");
        assert!(matches!(
            router.commit(w).await.unwrap_err(),
            CoreError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_revision_joins_lineage_and_supersedes_parent() {
        let (store, router) = router();
        let v1 = router
            .commit(write("primary is postgres 14").with_claim("db_engine", "postgres"))
            .await
            .unwrap();
        let v2 = router
            .commit(write("primary is postgres 16").revising(v1.id))
            .await
            .unwrap();

        assert_eq!(v2.root_id, v1.root_id);
        assert_eq!(v2.parent_id, Some(v1.id));
        // Claim carries over from the parent lineage
        assert_eq!(v2.claim_key.as_deref(), Some("db_engine"));
        assert!(!store.get_entry(v1.id).unwrap().unwrap().is_latest);

        // Revising the superseded version again is rejected
        let err = router
            .commit(write("stale revision").revising(v1.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_revising_missing_parent_is_not_found() {
        let (_, router) = router();
        let err = router
            .commit(write("x").revising(EntryId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_embedder_failure_commits_nothing() {
        let store = Arc::new(MemoryStore::open_in_memory(DIMS).unwrap());
        let embedder: SharedEmbedder = Arc::new(FailingEmbedder::new(DIMS));
        let router = WriteRouter::new(store.clone(), embedder);

        assert!(router.commit(write("x")).await.is_err());
        assert!(
            store
                .list_latest(&relmem_store::ScopeFilter::tenant("acme"), 10, 0)
                .unwrap()
                .is_empty()
        );
    }
}
