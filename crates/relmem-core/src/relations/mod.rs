//! Relation building: candidate generation, the escalation filter, and
//! edge creation.

mod policy;
mod prompt;
mod rules;

use std::collections::HashMap;
use std::sync::Arc;

use relmem_infer::SharedInference;
use relmem_store::{MemoryStore, ScopeFilter, ScoringParams, score_entry};
use relmem_types::{EntryId, MemoryEntry, MemoryRelation, now};
use tracing::{debug, warn};

pub use policy::{CandidateFeatures, EscalationPolicy, InferenceRoute};
pub use rules::ProposedRelation;

use crate::config::RmcConfig;
use crate::error::{CoreError, Result};

/// Builds typed edges from a freshly enriched entry to its neighborhood.
pub struct RelationBuilder {
    store: Arc<MemoryStore>,
    inference: Option<SharedInference>,
    policy: EscalationPolicy,
    candidate_similarity: f32,
    max_candidates: usize,
    min_strength: f32,
    scoring: ScoringParams,
    pool_min_score: f32,
    pool_min_access: u32,
}

impl RelationBuilder {
    pub fn new(
        store: Arc<MemoryStore>,
        inference: Option<SharedInference>,
        config: &RmcConfig,
    ) -> Self {
        Self {
            store,
            inference,
            policy: EscalationPolicy::from_config(&config.relations),
            candidate_similarity: config.relations.candidate_similarity,
            max_candidates: config.relations.max_candidates,
            min_strength: config.relations.min_strength,
            scoring: config.scoring.params(),
            pool_min_score: config.conflicts.pool_min_score,
            pool_min_access: config.conflicts.pool_min_access_count,
        }
    }

    /// Infer and persist relations for an entry. Returns the number of
    /// edges actually created.
    ///
    /// Idempotent: duplicate (source, target, type) triples are swallowed
    /// by the store's uniqueness constraint, so re-running against an
    /// already-enriched entry creates nothing new.
    pub async fn build_relations(&self, entry_id: EntryId) -> Result<usize> {
        let entry = self
            .store
            .get_entry(entry_id)?
            .ok_or_else(|| CoreError::NotFound(format!("Entry {}", entry_id)))?;

        if !entry.is_latest {
            debug!("Entry {} is superseded, skipping relation build", entry_id);
            return Ok(0);
        }

        let candidates = self.gather_candidates(&entry)?;
        debug!(
            "Relation build for {}: {} candidates",
            entry_id,
            candidates.len()
        );

        let source_strategic = self.is_strategic(&entry);
        let mut created = 0;

        for candidate in candidates {
            let features = CandidateFeatures {
                similarity: candidate.similarity,
                entity_overlap: self.store.entity_overlap_count(entry.id, candidate.entry.id)?,
                shares_claim_key: shares_claim_key(&entry, &candidate.entry),
                either_strategic: source_strategic || self.is_strategic(&candidate.entry),
            };

            let proposed = match self.policy.decide(&features) {
                InferenceRoute::Llm => {
                    self.infer_pair(&entry, &candidate.entry, candidate.similarity)
                        .await
                }
                InferenceRoute::Rule => {
                    rules::resolve_pair(&entry, &candidate.entry, candidate.similarity)
                }
            };

            for p in proposed {
                if p.strength < self.min_strength {
                    continue;
                }
                let relation =
                    MemoryRelation::new(entry.id, candidate.entry.id, p.relation_type, p.strength)
                        .with_reason(p.reason);
                if self.store.insert_relation(&relation)? {
                    created += 1;
                }
            }
        }

        debug!("Relation build for {}: {} edges created", entry_id, created);
        Ok(created)
    }

    /// Same-tenant latest entries worth considering: vector-similar, or
    /// sharing an entity, or carrying the same claim key. Never the entry
    /// itself.
    fn gather_candidates(&self, entry: &MemoryEntry) -> Result<Vec<Candidate>> {
        let tenant = entry.scope.tenant_id.as_str();
        let mut by_id: HashMap<EntryId, Candidate> = HashMap::new();

        let embedding = self.store.embedding_for(entry.id)?;

        if let Some(embedding) = &embedding {
            let hits = self.store.search_similar_entries(
                embedding,
                &ScopeFilter::tenant(tenant),
                self.max_candidates,
            )?;
            for hit in hits {
                if hit.entry.id == entry.id || hit.similarity < self.candidate_similarity {
                    continue;
                }
                by_id.insert(
                    hit.entry.id,
                    Candidate {
                        entry: hit.entry,
                        similarity: hit.similarity,
                    },
                );
            }
        }

        let sharing =
            self.store
                .entries_sharing_entities(entry.id, tenant, self.max_candidates)?;
        for other_id in sharing {
            self.add_candidate(entry, other_id, embedding.as_deref(), &mut by_id)?;
        }

        if let Some(claim_key) = &entry.claim_key {
            for other in self.store.latest_with_claim_key(tenant, claim_key)? {
                if other.id == entry.id {
                    continue;
                }
                let other_id = other.id;
                self.add_candidate(entry, other_id, embedding.as_deref(), &mut by_id)?;
            }
        }

        let mut candidates: Vec<_> = by_id.into_values().collect();
        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.max_candidates);
        Ok(candidates)
    }

    fn add_candidate(
        &self,
        entry: &MemoryEntry,
        other_id: EntryId,
        embedding: Option<&[f32]>,
        by_id: &mut HashMap<EntryId, Candidate>,
    ) -> Result<()> {
        if other_id == entry.id || by_id.contains_key(&other_id) {
            return Ok(());
        }
        let Some(other) = self.store.get_entry(other_id)? else {
            return Ok(());
        };
        if !other.is_latest || other.scope.tenant_id != entry.scope.tenant_id {
            return Ok(());
        }

        let similarity = match (embedding, self.store.embedding_for(other_id)?) {
            (Some(a), Some(b)) => cosine(a, &b),
            _ => 0.0,
        };

        by_id.insert(
            other_id,
            Candidate {
                entry: other,
                similarity,
            },
        );
        Ok(())
    }

    async fn infer_pair(
        &self,
        source: &MemoryEntry,
        target: &MemoryEntry,
        similarity: f32,
    ) -> Vec<ProposedRelation> {
        let Some(inference) = &self.inference else {
            return rules::resolve_pair(source, target, similarity);
        };

        let p = prompt::build_prompt(source, target);
        let result = match inference.infer(&p).await {
            Ok(value) => prompt::parse_reply(value),
            Err(e) => Err(e),
        };

        match result {
            Ok(proposed) => proposed,
            Err(e) => {
                warn!(
                    "Relation inference failed for {} -> {}, falling back to rules: {}",
                    source.id, target.id, e
                );
                rules::resolve_pair(source, target, similarity)
            }
        }
    }

    fn is_strategic(&self, entry: &MemoryEntry) -> bool {
        entry.access_count >= self.pool_min_access
            && score_entry(entry, now(), &self.scoring) >= self.pool_min_score
    }
}

struct Candidate {
    entry: MemoryEntry,
    similarity: f32,
}

fn shares_claim_key(a: &MemoryEntry, b: &MemoryEntry) -> bool {
    match (&a.claim_key, &b.claim_key) {
        (Some(ka), Some(kb)) => ka == kb,
        _ => false,
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_infer::MockInference;
    use relmem_types::{ContentType, EntityMention, EntityType, RelationType, Scope};
    use serde_json::json;

    fn test_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::open_in_memory(4).unwrap())
    }

    fn commit(store: &MemoryStore, content: &str, embedding: &[f32]) -> MemoryEntry {
        let e = MemoryEntry::new(ContentType::Fact, content, 0.9, Scope::new("acme"));
        store.commit_entry(&e, embedding, None).unwrap();
        e
    }

    fn builder(store: Arc<MemoryStore>, inference: Option<SharedInference>) -> RelationBuilder {
        RelationBuilder::new(store, inference, &RmcConfig::default())
    }

    #[tokio::test]
    async fn test_rule_path_links_similar_entries() {
        let store = test_store();
        let a = commit(&store, "cache design", &[1.0, 0.0, 0.0, 0.0]);
        let _b = commit(&store, "cache notes", &[0.95, 0.05, 0.0, 0.0]);

        let n = builder(store.clone(), None).build_relations(a.id).await.unwrap();
        assert_eq!(n, 1);

        let edges = store.relations_from(a.id, None).unwrap();
        assert_eq!(edges[0].relation_type, RelationType::SimilarTo);
    }

    #[tokio::test]
    async fn test_idempotent_rerun_creates_nothing() {
        let store = test_store();
        let a = commit(&store, "cache design", &[1.0, 0.0, 0.0, 0.0]);
        let _b = commit(&store, "cache notes", &[0.95, 0.05, 0.0, 0.0]);

        let b = builder(store.clone(), None);
        let first = b.build_relations(a.id).await.unwrap();
        let second = b.build_relations(a.id).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.relations_from(a.id, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_claim_key_escalates_to_llm() {
        let store = test_store();

        let a = MemoryEntry::new(ContentType::Fact, "we use postgres", 0.9, Scope::new("acme"))
            .with_claim("db_engine", "postgres");
        store.commit_entry(&a, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        let b = MemoryEntry::new(ContentType::Fact, "we use mongo", 0.9, Scope::new("acme"))
            .with_claim("db_engine", "mongo");
        store.commit_entry(&b, &[0.0, 1.0, 0.0, 0.0], None).unwrap();

        let inference = Arc::new(MockInference::always(json!({
            "relations": [
                {"type": "contradicts", "strength": 0.9, "reason": "different engines"}
            ]
        })));
        let built = builder(store.clone(), Some(inference.clone()))
            .build_relations(a.id)
            .await
            .unwrap();

        assert_eq!(built, 1);
        assert_eq!(inference.call_count(), 1);
        let edges = store.relations_from(a.id, Some(RelationType::Contradicts)).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_id, b.id);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_rules() {
        let store = test_store();

        let a = MemoryEntry::new(ContentType::Fact, "we use postgres", 0.9, Scope::new("acme"))
            .with_claim("db_engine", "postgres");
        store.commit_entry(&a, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        let b = MemoryEntry::new(ContentType::Fact, "postgres is the engine", 0.9, Scope::new("acme"))
            .with_claim("db_engine", "postgres");
        store.commit_entry(&b, &[0.97, 0.03, 0.0, 0.0], None).unwrap();

        let built = builder(store.clone(), Some(Arc::new(MockInference::failing())))
            .build_relations(a.id)
            .await
            .unwrap();

        // Rule fallback still produces the coarse similar_to edge
        assert_eq!(built, 1);
        let edges = store.relations_from(a.id, None).unwrap();
        assert!(edges[0].relation_type.is_coarse());
    }

    #[tokio::test]
    async fn test_candidates_exclude_other_tenants_and_self() {
        let store = test_store();
        let a = commit(&store, "cache design", &[1.0, 0.0, 0.0, 0.0]);

        let foreign = MemoryEntry::new(ContentType::Fact, "cache design", 0.9, Scope::new("globex"));
        store.commit_entry(&foreign, &[1.0, 0.0, 0.0, 0.0], None).unwrap();

        let n = builder(store.clone(), None).build_relations(a.id).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_entity_overlap_candidates_without_similarity() {
        let store = test_store();
        // Orthogonal embeddings: the vector path finds nothing
        let a = commit(&store, "Redis rollout plan", &[1.0, 0.0, 0.0, 0.0]);
        let b = commit(&store, "Redis capacity numbers", &[0.0, 1.0, 0.0, 0.0]);

        let redis = EntityMention::new("Redis", EntityType::Technology, 0.9);
        store.record_mention(a.id, &redis).unwrap();
        store.record_mention(b.id, &redis).unwrap();

        // One shared entity is below the escalation overlap, no temporal
        // cues, similarity ~0: the pair is considered but yields no edge.
        let n = builder(store.clone(), None).build_relations(a.id).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_superseded_entry_is_skipped() {
        let store = test_store();
        let v1 = commit(&store, "v1", &[1.0, 0.0, 0.0, 0.0]);
        let v2 = MemoryEntry::new_version(&v1, "v2", 0.9);
        store.commit_entry(&v2, &[1.0, 0.0, 0.0, 0.0], None).unwrap();

        let n = builder(store.clone(), None).build_relations(v1.id).await.unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
