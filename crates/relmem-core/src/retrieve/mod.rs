//! Hybrid retrieval: vector seeds plus bounded graph expansion.
//!
//! A query is embedded and matched against the vector index to pick seed
//! entries, then the relation graph around those seeds is walked within
//! depth, degree, and wall-clock bounds. The combined subgraph comes back
//! ranked, together with any inference paths found in its edges.
//!
//! When no embedding can be produced the retriever degrades to graph-only
//! mode, expanding from caller-supplied seed entries instead of failing
//! the whole query.

mod expand;
mod paths;

pub use expand::{ExpansionParams, Subgraph, expand};
pub use paths::{InferencePath, PathKind, extract_paths};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use relmem_infer::SharedEmbedder;
use relmem_store::{MemoryStore, ScopeFilter};
use relmem_types::{EntryId, MemoryEntry, MemoryRelation, RelationType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{RetrievalConfig, RmcConfig};
use crate::error::{CoreError, Result};

/// Per-depth relevance discount for entries reached through the graph.
const DEPTH_DECAY: f32 = 0.5;

/// Per-query overrides; anything unset falls back to the configured bound.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub limit: Option<usize>,
    pub max_depth: Option<u32>,
    pub max_edges_per_node: Option<usize>,
    /// Restrict the walk to these relation types.
    pub relation_types: Option<Vec<RelationType>>,
    /// Seeds for graph-only retrieval when the embedder is down or absent.
    pub seed_entries: Vec<EntryId>,
}

/// One ranked entry in a retrieval response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedEntry {
    pub entry: MemoryEntry,
    /// Vector similarity for seeds, depth-discounted edge strength for
    /// entries reached through the graph.
    pub relevance: f32,
    /// Hops from the nearest seed; seeds are depth 0.
    pub depth: u32,
}

/// A retrieval response: ranked entries, the edges connecting them, and
/// the inference paths extracted from those edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub entries: Vec<RetrievedEntry>,
    pub edges: Vec<MemoryRelation>,
    pub paths: Vec<InferencePath>,
}

pub struct HybridRetriever {
    store: Arc<MemoryStore>,
    embedder: Option<SharedEmbedder>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(store: Arc<MemoryStore>, embedder: Option<SharedEmbedder>, config: &RmcConfig) -> Self {
        Self {
            store,
            embedder,
            config: config.retrieval.clone(),
        }
    }

    /// Run a hybrid query under the caller's visibility filter.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: &ScopeFilter,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult> {
        let seeds = self.seed(query, filter, options).await?;
        if seeds.is_empty() {
            debug!("No seeds for query, returning empty result");
            return Ok(RetrievalResult::default());
        }

        let params = ExpansionParams {
            max_depth: options.max_depth.unwrap_or(self.config.max_depth),
            max_edges_per_node: options
                .max_edges_per_node
                .unwrap_or(self.config.max_edges_per_node),
            half_life_days: self.config.edge_half_life_days,
            budget: Duration::from_millis(self.config.time_budget_ms),
            type_filter: options
                .relation_types
                .as_ref()
                .map(|types| types.iter().copied().collect()),
        };
        let seed_ids: Vec<EntryId> = seeds.iter().map(|(e, _)| e.id).collect();
        let subgraph = expand(&self.store, &seed_ids, &params)?;

        self.assemble(seeds, subgraph, filter, options.limit.unwrap_or(self.config.limit))
    }

    /// Resolve the seed set, degrading to caller-supplied entries when no
    /// query embedding is available.
    async fn seed(
        &self,
        query: &str,
        filter: &ScopeFilter,
        options: &RetrievalOptions,
    ) -> Result<Vec<(MemoryEntry, f32)>> {
        if let Some(embedder) = &self.embedder {
            match embedder.embed(query).await {
                Ok(vector) => {
                    let hits = self.store.search_similar_entries(&vector, filter, self.config.seed_k)?;
                    return Ok(hits
                        .into_iter()
                        .filter(|h| h.similarity >= self.config.seed_min_similarity)
                        .map(|h| (h.entry, h.similarity))
                        .collect());
                }
                Err(e) => {
                    warn!("Query embedding failed ({e}), trying graph-only fallback");
                    self.fallback_seeds(filter, options, &e.to_string())
                }
            }
        } else {
            self.fallback_seeds(filter, options, "no embedder configured")
        }
    }

    fn fallback_seeds(
        &self,
        filter: &ScopeFilter,
        options: &RetrievalOptions,
        reason: &str,
    ) -> Result<Vec<(MemoryEntry, f32)>> {
        if options.seed_entries.is_empty() {
            return Err(CoreError::EmbedderUnavailable(reason.to_string()));
        }
        let mut seeds = Vec::new();
        for &id in &options.seed_entries {
            if let Some(entry) = self.store.get_entry(id)? {
                if entry.is_latest && filter.allows(&entry.scope) {
                    seeds.push((entry, 1.0));
                }
            }
        }
        Ok(seeds)
    }

    /// Merge seeds and expanded nodes, apply visibility, rank, and extract
    /// the inference paths from the surviving edges.
    fn assemble(
        &self,
        seeds: Vec<(MemoryEntry, f32)>,
        subgraph: Subgraph,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<RetrievalResult> {
        let mut best_strength: HashMap<EntryId, f32> = HashMap::new();
        for edge in &subgraph.edges {
            for id in [edge.source_id, edge.target_id] {
                let slot = best_strength.entry(id).or_insert(0.0);
                *slot = slot.max(edge.strength);
            }
        }

        let seed_similarity: HashMap<EntryId, f32> =
            seeds.iter().map(|(e, sim)| (e.id, *sim)).collect();
        let mut materialized: HashMap<EntryId, MemoryEntry> =
            seeds.into_iter().map(|(e, _)| (e.id, e)).collect();

        let mut entries = Vec::new();
        for (&id, &depth) in &subgraph.depths {
            let entry = match materialized.remove(&id) {
                Some(entry) => entry,
                None => match self.store.get_entry(id)? {
                    Some(entry) => entry,
                    None => continue,
                },
            };
            // Expanded nodes re-check visibility; the walk itself is
            // scope-blind and edges can cross into superseded versions.
            if depth > 0 && (!entry.is_latest || !filter.allows(&entry.scope)) {
                continue;
            }

            let relevance = match seed_similarity.get(&id) {
                Some(&sim) => sim,
                None => best_strength.get(&id).copied().unwrap_or(0.0) * DEPTH_DECAY.powi(depth as i32),
            };
            entries.push(RetrievedEntry {
                entry,
                relevance,
                depth,
            });
        }

        entries.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(limit);

        // Edges are only reported when both endpoints made the cut
        let kept: HashSet<EntryId> = entries.iter().map(|r| r.entry.id).collect();
        let edges: Vec<MemoryRelation> = subgraph
            .edges
            .into_iter()
            .filter(|e| kept.contains(&e.source_id) && kept.contains(&e.target_id))
            .collect();
        let paths = extract_paths(&edges);

        Ok(RetrievalResult { entries, edges, paths })
    }
}
