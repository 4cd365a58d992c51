//! Periodic semantic-contradiction scanning.
//!
//! Pair count grows quadratically, so the scan is restricted to the
//! strategic pool (high-score, high-usage entries) and LLM evaluation runs
//! in batches with an inter-batch delay to respect provider rate limits.

use std::sync::Arc;

use relmem_infer::{InferError, SharedInference};
use relmem_store::{MemoryStore, ScoringParams, score_entry};
use relmem_types::{ConflictType, MemoryConflict, MemoryEntry, now};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConflictConfig, RmcConfig};
use crate::error::Result;

/// Upper bound on pool size per scan, independent of thresholds.
const POOL_FETCH_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct ContradictionReply {
    #[serde(default)]
    contradiction: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: Option<String>,
}

/// The periodic semantic conflict scanner.
pub struct SemanticScanner {
    store: Arc<MemoryStore>,
    inference: SharedInference,
    config: ConflictConfig,
    scoring: ScoringParams,
}

impl SemanticScanner {
    pub fn new(store: Arc<MemoryStore>, inference: SharedInference, config: &RmcConfig) -> Self {
        Self {
            store,
            inference,
            config: config.conflicts.clone(),
            scoring: config.scoring.params(),
        }
    }

    /// Entries eligible for semantic scanning: latest, frequently used,
    /// and scoring above the pool floor.
    pub fn strategic_pool(&self) -> Result<Vec<MemoryEntry>> {
        let at = now();
        let pool = self
            .store
            .frequently_used(self.config.pool_min_access_count, POOL_FETCH_LIMIT)?
            .into_iter()
            .filter(|e| score_entry(e, at, &self.scoring) >= self.config.pool_min_score)
            .collect();
        Ok(pool)
    }

    /// One full scan over the strategic pool. Returns the number of new
    /// conflicts recorded.
    pub async fn scan_once(&self) -> Result<usize> {
        let pool = self.strategic_pool()?;
        let pairs = candidate_pairs(&pool);
        debug!(
            "Semantic scan: {} pool entries, {} candidate pairs",
            pool.len(),
            pairs.len()
        );

        let mut created = 0;
        for (batch_index, batch) in pairs.chunks(self.config.scan_batch_size.max(1)).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.config.scan_batch_delay()).await;
            }
            for (a, b) in batch {
                if self.store.conflict_between(a.id, b.id)?.is_some() {
                    continue;
                }
                match self.evaluate_pair(a, b).await {
                    Ok(true) => created += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Semantic evaluation of {} / {} failed: {}", a.id, b.id, e);
                    }
                }
            }
        }

        if created > 0 {
            info!("Semantic scan recorded {} new conflicts", created);
        }
        Ok(created)
    }

    async fn evaluate_pair(&self, a: &MemoryEntry, b: &MemoryEntry) -> Result<bool> {
        let prompt = build_prompt(a, b);
        let value = self.inference.infer(&prompt).await?;
        let reply: ContradictionReply = serde_json::from_value(value)
            .map_err(|e| InferError::InvalidResponse(format!("contradiction reply: {}", e)))?;

        if !reply.contradiction || reply.confidence < self.config.contradiction_threshold {
            return Ok(false);
        }

        let conflict = MemoryConflict::between(a.id, b.id, ConflictType::SemanticContradiction);
        let inserted = self.store.insert_conflict(&conflict)?;
        if inserted {
            info!(
                "Semantic contradiction between {} and {} ({:?})",
                a.id, b.id, reply.reason
            );
        }
        Ok(inserted)
    }

    /// Run scans forever at the configured interval, until cancelled.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.scan_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Semantic scanner stopping");
                        return;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.scan_once().await {
                            warn!("Semantic scan failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

/// Same-tenant unordered pairs from the pool.
fn candidate_pairs(pool: &[MemoryEntry]) -> Vec<(&MemoryEntry, &MemoryEntry)> {
    let mut pairs = Vec::new();
    for (i, a) in pool.iter().enumerate() {
        for b in &pool[i + 1..] {
            if a.scope.tenant_id == b.scope.tenant_id {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

fn build_prompt(a: &MemoryEntry, b: &MemoryEntry) -> String {
    format!(
        r#"Do these two statements from the same knowledge base contradict
each other? Answer with JSON only, no prose:
{{"contradiction": true/false, "confidence": 0.0, "reason": "..."}}

Statement A:
{a}

Statement B:
{b}"#,
        a = a.content,
        b = b.content,
    )
}
