//! TOML-backed configuration for the memory core.
//!
//! Every field has a default so a partial config file (or none at all)
//! yields a working setup:
//!
//! ```toml
//! [queue]
//! workers = 4
//!
//! [retrieval]
//! seed_k = 10
//! max_depth = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RmcConfig {
    pub extraction: ExtractionConfig,
    pub relations: RelationConfig,
    pub conflicts: ConflictConfig,
    pub retrieval: RetrievalConfig,
    pub queue: QueueConfig,
    pub scoring: ScoringConfig,
}

impl RmcConfig {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Load from a file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }
}

/// Entity extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Use the LLM extractor when available. The rule extractor is always
    /// the fallback.
    pub use_llm: bool,
    /// Entities below this confidence are dropped.
    pub min_confidence: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            use_llm: true,
            min_confidence: 0.5,
        }
    }
}

/// Relation building and the escalation (coarse-filter) policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Vector-similarity floor for candidate generation.
    pub candidate_similarity: f32,
    /// Max candidates considered per enrichment run.
    pub max_candidates: usize,
    /// Similarity above which a pair may be escalated to the LLM.
    pub escalation_similarity: f32,
    /// Entity overlap required alongside high similarity for escalation.
    pub escalation_entity_overlap: u32,
    /// Relations below this strength are discarded.
    pub min_strength: f32,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            candidate_similarity: 0.55,
            max_candidates: 25,
            escalation_similarity: 0.75,
            escalation_entity_overlap: 2,
            min_strength: 0.3,
        }
    }
}

/// Conflict detection, including the strategic pool for semantic scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Minimum composite score for strategic-pool membership.
    pub pool_min_score: f32,
    /// Minimum access count for strategic-pool membership.
    pub pool_min_access_count: u32,
    /// Pairs LLM-evaluated per batch in the semantic scan.
    pub scan_batch_size: usize,
    pub scan_batch_delay_ms: u64,
    /// How often the semantic scanner wakes up.
    pub scan_interval_secs: u64,
    /// LLM-reported contradiction confidence needed to record a conflict.
    pub contradiction_threshold: f32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            pool_min_score: 0.6,
            pool_min_access_count: 3,
            scan_batch_size: 10,
            scan_batch_delay_ms: 1_000,
            scan_interval_secs: 3_600,
            contradiction_threshold: 0.7,
        }
    }
}

impl ConflictConfig {
    pub fn scan_batch_delay(&self) -> Duration {
        Duration::from_millis(self.scan_batch_delay_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

/// Hybrid retrieval bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Seed entries fetched by cosine similarity.
    pub seed_k: usize,
    /// Vector hits below this similarity never seed a walk.
    pub seed_min_similarity: f32,
    pub max_depth: u32,
    /// Per-node edge cap during expansion. The super-node control.
    pub max_edges_per_node: usize,
    /// Edge-decay half life in days for expansion ordering.
    pub edge_half_life_days: f32,
    /// Wall-clock budget for the whole expansion.
    pub time_budget_ms: u64,
    /// Result size cap.
    pub limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            seed_k: 8,
            seed_min_similarity: 0.25,
            max_depth: 2,
            max_edges_per_node: 10,
            edge_half_life_days: 90.0,
            time_budget_ms: 500,
            limit: 20,
        }
    }
}

impl RetrievalConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

/// Enrichment worker pool and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval_ms: 250,
            max_attempts: 5,
            base_backoff_secs: 30,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }
}

/// Freshness/usage scoring knobs, passed through to the store's engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub half_life_days: f32,
    pub usage_boost_factor: f32,
    pub usage_boost_cap: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let p = relmem_store::ScoringParams::default();
        Self {
            half_life_days: p.half_life_days,
            usage_boost_factor: p.usage_boost_factor,
            usage_boost_cap: p.usage_boost_cap,
        }
    }
}

impl ScoringConfig {
    pub fn params(&self) -> relmem_store::ScoringParams {
        relmem_store::ScoringParams {
            half_life_days: self.half_life_days,
            usage_boost_factor: self.usage_boost_factor,
            usage_boost_cap: self.usage_boost_cap,
        }
    }
}
