//! Freshness/usage quality scoring.
//!
//! `score = confidence × time_decay(age) + usage_boost(access_count)`.
//! The score feeds ranking in retrieval and the strategic-pool selection
//! for semantic conflict scanning.

use relmem_types::{MemoryEntry, Timestamp};
use serde::{Deserialize, Serialize};

/// Tuning parameters for the scoring curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Days for the base score to halve.
    pub half_life_days: f32,
    /// Multiplier on the log of the access count.
    pub usage_boost_factor: f32,
    /// Upper bound on the usage boost, so usage can lift but never dominate.
    pub usage_boost_cap: f32,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            usage_boost_factor: 0.05,
            usage_boost_cap: 0.3,
        }
    }
}

/// Exponential decay: halves every `half_life_days`.
pub fn time_decay(age_days: f32, half_life_days: f32) -> f32 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    0.5f32.powf(age_days.max(0.0) / half_life_days)
}

/// Bounded, sub-linear boost from access count.
pub fn usage_boost(access_count: u32, params: &ScoringParams) -> f32 {
    ((1.0 + access_count as f32).ln() * params.usage_boost_factor).min(params.usage_boost_cap)
}

/// Quality score of an entry at a given instant.
pub fn score_entry(entry: &MemoryEntry, now: Timestamp, params: &ScoringParams) -> f32 {
    let age_days = (now - entry.created_at).num_seconds().max(0) as f32 / 86_400.0;
    entry.confidence * time_decay(age_days, params.half_life_days)
        + usage_boost(entry.access_count, params)
}

/// Four ordered quality tiers derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Stale,
    Working,
    Reliable,
    Premium,
}

impl QualityTier {
    /// Classify a score into its tier.
    pub fn from_score(score: f32) -> Self {
        if score >= 0.75 {
            Self::Premium
        } else if score >= 0.5 {
            Self::Reliable
        } else if score >= 0.25 {
            Self::Working
        } else {
            Self::Stale
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_types::{ContentType, Scope};

    #[test]
    fn test_time_decay_halves_at_half_life() {
        assert!((time_decay(0.0, 30.0) - 1.0).abs() < 1e-6);
        assert!((time_decay(30.0, 30.0) - 0.5).abs() < 1e-6);
        assert!((time_decay(60.0, 30.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_time_decay_never_negative_age() {
        assert_eq!(time_decay(-5.0, 30.0), 1.0);
    }

    #[test]
    fn test_usage_boost_diminishing_and_capped() {
        let params = ScoringParams::default();
        let b1 = usage_boost(1, &params);
        let b10 = usage_boost(10, &params);
        let b10000 = usage_boost(10_000, &params);

        assert!(b1 > 0.0);
        assert!(b10 > b1);
        // Sub-linear: 10x the accesses is far less than 10x the boost
        assert!(b10 < b1 * 10.0);
        assert_eq!(b10000, params.usage_boost_cap);
    }

    #[test]
    fn test_score_fresh_entry_is_confidence_based() {
        let entry = MemoryEntry::new(ContentType::Fact, "x", 0.8, Scope::new("t"));
        let score = score_entry(&entry, entry.created_at, &ScoringParams::default());
        assert!((score - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_score_decays_with_age() {
        let entry = MemoryEntry::new(ContentType::Fact, "x", 0.8, Scope::new("t"));
        let later = entry.created_at + chrono::Duration::days(30);
        let score = score_entry(&entry, later, &ScoringParams::default());
        assert!((score - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_quality_tiers_ordered() {
        assert_eq!(QualityTier::from_score(0.9), QualityTier::Premium);
        assert_eq!(QualityTier::from_score(0.6), QualityTier::Reliable);
        assert_eq!(QualityTier::from_score(0.3), QualityTier::Working);
        assert_eq!(QualityTier::from_score(0.1), QualityTier::Stale);
        assert!(QualityTier::Premium > QualityTier::Stale);
    }
}
