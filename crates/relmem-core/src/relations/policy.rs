//! The coarse escalation filter.
//!
//! Model inference per candidate pair costs 10-50x a rule check, so the
//! decision of which path a pair takes is policy data: a pure function of
//! observable pair features, testable without any model in the loop.

use crate::config::RelationConfig;

/// Features of a candidate pair the policy looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateFeatures {
    /// Cosine similarity between the two entries.
    pub similarity: f32,
    /// Number of entities the pair shares.
    pub entity_overlap: u32,
    /// Both entries carry the same claim key.
    pub shares_claim_key: bool,
    /// Either entry belongs to the high-value pool.
    pub either_strategic: bool,
}

/// Which inference path handles a candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceRoute {
    /// Cheap keyword/temporal heuristics, coarse relation types only.
    Rule,
    /// Full model inference, any relation type.
    Llm,
}

/// Escalation thresholds, taken from [`RelationConfig`].
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    pub similarity_threshold: f32,
    pub min_entity_overlap: u32,
}

impl EscalationPolicy {
    pub fn from_config(config: &RelationConfig) -> Self {
        Self {
            similarity_threshold: config.escalation_similarity,
            min_entity_overlap: config.escalation_entity_overlap,
        }
    }

    /// Decide the route for one candidate pair.
    ///
    /// Escalates when the pair is both similar and entity-entangled, when
    /// it shares a claim key (correctness-critical, always worth the
    /// cost), or when either side is strategic. Everything else takes the
    /// rule path.
    pub fn decide(&self, features: &CandidateFeatures) -> InferenceRoute {
        if features.shares_claim_key {
            return InferenceRoute::Llm;
        }
        if features.either_strategic {
            return InferenceRoute::Llm;
        }
        if features.similarity >= self.similarity_threshold
            && features.entity_overlap >= self.min_entity_overlap
        {
            return InferenceRoute::Llm;
        }
        InferenceRoute::Rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> EscalationPolicy {
        EscalationPolicy {
            similarity_threshold: 0.75,
            min_entity_overlap: 2,
        }
    }

    #[test]
    fn test_low_signal_pairs_take_rule_path() {
        let features = CandidateFeatures {
            similarity: 0.6,
            entity_overlap: 1,
            ..Default::default()
        };
        assert_eq!(policy().decide(&features), InferenceRoute::Rule);
    }

    #[test]
    fn test_similarity_alone_is_not_enough() {
        let features = CandidateFeatures {
            similarity: 0.95,
            entity_overlap: 1,
            ..Default::default()
        };
        assert_eq!(policy().decide(&features), InferenceRoute::Rule);
    }

    #[test]
    fn test_similar_and_entangled_escalates() {
        let features = CandidateFeatures {
            similarity: 0.8,
            entity_overlap: 2,
            ..Default::default()
        };
        assert_eq!(policy().decide(&features), InferenceRoute::Llm);
    }

    #[test]
    fn test_shared_claim_key_always_escalates() {
        let features = CandidateFeatures {
            similarity: 0.0,
            entity_overlap: 0,
            shares_claim_key: true,
            ..Default::default()
        };
        assert_eq!(policy().decide(&features), InferenceRoute::Llm);
    }

    #[test]
    fn test_strategic_pool_escalates() {
        let features = CandidateFeatures {
            similarity: 0.1,
            either_strategic: true,
            ..Default::default()
        };
        assert_eq!(policy().decide(&features), InferenceRoute::Llm);
    }
}
