//! Typed, directed, weighted relations between memory entries.

use serde::{Deserialize, Serialize};

use crate::ids::{EntryId, RelationId};
use crate::{Timestamp, now};

/// Closed set of relation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Causes,
    Contradicts,
    Supports,
    Impacts,
    TemporalBefore,
    TemporalAfter,
    DerivedFrom,
    SimilarTo,
    PartOf,
}

impl RelationType {
    /// String form used in the database and in LLM prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causes => "causes",
            Self::Contradicts => "contradicts",
            Self::Supports => "supports",
            Self::Impacts => "impacts",
            Self::TemporalBefore => "temporal_before",
            Self::TemporalAfter => "temporal_after",
            Self::DerivedFrom => "derived_from",
            Self::SimilarTo => "similar_to",
            Self::PartOf => "part_of",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "causes" => Some(Self::Causes),
            "contradicts" => Some(Self::Contradicts),
            "supports" => Some(Self::Supports),
            "impacts" => Some(Self::Impacts),
            "temporal_before" => Some(Self::TemporalBefore),
            "temporal_after" => Some(Self::TemporalAfter),
            "derived_from" => Some(Self::DerivedFrom),
            "similar_to" => Some(Self::SimilarTo),
            "part_of" => Some(Self::PartOf),
            _ => None,
        }
    }

    /// All relation types, in prompt order.
    pub fn all() -> &'static [RelationType] {
        &[
            Self::Causes,
            Self::Contradicts,
            Self::Supports,
            Self::Impacts,
            Self::TemporalBefore,
            Self::TemporalAfter,
            Self::DerivedFrom,
            Self::SimilarTo,
            Self::PartOf,
        ]
    }

    /// Whether the cheap rule engine is allowed to emit this type.
    ///
    /// The rule path only detects the coarse types; everything else needs
    /// model-based inference.
    pub fn is_coarse(&self) -> bool {
        matches!(
            self,
            Self::SimilarTo | Self::TemporalBefore | Self::TemporalAfter
        )
    }
}

/// A directed edge between two entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    pub id: RelationId,
    pub source_id: EntryId,
    pub target_id: EntryId,
    pub relation_type: RelationType,
    /// Strength in [0, 1].
    pub strength: f32,
    /// Optional human-readable justification from the inferring engine.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl MemoryRelation {
    /// Create a new edge. Self-loop rejection happens at the store layer.
    pub fn new(
        source_id: EntryId,
        target_id: EntryId,
        relation_type: RelationType,
        strength: f32,
    ) -> Self {
        Self {
            id: RelationId::new(),
            source_id,
            target_id,
            relation_type,
            strength: strength.clamp(0.0, 1.0),
            reason: None,
            created_at: now(),
        }
    }

    /// Attach a justification.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
