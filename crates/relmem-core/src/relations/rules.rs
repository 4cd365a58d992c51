//! The cheap relation rule engine.
//!
//! Only emits the coarse relation types (similar_to, temporal_before,
//! temporal_after). Anything finer-grained needs model inference.

use relmem_types::{MemoryEntry, RelationType};

/// Similarity floor for emitting a `similar_to` edge on the rule path.
const SIMILAR_TO_FLOOR: f32 = 0.65;

/// Words that signal the content describes an ordered sequence of events.
const TEMPORAL_CUES: &[&str] = &[
    "before", "after", "then", "previously", "subsequently", "earlier", "later", "once", "since",
];

/// A relation the rule engine proposes, directed source -> target.
#[derive(Debug, Clone)]
pub struct ProposedRelation {
    pub relation_type: RelationType,
    pub strength: f32,
    pub reason: String,
}

/// Resolve a candidate pair with heuristics.
///
/// `source` is the entry being enriched; proposed edges point from it to
/// `target`. `similarity` is the pair's cosine similarity.
pub fn resolve_pair(
    source: &MemoryEntry,
    target: &MemoryEntry,
    similarity: f32,
) -> Vec<ProposedRelation> {
    let mut proposed = Vec::new();

    if similarity >= SIMILAR_TO_FLOOR {
        proposed.push(ProposedRelation {
            relation_type: RelationType::SimilarTo,
            strength: similarity.clamp(0.0, 1.0),
            reason: format!("cosine similarity {:.2}", similarity),
        });
    }

    if has_temporal_cue(&source.content) || has_temporal_cue(&target.content) {
        // Creation order stands in for event order; cue words only tell us
        // the pair is about a sequence at all.
        let relation_type = if source.created_at <= target.created_at {
            RelationType::TemporalBefore
        } else {
            RelationType::TemporalAfter
        };
        proposed.push(ProposedRelation {
            relation_type,
            strength: 0.4,
            reason: "temporal cue in content, ordered by creation time".to_string(),
        });
    }

    proposed
}

fn has_temporal_cue(content: &str) -> bool {
    let lower = content.to_lowercase();
    TEMPORAL_CUES
        .iter()
        .any(|cue| lower.split_whitespace().any(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric()) == *cue
        }))
}
