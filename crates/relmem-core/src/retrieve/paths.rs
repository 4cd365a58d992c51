//! Inference-path extraction over a retrieved subgraph.
//!
//! A path is a typed walk through the returned edges that reads as a unit
//! of reasoning: a causal chain, a contradiction, multi-hop support, or a
//! temporal ordering. Confidence is the product of the edge strengths on
//! the walk, so longer chains are naturally discounted.

use std::collections::{HashMap, HashSet};

use relmem_types::{EntryId, MemoryRelation, RelationType};
use serde::{Deserialize, Serialize};

/// Hard cap on extracted paths per kind, so pathological subgraphs cannot
/// dominate the response.
const MAX_PATHS_PER_KIND: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    CausalChain,
    ContradictionPair,
    MultiHopSupport,
    TemporalSequence,
}

/// One extracted reasoning path, ordered source-to-sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferencePath {
    pub kind: PathKind,
    pub entry_ids: Vec<EntryId>,
    pub confidence: f32,
}

/// Extract all recognized path shapes from the edge set.
pub fn extract_paths(edges: &[MemoryRelation]) -> Vec<InferencePath> {
    let mut paths = Vec::new();

    paths.extend(chains(edges, RelationType::Causes, 2, PathKind::CausalChain));
    paths.extend(contradiction_pairs(edges));
    paths.extend(chains(edges, RelationType::Supports, 3, PathKind::MultiHopSupport));
    paths.extend(temporal_sequences(edges));

    paths
}

/// Every contradicts edge is a path of its own.
fn contradiction_pairs(edges: &[MemoryRelation]) -> Vec<InferencePath> {
    edges
        .iter()
        .filter(|e| e.relation_type == RelationType::Contradicts)
        .take(MAX_PATHS_PER_KIND)
        .map(|e| InferencePath {
            kind: PathKind::ContradictionPair,
            entry_ids: vec![e.source_id, e.target_id],
            confidence: e.strength,
        })
        .collect()
}

/// Temporal edges normalized to before-order, then chained. A sequence
/// only counts when at least three entries line up in one direction.
fn temporal_sequences(edges: &[MemoryRelation]) -> Vec<InferencePath> {
    let forward: Vec<(EntryId, EntryId, f32)> = edges
        .iter()
        .filter_map(|e| match e.relation_type {
            RelationType::TemporalBefore => Some((e.source_id, e.target_id, e.strength)),
            RelationType::TemporalAfter => Some((e.target_id, e.source_id, e.strength)),
            _ => None,
        })
        .collect();
    maximal_chains(&forward, 3, PathKind::TemporalSequence)
}

/// Maximal single-type directed chains with at least `min_nodes` entries.
fn chains(
    edges: &[MemoryRelation],
    relation_type: RelationType,
    min_nodes: usize,
    kind: PathKind,
) -> Vec<InferencePath> {
    let typed: Vec<(EntryId, EntryId, f32)> = edges
        .iter()
        .filter(|e| e.relation_type == relation_type)
        .map(|e| (e.source_id, e.target_id, e.strength))
        .collect();
    maximal_chains(&typed, min_nodes, kind)
}

fn maximal_chains(
    edges: &[(EntryId, EntryId, f32)],
    min_nodes: usize,
    kind: PathKind,
) -> Vec<InferencePath> {
    let mut adjacency: HashMap<EntryId, Vec<(EntryId, f32)>> = HashMap::new();
    let mut has_incoming: HashSet<EntryId> = HashSet::new();
    for &(source, target, strength) in edges {
        adjacency.entry(source).or_default().push((target, strength));
        has_incoming.insert(target);
    }

    // Walks start at chain heads; a pure cycle has no head and is skipped,
    // which is fine since cyclic orderings carry no usable direction.
    let mut heads: Vec<EntryId> = adjacency
        .keys()
        .filter(|id| !has_incoming.contains(id))
        .copied()
        .collect();
    heads.sort();

    let mut paths = Vec::new();
    for head in heads {
        let mut walk = vec![head];
        let mut seen: HashSet<EntryId> = [head].into_iter().collect();
        walk_from(head, &adjacency, &mut walk, &mut seen, 1.0, min_nodes, kind, &mut paths);
        if paths.len() >= MAX_PATHS_PER_KIND {
            paths.truncate(MAX_PATHS_PER_KIND);
            break;
        }
    }
    paths
}

#[allow(clippy::too_many_arguments)]
fn walk_from(
    node: EntryId,
    adjacency: &HashMap<EntryId, Vec<(EntryId, f32)>>,
    walk: &mut Vec<EntryId>,
    seen: &mut HashSet<EntryId>,
    confidence: f32,
    min_nodes: usize,
    kind: PathKind,
    out: &mut Vec<InferencePath>,
) {
    let mut extended = false;
    if let Some(next) = adjacency.get(&node) {
        for &(target, strength) in next {
            if out.len() >= MAX_PATHS_PER_KIND {
                return;
            }
            if !seen.insert(target) {
                continue;
            }
            extended = true;
            walk.push(target);
            walk_from(
                target,
                adjacency,
                walk,
                seen,
                confidence * strength,
                min_nodes,
                kind,
                out,
            );
            walk.pop();
            seen.remove(&target);
        }
    }

    // Record only maximal walks that meet the minimum length
    if !extended && walk.len() >= min_nodes {
        out.push(InferencePath {
            kind,
            entry_ids: walk.clone(),
            confidence,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> EntryId {
        EntryId::new()
    }

    fn edge(source: EntryId, target: EntryId, t: RelationType, strength: f32) -> MemoryRelation {
        MemoryRelation::new(source, target, t, strength)
    }

    #[test]
    fn test_causal_chain_with_product_confidence() {
        let (a, b, c) = (id(), id(), id());
        let edges = vec![
            edge(a, b, RelationType::Causes, 0.8),
            edge(b, c, RelationType::Causes, 0.5),
        ];
        let paths = extract_paths(&edges);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].kind, PathKind::CausalChain);
        assert_eq!(paths[0].entry_ids, vec![a, b, c]);
        assert!((paths[0].confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_single_causes_edge_is_a_chain() {
        let (a, b) = (id(), id());
        let paths = extract_paths(&[edge(a, b, RelationType::Causes, 0.7)]);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].entry_ids, vec![a, b]);
    }

    #[test]
    fn test_contradiction_pair() {
        let (a, b) = (id(), id());
        let paths = extract_paths(&[edge(a, b, RelationType::Contradicts, 0.9)]);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].kind, PathKind::ContradictionPair);
        assert_eq!(paths[0].entry_ids, vec![a, b]);
        assert!((paths[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_multi_hop_support_needs_two_edges() {
        let (a, b, c) = (id(), id(), id());
        // One supports edge alone is not a multi-hop path
        assert!(extract_paths(&[edge(a, b, RelationType::Supports, 0.9)]).is_empty());

        let edges = vec![
            edge(a, b, RelationType::Supports, 0.9),
            edge(b, c, RelationType::Supports, 0.8),
        ];
        let paths = extract_paths(&edges);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].kind, PathKind::MultiHopSupport);
        assert_eq!(paths[0].entry_ids, vec![a, b, c]);
    }

    #[test]
    fn test_temporal_after_normalized_into_sequence() {
        let (a, b, c) = (id(), id(), id());
        // a before b, and c after b: normalized order is a, b, c
        let edges = vec![
            edge(a, b, RelationType::TemporalBefore, 0.6),
            edge(c, b, RelationType::TemporalAfter, 0.5),
        ];
        let paths = extract_paths(&edges);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].kind, PathKind::TemporalSequence);
        assert_eq!(paths[0].entry_ids, vec![a, b, c]);
        assert!((paths[0].confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_two_temporal_edges_disagreeing_direction_is_not_a_sequence() {
        let (a, b) = (id(), id());
        let edges = vec![
            edge(a, b, RelationType::TemporalBefore, 0.6),
            edge(a, b, RelationType::TemporalAfter, 0.6),
        ];
        // Normalizes to a->b and b->a: a pure cycle, no head, no sequence
        assert!(extract_paths(&edges).is_empty());
    }

    #[test]
    fn test_mixed_types_do_not_chain_together() {
        let (a, b, c) = (id(), id(), id());
        let edges = vec![
            edge(a, b, RelationType::Causes, 0.9),
            edge(b, c, RelationType::Supports, 0.9),
        ];
        let paths = extract_paths(&edges);
        // Causes chain a->b only; the supports edge is too short on its own
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].kind, PathKind::CausalChain);
        assert_eq!(paths[0].entry_ids, vec![a, b]);
    }

    #[test]
    fn test_cycle_of_causes_terminates() {
        let (a, b) = (id(), id());
        let edges = vec![
            edge(a, b, RelationType::Causes, 0.9),
            edge(b, a, RelationType::Causes, 0.9),
        ];
        // No head node exists, so no chain is reported and nothing loops
        assert!(extract_paths(&edges).is_empty());
    }
}
