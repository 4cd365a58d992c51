//! Bounded breadth-first graph expansion.
//!
//! The per-node edge cap is the load-bearing control here: one high-degree
//! node (an entry everything links to) would otherwise blow the frontier
//! up combinatorially. Edges compete for a node's slots by
//! `strength x time_decay(edge_age)`, so strong recent edges win.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relmem_store::{MemoryStore, time_decay};
use relmem_types::{EntryId, MemoryRelation, RelationId, RelationType, now};
use tracing::debug;

use crate::error::Result;

/// Bounds for one expansion run.
#[derive(Debug, Clone)]
pub struct ExpansionParams {
    pub max_depth: u32,
    pub max_edges_per_node: usize,
    /// Edge-age half life in days for slot competition.
    pub half_life_days: f32,
    /// Wall-clock budget; exceeding it truncates the frontier.
    pub budget: Duration,
    /// When set, only these relation types are walked.
    pub type_filter: Option<HashSet<RelationType>>,
}

/// The expanded neighborhood: nodes with their BFS depth, plus the edges
/// that were walked.
#[derive(Debug, Default)]
pub struct Subgraph {
    pub depths: HashMap<EntryId, u32>,
    pub edges: Vec<MemoryRelation>,
}

/// Expand breadth-first from the seed set.
pub fn expand(store: &Arc<MemoryStore>, seeds: &[EntryId], params: &ExpansionParams) -> Result<Subgraph> {
    let started = Instant::now();
    let at = now();

    let mut subgraph = Subgraph::default();
    let mut seen_edges: HashSet<RelationId> = HashSet::new();
    let mut queue: VecDeque<(EntryId, u32)> = VecDeque::new();

    for &seed in seeds {
        if subgraph.depths.insert(seed, 0).is_none() {
            queue.push_back((seed, 0));
        }
    }

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= params.max_depth {
            continue;
        }
        if started.elapsed() > params.budget {
            debug!(
                "Expansion budget exhausted after {:?}, truncating frontier ({} nodes queued)",
                params.budget,
                queue.len() + 1
            );
            break;
        }

        let mut edges = store.relations_touching(node)?;
        if let Some(filter) = &params.type_filter {
            edges.retain(|e| filter.contains(&e.relation_type));
        }

        // Slot competition: strongest decayed edges first
        edges.sort_by(|a, b| {
            decayed_weight(b, at, params.half_life_days)
                .partial_cmp(&decayed_weight(a, at, params.half_life_days))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        edges.truncate(params.max_edges_per_node);

        for edge in edges {
            let neighbor = if edge.source_id == node {
                edge.target_id
            } else {
                edge.source_id
            };

            if seen_edges.insert(edge.id) {
                subgraph.edges.push(edge);
            }
            if !subgraph.depths.contains_key(&neighbor) {
                subgraph.depths.insert(neighbor, depth + 1);
                queue.push_back((neighbor, depth + 1));
            }
        }
    }

    debug!(
        "Expanded {} seeds into {} nodes / {} edges",
        seeds.len(),
        subgraph.depths.len(),
        subgraph.edges.len()
    );
    Ok(subgraph)
}

fn decayed_weight(edge: &MemoryRelation, at: relmem_types::Timestamp, half_life_days: f32) -> f32 {
    let age_days = (at - edge.created_at).num_seconds().max(0) as f32 / 86_400.0;
    edge.strength * time_decay(age_days, half_life_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_types::{ContentType, MemoryEntry, Scope};

    fn test_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::open_in_memory(4).unwrap())
    }

    fn commit(store: &MemoryStore, content: &str) -> MemoryEntry {
        let e = MemoryEntry::new(ContentType::Fact, content, 0.9, Scope::new("acme"));
        store.commit_entry(&e, &[1.0, 0.0, 0.0, 0.0], None).unwrap();
        e
    }

    fn link(store: &MemoryStore, a: &MemoryEntry, b: &MemoryEntry, strength: f32) {
        store
            .insert_relation(&MemoryRelation::new(
                a.id,
                b.id,
                RelationType::Supports,
                strength,
            ))
            .unwrap();
    }

    fn params(max_depth: u32, max_edges: usize) -> ExpansionParams {
        ExpansionParams {
            max_depth,
            max_edges_per_node: max_edges,
            half_life_days: 90.0,
            budget: Duration::from_secs(5),
            type_filter: None,
        }
    }

    #[test]
    fn test_depth_zero_returns_seeds_only() {
        let store = test_store();
        let a = commit(&store, "a");
        let b = commit(&store, "b");
        link(&store, &a, &b, 0.9);

        let sub = expand(&store, &[a.id], &params(0, 10)).unwrap();
        assert_eq!(sub.depths.len(), 1);
        assert!(sub.edges.is_empty());
    }

    #[test]
    fn test_bfs_depth_tracking() {
        let store = test_store();
        let a = commit(&store, "a");
        let b = commit(&store, "b");
        let c = commit(&store, "c");
        link(&store, &a, &b, 0.9);
        link(&store, &b, &c, 0.9);

        let sub = expand(&store, &[a.id], &params(2, 10)).unwrap();
        assert_eq!(sub.depths[&a.id], 0);
        assert_eq!(sub.depths[&b.id], 1);
        assert_eq!(sub.depths[&c.id], 2);
        assert_eq!(sub.edges.len(), 2);

        // Depth 1 stops before c
        let sub = expand(&store, &[a.id], &params(1, 10)).unwrap();
        assert!(!sub.depths.contains_key(&c.id));
    }

    #[test]
    fn test_degree_cap_keeps_strongest_edges() {
        let store = test_store();
        let hub = commit(&store, "hub");

        let mut spokes = Vec::new();
        for i in 0..20 {
            let s = commit(&store, &format!("spoke {i}"));
            // Strength rises with i, so the last spokes are the keepers
            link(&store, &hub, &s, 0.05 * i as f32);
            spokes.push(s);
        }

        let sub = expand(&store, &[hub.id], &params(1, 5)).unwrap();
        assert_eq!(sub.edges.len(), 5);
        let min_kept = sub.edges.iter().map(|e| e.strength).fold(f32::MAX, f32::min);
        assert!(min_kept >= 0.05 * 15.0);
    }

    #[test]
    fn test_cycle_does_not_loop() {
        let store = test_store();
        let a = commit(&store, "a");
        let b = commit(&store, "b");
        link(&store, &a, &b, 0.9);
        link(&store, &b, &a, 0.8);

        let sub = expand(&store, &[a.id], &params(10, 10)).unwrap();
        assert_eq!(sub.depths.len(), 2);
        assert_eq!(sub.edges.len(), 2);
    }

    #[test]
    fn test_type_filter_restricts_walk() {
        let store = test_store();
        let a = commit(&store, "a");
        let b = commit(&store, "b");
        let c = commit(&store, "c");
        link(&store, &a, &b, 0.9);
        store
            .insert_relation(&MemoryRelation::new(a.id, c.id, RelationType::Causes, 0.9))
            .unwrap();

        let mut p = params(2, 10);
        p.type_filter = Some([RelationType::Causes].into_iter().collect());
        let sub = expand(&store, &[a.id], &p).unwrap();
        assert!(sub.depths.contains_key(&c.id));
        assert!(!sub.depths.contains_key(&b.id));
    }

    #[test]
    fn test_zero_budget_truncates_to_seeds() {
        let store = test_store();
        let a = commit(&store, "a");
        let b = commit(&store, "b");
        link(&store, &a, &b, 0.9);

        let mut p = params(3, 10);
        p.budget = Duration::ZERO;
        let sub = expand(&store, &[a.id], &p).unwrap();
        assert_eq!(sub.depths.len(), 1);
    }
}
