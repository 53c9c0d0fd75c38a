//! # Graph Engine
//!
//! An in-memory, undirected view of the store used for analytics and for
//! edge admission.
//!
//! The view is rebuilt from a store snapshot on demand and is never kept in
//! sync with later writes, except through [`GraphEngine::add_edge`], which
//! weavers call as they admit edges. Edges are symmetrized at read time:
//! several typed edges between the same pair count as one adjacency.
//!
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.

mod community;

use crate::storage::Store;
use crate::WeftError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// RESULT TYPES
// =============================================================================

/// A proposed link between two non-adjacent nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkCandidate {
    pub source: String,
    pub target: String,
    pub score: f64,
}

/// A node ranked by degree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pillar {
    pub id: String,
    pub degree: usize,
}

/// Shape of the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    /// Distinct undirected adjacencies.
    pub edges: usize,
    pub density: f64,
    pub components: usize,
    pub isolated: usize,
}

// =============================================================================
// GRAPH ENGINE
// =============================================================================

/// Undirected adjacency over node ids.
#[derive(Debug, Clone, Default)]
pub struct GraphEngine {
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl GraphEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the view from every node and edge currently in the store.
    pub fn from_store(store: &Store) -> Result<Self, WeftError> {
        let mut graph = Self::new();
        for node in store.nodes()? {
            graph.add_node(&node.id);
        }
        for edge in store.edges()? {
            graph.add_edge(&edge.source, &edge.target);
        }
        tracing::debug!(nodes = graph.node_count(), edges = graph.edge_count(), "graph snapshot built");
        Ok(graph)
    }

    pub fn add_node(&mut self, id: &str) {
        if !self.adjacency.contains_key(id) {
            self.adjacency.insert(id.to_string(), BTreeSet::new());
        }
    }

    /// Record an adjacency. Unknown endpoints are added; self loops are ignored.
    pub fn add_edge(&mut self, a: &str, b: &str) {
        self.add_node(a);
        self.add_node(b);
        if a == b {
            return;
        }
        if let Some(set) = self.adjacency.get_mut(a) {
            set.insert(b.to_string());
        }
        if let Some(set) = self.adjacency.get_mut(b) {
            set.insert(a.to_string());
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Number of distinct neighbours (0 for unknown nodes).
    #[must_use]
    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map_or(0, BTreeSet::len)
    }

    /// Neighbours in id order.
    pub fn neighbors(&self, id: &str) -> impl Iterator<Item = &str> + '_ {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    #[must_use]
    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        self.adjacency.get(a).is_some_and(|set| set.contains(b))
    }

    /// Whether `a` and `b` have at least one common neighbour.
    #[must_use]
    pub fn shares_neighbor(&self, a: &str, b: &str) -> bool {
        match (self.adjacency.get(a), self.adjacency.get(b)) {
            (Some(x), Some(y)) => x.intersection(y).any(|w| w != a && w != b),
            _ => false,
        }
    }

    // =========================================================================
    // LINK PREDICTION
    // =========================================================================

    /// Adamic-Adar index: sum over common neighbours `w` of `1 / ln(deg(w))`.
    #[must_use]
    pub fn adamic_adar(&self, u: &str, v: &str) -> f64 {
        if u == v {
            return 0.0;
        }
        let (Some(x), Some(y)) = (self.adjacency.get(u), self.adjacency.get(v)) else {
            return 0.0;
        };
        x.intersection(y)
            .map(|w| inverse_log_degree(self.degree(w)))
            .sum()
    }

    /// Highest-scoring non-adjacent pairs by Adamic-Adar, best first.
    ///
    /// Only pairs with a common neighbour can score, so candidates are
    /// enumerated through each node's neighbourhood. Ties are ordered by
    /// `(source, target)`.
    #[must_use]
    pub fn find_structural_candidates(&self, limit: usize) -> Vec<LinkCandidate> {
        let mut scores: BTreeMap<(&str, &str), f64> = BTreeMap::new();
        for neighbors in self.adjacency.values() {
            let weight = inverse_log_degree(neighbors.len());
            if weight == 0.0 {
                continue;
            }
            let list: Vec<&str> = neighbors.iter().map(String::as_str).collect();
            for (i, a) in list.iter().enumerate() {
                for b in &list[i + 1..] {
                    if !self.are_adjacent(a, b) {
                        *scores.entry((*a, *b)).or_insert(0.0) += weight;
                    }
                }
            }
        }

        let mut candidates: Vec<LinkCandidate> = scores
            .into_iter()
            .map(|((source, target), score)| LinkCandidate {
                source: source.to_string(),
                target: target.to_string(),
                score,
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
        });
        candidates.truncate(limit);
        candidates
    }

    // =========================================================================
    // CENTRALITY
    // =========================================================================

    /// Nodes by degree, highest first, ties by id.
    #[must_use]
    pub fn find_pillars(&self, limit: usize) -> Vec<Pillar> {
        let mut pillars: Vec<Pillar> = self
            .adjacency
            .iter()
            .map(|(id, set)| Pillar {
                id: id.clone(),
                degree: set.len(),
            })
            .collect();
        pillars.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.id.cmp(&b.id)));
        pillars.truncate(limit);
        pillars
    }

    // =========================================================================
    // TRAVERSAL
    // =========================================================================

    /// Fewest-hop undirected path, endpoints included.
    #[must_use]
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.to_string()]);
        }

        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
        let mut queue = VecDeque::from([from]);
        parent.insert(from, from);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if parent.contains_key(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut step = to;
                    while let Some(&prev) = parent.get(step) {
                        if prev == step {
                            break;
                        }
                        path.push(prev.to_string());
                        step = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Connected components, each sorted, ordered by their smallest id.
    #[must_use]
    pub fn connected_components(&self) -> Vec<Vec<String>> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut components = Vec::new();

        for start in self.adjacency.keys() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = vec![start.clone()];
            let mut queue = VecDeque::from([start.as_str()]);
            while let Some(current) = queue.pop_front() {
                for next in self.neighbors(current) {
                    if seen.insert(next) {
                        component.push(next.to_string());
                        queue.push_back(next);
                    }
                }
            }
            component.sort();
            components.push(component);
        }
        components
    }

    // =========================================================================
    // COMMUNITIES
    // =========================================================================

    /// Community index of every node (Louvain, see [`community`]).
    #[must_use]
    pub fn community_membership(&self, resolution: f64) -> BTreeMap<String, u64> {
        let (ids, neighbors) = self.indexed();
        let membership = community::louvain(&neighbors, resolution);
        ids.into_iter()
            .zip(membership)
            .map(|(id, c)| (id.to_string(), c as u64))
            .collect()
    }

    /// Communities keyed by id, members sorted.
    #[must_use]
    pub fn communities(&self, resolution: f64) -> BTreeMap<u64, Vec<String>> {
        let mut groups: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for (id, community) in self.community_membership(resolution) {
            groups.entry(community).or_default().push(id);
        }
        groups
    }

    /// Modularity of a partition. Nodes missing from `membership` count as
    /// singletons.
    #[must_use]
    pub fn modularity(&self, membership: &BTreeMap<String, u64>, resolution: f64) -> f64 {
        let (ids, neighbors) = self.indexed();
        let mut next = membership.values().max().map_or(0, |m| m + 1);
        let labels: Vec<usize> = ids
            .iter()
            .map(|id| match membership.get(*id) {
                Some(c) => *c as usize,
                None => {
                    next += 1;
                    (next - 1) as usize
                }
            })
            .collect();
        community::modularity(&neighbors, &labels, resolution)
    }

    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let nodes = self.node_count();
        let edges = self.edge_count();
        let density = if nodes > 1 {
            (2 * edges) as f64 / (nodes * (nodes - 1)) as f64
        } else {
            0.0
        };
        GraphStats {
            nodes,
            edges,
            density,
            components: self.connected_components().len(),
            isolated: self.adjacency.values().filter(|s| s.is_empty()).count(),
        }
    }

    /// Ids in order and neighbour lists by index.
    fn indexed(&self) -> (Vec<&str>, Vec<Vec<usize>>) {
        let ids: Vec<&str> = self.adjacency.keys().map(String::as_str).collect();
        let index: BTreeMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let neighbors = self
            .adjacency
            .values()
            .map(|set| set.iter().filter_map(|n| index.get(n.as_str()).copied()).collect())
            .collect();
        (ids, neighbors)
    }
}

fn inverse_log_degree(degree: usize) -> f64 {
    if degree > 1 {
        1.0 / (degree as f64).ln()
    } else {
        0.0
    }
}

// =============================================================================
// TESTS
// =============================================================================
