//! Louvain community detection over an undirected, unit-weight graph.
//!
//! Nodes are visited in index order and ties between candidate communities
//! go to the lowest community index, so a fixed input always yields the same
//! partition. Nodes only ever move into a neighbouring community: isolated
//! nodes stay singletons and separate components are never merged.

use crate::primitives::MAX_LOUVAIN_LEVELS;
use std::collections::BTreeMap;

/// Local-move passes per level before forcing aggregation.
const MAX_PASSES: usize = 64;

/// Minimum modularity gain for a move.
const GAIN_EPSILON: f64 = 1e-12;

/// Weighted graph of one Louvain level. Self loops are kept apart from the
/// neighbour lists.
struct WeightedGraph {
    adjacency: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
    degrees: Vec<f64>,
}

impl WeightedGraph {
    fn from_unweighted(neighbors: &[Vec<usize>]) -> Self {
        let adjacency: Vec<Vec<(usize, f64)>> = neighbors
            .iter()
            .enumerate()
            .map(|(node, list)| {
                list.iter()
                    .filter(|&&n| n != node)
                    .map(|&n| (n, 1.0))
                    .collect()
            })
            .collect();
        let degrees = adjacency.iter().map(|l| l.len() as f64).collect();
        Self {
            self_loops: vec![0.0; neighbors.len()],
            adjacency,
            degrees,
        }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Greedy local moves. Returns the community of every node and whether
    /// any node moved.
    fn one_level(&self, resolution: f64) -> (Vec<usize>, bool) {
        let mut community: Vec<usize> = (0..self.len()).collect();
        let m2: f64 = self.degrees.iter().sum();
        if m2 <= 0.0 {
            return (community, false);
        }

        let mut totals = self.degrees.clone();
        let mut improved = false;
        for _ in 0..MAX_PASSES {
            let mut moved = false;
            for (node, edges) in self.adjacency.iter().enumerate() {
                let current = community[node];
                let k = self.degrees[node];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(neighbor, weight) in edges {
                    *links.entry(community[neighbor]).or_insert(0.0) += weight;
                }

                totals[current] -= k;
                let gain = |c: usize, w: f64| w - resolution * totals[c] * k / m2;
                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                for (&candidate, &weight) in &links {
                    let g = gain(candidate, weight);
                    if g > best_gain + GAIN_EPSILON {
                        best = candidate;
                        best_gain = g;
                    }
                }
                totals[best] += k;

                if best != current {
                    community[node] = best;
                    moved = true;
                    improved = true;
                }
            }
            if !moved {
                break;
            }
        }
        (community, improved)
    }

    /// Collapse each community into one node. Internal weight becomes a
    /// self loop.
    fn aggregate(&self, community: &[usize], count: usize) -> Self {
        let mut weights: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut self_loops = vec![0.0; count];

        for (node, edges) in self.adjacency.iter().enumerate() {
            let c = community[node];
            self_loops[c] += self.self_loops[node];
            for &(neighbor, weight) in edges {
                if neighbor <= node {
                    continue;
                }
                let d = community[neighbor];
                if c == d {
                    self_loops[c] += weight;
                } else {
                    *weights[c].entry(d).or_insert(0.0) += weight;
                    *weights[d].entry(c).or_insert(0.0) += weight;
                }
            }
        }

        let adjacency: Vec<Vec<(usize, f64)>> = weights
            .into_iter()
            .map(|w| w.into_iter().collect())
            .collect();
        let degrees = adjacency
            .iter()
            .zip(&self_loops)
            .map(|(edges, own)| edges.iter().map(|(_, w)| w).sum::<f64>() + 2.0 * own)
            .collect();
        Self {
            adjacency,
            self_loops,
            degrees,
        }
    }
}

/// Relabel to `0..count` in order of first appearance.
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    let relabeled = labels
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect();
    (relabeled, mapping.len())
}

/// Partition nodes `0..neighbors.len()`. Returns a community index per node,
/// numbered in order of first appearance.
pub(crate) fn louvain(neighbors: &[Vec<usize>], resolution: f64) -> Vec<usize> {
    let mut membership: Vec<usize> = (0..neighbors.len()).collect();
    let mut level = WeightedGraph::from_unweighted(neighbors);

    for depth in 0..MAX_LOUVAIN_LEVELS {
        let (assignment, moved) = level.one_level(resolution);
        if !moved {
            tracing::debug!(levels = depth, "louvain converged");
            break;
        }
        let (relabeled, count) = renumber(&assignment);
        for member in &mut membership {
            *member = relabeled[*member];
        }
        level = level.aggregate(&relabeled, count);
    }

    renumber(&membership).0
}

/// Modularity of a partition of the unit-weight graph.
pub(crate) fn modularity(neighbors: &[Vec<usize>], membership: &[usize], resolution: f64) -> f64 {
    let mut internal: BTreeMap<usize, f64> = BTreeMap::new();
    let mut totals: BTreeMap<usize, f64> = BTreeMap::new();
    let mut m = 0.0;

    for (node, list) in neighbors.iter().enumerate() {
        let c = membership[node];
        *totals.entry(c).or_insert(0.0) += list.len() as f64;
        for &neighbor in list {
            if neighbor > node {
                m += 1.0;
                if membership[neighbor] == c {
                    *internal.entry(c).or_insert(0.0) += 1.0;
                }
            }
        }
    }
    if m == 0.0 {
        return 0.0;
    }

    totals
        .iter()
        .map(|(c, tot)| {
            let inside = internal.get(c).copied().unwrap_or(0.0);
            inside / m - resolution * (tot / (2.0 * m)).powi(2)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undirected(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); n];
        for &(a, b) in edges {
            adj[a].push(b);
            adj[b].push(a);
        }
        for list in &mut adj {
            list.sort_unstable();
            list.dedup();
        }
        adj
    }

    #[test]
    fn two_triangles_with_a_bridge_split_in_two() {
        let adj = undirected(6, &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)]);
        let membership = louvain(&adj, 1.0);
        assert_eq!(membership, vec![0, 0, 0, 1, 1, 1]);
        assert!(modularity(&adj, &membership, 1.0) > 0.3);
    }

    #[test]
    fn isolated_nodes_are_singletons() {
        let adj = undirected(4, &[(0, 1)]);
        let membership = louvain(&adj, 1.0);
        assert_eq!(membership[0], membership[1]);
        assert_ne!(membership[2], membership[3]);
        assert_ne!(membership[2], membership[0]);
    }

    #[test]
    fn components_are_never_merged() {
        let adj = undirected(4, &[(0, 1), (2, 3)]);
        let membership = louvain(&adj, 1.0);
        assert_eq!(membership, vec![0, 0, 1, 1]);
    }

    #[test]
    fn empty_graph() {
        assert!(louvain(&[], 1.0).is_empty());
        assert_eq!(modularity(&[], &[], 1.0), 0.0);
    }

    #[test]
    fn detection_is_deterministic() {
        let adj = undirected(
            8,
            &[(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 5), (5, 3), (5, 6), (6, 7), (7, 5)],
        );
        assert_eq!(louvain(&adj, 1.0), louvain(&adj, 1.0));
    }

    #[test]
    fn renumber_follows_first_appearance() {
        assert_eq!(renumber(&[5, 5, 2, 7, 2]), (vec![0, 0, 1, 2, 1], 3));
    }
}
