//! Weighted Louvain community detection over a subset of the owner graph.
//!
//! Nodes are visited in ascending index order and neighbour communities in
//! ascending id order, so the same input always yields the same partition.
//! The resolution parameter scales the null-model term: values below 1 favor
//! fewer, larger communities.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::NodeIndex;

use crate::graph::OwnerGraph;

/// Minimum modularity gain for a node move to count as an improvement
const GAIN_EPSILON: f64 = 1e-12;

/// One aggregation level: nodes are communities of the previous level
struct Level {
    adjacency: Vec<BTreeMap<usize, f64>>,
    self_loops: Vec<f64>,
}

impl Level {
    fn degree(&self, u: usize) -> f64 {
        self.adjacency[u].values().sum::<f64>() + 2.0 * self.self_loops[u]
    }

    fn total_weight(&self) -> f64 {
        (0..self.adjacency.len()).map(|u| self.degree(u)).sum::<f64>() / 2.0
    }

    /// Local moving phase; returns each node's community (dense ids) and
    /// whether any node moved
    fn one_level(&self, resolution: f64) -> (Vec<usize>, bool) {
        let n = self.adjacency.len();
        let m = self.total_weight();
        let mut node2com: Vec<usize> = (0..n).collect();
        if m <= 0.0 {
            return (node2com, false);
        }

        let degrees: Vec<f64> = (0..n).map(|u| self.degree(u)).collect();
        let mut stot = degrees.clone();
        let two_m_sq = 2.0 * m * m;
        let mut improved = false;

        loop {
            let mut moves = 0usize;
            for u in 0..n {
                let current = node2com[u];
                let degree = degrees[u];

                let mut weights2com: BTreeMap<usize, f64> = BTreeMap::new();
                for (&v, &w) in &self.adjacency[u] {
                    *weights2com.entry(node2com[v]).or_default() += w;
                }

                stot[current] -= degree;
                let remove_cost = -weights2com.get(&current).copied().unwrap_or(0.0) / m
                    + resolution * stot[current] * degree / two_m_sq;

                let mut best_com = current;
                let mut best_gain = 0.0;
                for (&com, &wt) in &weights2com {
                    let gain = remove_cost + wt / m - resolution * stot[com] * degree / two_m_sq;
                    if gain > best_gain + GAIN_EPSILON {
                        best_gain = gain;
                        best_com = com;
                    }
                }

                stot[best_com] += degree;
                if best_com != current {
                    node2com[u] = best_com;
                    moves += 1;
                    improved = true;
                }
            }
            if moves == 0 {
                break;
            }
        }

        (renumber(&node2com), improved)
    }

    fn aggregate(&self, node2com: &[usize], communities: usize) -> Level {
        let mut adjacency = vec![BTreeMap::new(); communities];
        let mut self_loops = vec![0.0; communities];
        for (u, neighbors) in self.adjacency.iter().enumerate() {
            let cu = node2com[u];
            self_loops[cu] += self.self_loops[u];
            for (&v, &w) in neighbors {
                let cv = node2com[v];
                if cu == cv {
                    // Each internal edge is seen from both endpoints.
                    self_loops[cu] += w / 2.0;
                } else {
                    *adjacency[cu].entry(cv).or_insert(0.0) += w;
                }
            }
        }
        Level {
            adjacency,
            self_loops,
        }
    }
}

/// Map community labels to dense ids in order of first appearance
fn renumber(labels: &[usize]) -> Vec<usize> {
    let mut ids: BTreeMap<usize, usize> = BTreeMap::new();
    labels
        .iter()
        .map(|label| {
            let next = ids.len();
            *ids.entry(*label).or_insert(next)
        })
        .collect()
}

/// Partition `members` into communities by weighted Louvain
///
/// Communities are returned with members in ascending order, sorted by their
/// smallest member. When no move improves modularity on the first level,
/// every member comes back as its own community.
pub fn louvain(graph: &OwnerGraph, members: &[NodeIndex], resolution: f64) -> Vec<Vec<NodeIndex>> {
    let mut nodes: Vec<NodeIndex> = members.to_vec();
    nodes.sort_unstable();
    nodes.dedup();
    if nodes.len() <= 1 {
        return vec![nodes];
    }

    let local: BTreeMap<NodeIndex, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let adjacency: Vec<BTreeMap<usize, f64>> = nodes
        .iter()
        .map(|idx| {
            graph
                .weighted_neighbors(*idx)
                .into_iter()
                .filter_map(|(other, w)| local.get(&other).map(|j| (*j, w)))
                .collect()
        })
        .collect();

    let mut level = Level {
        self_loops: vec![0.0; nodes.len()],
        adjacency,
    };
    // Original nodes held by each node of the current level
    let mut membership: Vec<Vec<usize>> = (0..nodes.len()).map(|i| vec![i]).collect();

    loop {
        let (node2com, improved) = level.one_level(resolution);
        if !improved {
            break;
        }
        let communities = node2com.iter().copied().max().map_or(0, |c| c + 1);
        let mut merged: Vec<Vec<usize>> = vec![Vec::new(); communities];
        for (u, held) in membership.into_iter().enumerate() {
            merged[node2com[u]].extend(held);
        }
        membership = merged;
        level = level.aggregate(&node2com, communities);
    }

    let mut result: Vec<Vec<NodeIndex>> = membership
        .into_iter()
        .map(|held| {
            let mut community: Vec<NodeIndex> = held.into_iter().map(|i| nodes[i]).collect();
            community.sort_unstable();
            community
        })
        .filter(|c| !c.is_empty())
        .collect();
    result.sort_by_key(|c| c[0]);
    result
}

/// Modularity of a partition of `members` at the given resolution
pub fn modularity(graph: &OwnerGraph, partition: &[Vec<NodeIndex>], resolution: f64) -> f64 {
    let members: BTreeSet<NodeIndex> = partition.iter().flatten().copied().collect();
    let edges = graph.edges_within(&members);
    let m: f64 = edges.iter().map(|(_, _, e)| e.weight()).sum();
    if m <= 0.0 {
        return 0.0;
    }

    let mut community_of: BTreeMap<NodeIndex, usize> = BTreeMap::new();
    for (c, community) in partition.iter().enumerate() {
        for node in community {
            community_of.insert(*node, c);
        }
    }

    let mut internal = vec![0.0; partition.len()];
    let mut degree = vec![0.0; partition.len()];
    for (a, b, evidence) in edges {
        let w = evidence.weight();
        let (ca, cb) = (community_of[&a], community_of[&b]);
        degree[ca] += w;
        degree[cb] += w;
        if ca == cb {
            internal[ca] += w;
        }
    }

    internal
        .iter()
        .zip(&degree)
        .map(|(l, d)| l / m - resolution * (d / (2.0 * m)).powi(2))
        .sum()
}
