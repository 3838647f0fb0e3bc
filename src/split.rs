//! Portfolio discovery: connected components, split down to a size bound.
//!
//! Components are numbered by discovery order. A component holding more than
//! `max_size` unique BBLs is partitioned with Louvain and every resulting
//! community is rechecked, using an explicit worklist rather than recursion.
//! When the partitioner hands back a community as large as its parent the
//! split is degenerate: that community is accepted as a terminal portfolio
//! and logged.

use std::collections::{BTreeSet, VecDeque};

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::community::louvain;
use crate::graph::OwnerGraph;
use crate::schema::{Bbl, PortfolioId};

/// Splitter settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    pub max_size: usize,
    pub resolution: f64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_size: 300,
            resolution: 0.1,
        }
    }
}

/// Why a portfolio was not split further
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitTerminal {
    /// At or under the size bound
    WithinBound,
    /// Over the bound, but the partitioner could not divide it
    DegenerateSplit,
}

/// A connected component, or one community split out of it
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioComponent {
    /// Discovery-order id of the connected component this came from
    pub orig_id: u32,
    /// Unique id: `orig_id`, or `parent.child` for split communities
    pub portfolio_id: PortfolioId,
    /// Member nodes in ascending index order
    pub nodes: Vec<NodeIndex>,
    pub bbls: BTreeSet<Bbl>,
    pub landlord_names: BTreeSet<String>,
    pub terminal: SplitTerminal,
}

impl PortfolioComponent {
    pub fn size(&self) -> usize {
        self.bbls.len()
    }
}

/// Connected components in discovery order
///
/// Start nodes are taken in insertion order and neighbours are visited in
/// ascending index order; each component's nodes are returned sorted.
/// `petgraph::algo::connected_components` only counts components and
/// `UnionFind` labels them by representative, so neither yields members in
/// discovery order, which numbers the portfolios.
pub fn connected_components(graph: &OwnerGraph) -> Vec<Vec<NodeIndex>> {
    let mut visited = vec![false; graph.node_count()];
    let mut components = Vec::new();

    for start in graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        visited[start.index()] = true;
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            component.push(current);
            for neighbor in graph.neighbors_sorted(current) {
                if !visited[neighbor.index()] {
                    visited[neighbor.index()] = true;
                    queue.push_back(neighbor);
                }
            }
        }

        component.sort_unstable();
        components.push(component);
    }

    components
}

/// Split stats for logging and batch reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitStats {
    pub components: usize,
    pub oversized_components: usize,
    pub portfolios: usize,
    pub degenerate_splits: usize,
}

/// Find components and split oversized ones into bounded portfolios
pub fn split_portfolios(
    graph: &OwnerGraph,
    options: &SplitOptions,
) -> (Vec<PortfolioComponent>, SplitStats) {
    let components = connected_components(graph);
    let mut stats = SplitStats {
        components: components.len(),
        ..Default::default()
    };
    let mut portfolios = Vec::new();

    for (orig_id, nodes) in (1u32..).zip(components) {
        let bbls = graph.bbls_of(&nodes);
        if bbls.len() > options.max_size {
            stats.oversized_components += 1;
        }
        split_component(
            graph,
            options,
            PortfolioId::root(orig_id),
            nodes,
            bbls,
            &mut portfolios,
            &mut stats,
        );
    }

    stats.portfolios = portfolios.len();
    info!(
        components = stats.components,
        oversized = stats.oversized_components,
        portfolios = stats.portfolios,
        degenerate_splits = stats.degenerate_splits,
        "Split components into portfolios"
    );
    (portfolios, stats)
}

/// Pending worklist entry
enum Work {
    Check(PortfolioId, Vec<NodeIndex>, BTreeSet<Bbl>),
    Done(PortfolioComponent),
}

fn split_component(
    graph: &OwnerGraph,
    options: &SplitOptions,
    id: PortfolioId,
    nodes: Vec<NodeIndex>,
    bbls: BTreeSet<Bbl>,
    out: &mut Vec<PortfolioComponent>,
    stats: &mut SplitStats,
) {
    let finish = |id: PortfolioId,
                  nodes: Vec<NodeIndex>,
                  bbls: BTreeSet<Bbl>,
                  terminal: SplitTerminal| PortfolioComponent {
        orig_id: id.root,
        landlord_names: graph.names_of(&nodes),
        portfolio_id: id,
        nodes,
        bbls,
        terminal,
    };

    // Children are pushed in reverse so they pop in community order and the
    // output stays in discovery order.
    let mut worklist = vec![Work::Check(id, nodes, bbls)];

    while let Some(work) = worklist.pop() {
        let (id, nodes, bbls) = match work {
            Work::Done(component) => {
                out.push(component);
                continue;
            }
            Work::Check(id, nodes, bbls) => (id, nodes, bbls),
        };

        if bbls.len() <= options.max_size {
            out.push(finish(id, nodes, bbls, SplitTerminal::WithinBound));
            continue;
        }

        let parent_size = bbls.len();
        let communities = louvain(graph, &nodes, options.resolution);
        debug!(
            portfolio = %id,
            size = parent_size,
            communities = communities.len(),
            "Partitioned oversized portfolio"
        );

        let mut children = Vec::with_capacity(communities.len());
        for (child_index, community) in (1u32..).zip(communities) {
            let child_id = id.child(child_index);
            let child_bbls = graph.bbls_of(&community);
            if child_bbls.len() == parent_size {
                warn!(
                    portfolio = %child_id,
                    size = parent_size,
                    max_size = options.max_size,
                    "Degenerate split, accepting oversized portfolio as terminal"
                );
                stats.degenerate_splits += 1;
                children.push(Work::Done(finish(
                    child_id,
                    community,
                    child_bbls,
                    SplitTerminal::DegenerateSplit,
                )));
            } else {
                children.push(Work::Check(child_id, community, child_bbls));
            }
        }
        worklist.extend(children.into_iter().rev());
    }
}
