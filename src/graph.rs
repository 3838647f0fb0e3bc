//! Owner identity graph.
//!
//! Every contact contributes one `Name` node and one `BizAddress` node, keyed
//! by their canonical strings, and one edge between them carrying the
//! contact's registration. Contacts that share a canonical name or address
//! therefore share a node, and portfolios emerge from plain connectivity
//! without comparing contacts pairwise.
//!
//! Linkage is transitive through connectivity only: if A shares a name with B
//! and B shares an address with C, A and C land in the same component even
//! though nothing scores A and C as the same owner.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use ahash::AHashMap;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use tracing::info;

use crate::normalize::CanonicalIdentity;
use crate::schema::{
    fnv1a_hash, Bbl, ContactRecord, MatchEvidence, OwnerIdentity, OwnerNode, RegistrationInfo,
};

/// Undirected identity graph with a canonical-key index
#[derive(Debug, Default)]
pub struct OwnerGraph {
    graph: UnGraph<OwnerIdentity, MatchEvidence>,
    index: AHashMap<OwnerNode, NodeIndex>,
}

impl OwnerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph over contacts in the given (deterministic) order
    pub fn build(records: &[ContactRecord]) -> Self {
        let mut graph = Self::new();
        for record in records {
            graph.add_contact(record);
        }
        info!(
            contacts = records.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built owner identity graph"
        );
        graph
    }

    /// Add one contact's name and business-address tokens and link them
    pub fn add_contact(&mut self, record: &ContactRecord) {
        let identity = CanonicalIdentity::of(record);
        let name = self.upsert_node(OwnerNode::Name(identity.name), record);
        let address = self.upsert_node(OwnerNode::BizAddress(identity.business_address), record);

        let mut evidence = MatchEvidence::default();
        evidence.registrations.insert(RegistrationInfo {
            reg_id: record.registration_id,
            reg_contact_id: record.registration_contact_id,
        });
        self.insert_edge(name, address, evidence);
    }

    fn upsert_node(&mut self, key: OwnerNode, record: &ContactRecord) -> NodeIndex {
        let idx = match self.index.get(&key) {
            Some(idx) => *idx,
            None => {
                let idx = self.graph.add_node(OwnerIdentity::new(key.clone()));
                self.index.insert(key, idx);
                idx
            }
        };
        let node = &mut self.graph[idx];
        node.registration_ids.insert(record.registration_id);
        node.bbls.extend(record.bbls.iter().cloned());
        idx
    }

    /// Insert an edge, merging evidence into an existing edge between the same
    /// endpoints instead of adding a parallel one
    pub fn insert_edge(&mut self, a: NodeIndex, b: NodeIndex, evidence: MatchEvidence) {
        match self.graph.find_edge(a, b) {
            Some(edge) => self.graph[edge].merge(&evidence),
            None => {
                self.graph.add_edge(a, b, evidence);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node indices in insertion order
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn node(&self, idx: NodeIndex) -> &OwnerIdentity {
        &self.graph[idx]
    }

    pub fn lookup(&self, key: &OwnerNode) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    pub fn evidence(&self, a: NodeIndex, b: NodeIndex) -> Option<&MatchEvidence> {
        self.graph.find_edge(a, b).map(|e| &self.graph[e])
    }

    /// Neighbours in ascending index order
    pub fn neighbors_sorted(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    /// Weighted neighbours (self-loops excluded) in ascending index order
    pub fn weighted_neighbors(&self, idx: NodeIndex) -> Vec<(NodeIndex, f64)> {
        let mut out: Vec<(NodeIndex, f64)> = self
            .graph
            .edges(idx)
            .map(|e| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                (other, e.weight().weight())
            })
            .filter(|(other, _)| *other != idx)
            .collect();
        out.sort_by_key(|(other, _)| *other);
        out
    }

    /// Edges with both endpoints in `members`, as `(low, high, evidence)` in
    /// ascending endpoint order
    ///
    /// Visits only the edges incident to `members`, so rendering every
    /// portfolio touches each edge a constant number of times.
    pub fn edges_within(
        &self,
        members: &BTreeSet<NodeIndex>,
    ) -> Vec<(NodeIndex, NodeIndex, &MatchEvidence)> {
        let mut edges: Vec<_> = members
            .iter()
            .flat_map(|&idx| self.graph.edges(idx).map(move |e| (idx, e)))
            .filter_map(|(idx, e)| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                let (low, high) = if idx <= other { (idx, other) } else { (other, idx) };
                members.contains(&other).then_some((low, high, e.id()))
            })
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
            .into_iter()
            .map(|(low, high, id)| (low, high, &self.graph[id]))
            .collect()
    }

    /// Unique BBLs aggregated over a node set
    pub fn bbls_of<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeIndex>) -> BTreeSet<Bbl> {
        nodes
            .into_iter()
            .flat_map(|idx| self.graph[*idx].bbls.iter().cloned())
            .collect()
    }

    /// Canonical names (Name-node values) over a node set
    pub fn names_of<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeIndex>) -> BTreeSet<String> {
        nodes
            .into_iter()
            .map(|idx| &self.graph[*idx].key)
            .filter(|key| key.is_name())
            .map(|key| key.value().to_string())
            .collect()
    }

    /// Deterministic digest of node identities and edge evidence
    ///
    /// Two graphs built from the same contacts in the same order have the same
    /// fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut text = String::new();
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let _ = writeln!(
                text,
                "n{}:{:?}:{:?}:{:?}",
                idx.index(),
                node.key,
                node.registration_ids,
                node.bbls
            );
        }
        let all: BTreeSet<NodeIndex> = self.graph.node_indices().collect();
        for (a, b, evidence) in self.edges_within(&all) {
            let _ = writeln!(
                text,
                "e{}-{}:{:?}",
                a.index(),
                b.index(),
                evidence.registrations
            );
        }
        format!("{:016x}", fnv1a_hash(&text))
    }
}
