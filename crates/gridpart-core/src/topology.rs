//! Heterogeneous grid topology.
//!
//! A power grid is modeled as a typed multigraph: nodes are grouped by
//! type label (e.g. `"bus"`, `"gen"`), edges are grouped by a
//! source/relation/destination key (e.g. `bus__connects__bus`). Node
//! indices are local within a type; a deterministic offset table maps
//! them into a single global index space `0..total_nodes` used by the
//! partition assignment, the action space, and attention aggregation.
//!
//! The flattened (untyped) adjacency is kept as a petgraph `UnGraph` so
//! boundary detection and per-region connectivity checks are plain graph
//! walks.

use std::collections::BTreeMap;
use std::fmt;

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

/// Typed key identifying a heterogeneous edge type.
///
/// The composed textual form `src__relation__dst` is the canonical key
/// used by encoder-side attention tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeTypeKey {
    /// Source node type
    pub src: String,
    /// Relation label
    pub relation: String,
    /// Destination node type
    pub dst: String,
}

impl EdgeTypeKey {
    pub fn new(
        src: impl Into<String>,
        relation: impl Into<String>,
        dst: impl Into<String>,
    ) -> Self {
        Self {
            src: src.into(),
            relation: relation.into(),
            dst: dst.into(),
        }
    }

    /// Canonical composed form: `src__relation__dst`.
    pub fn composed(&self) -> String {
        format!("{}__{}__{}", self.src, self.relation, self.dst)
    }
}

impl fmt::Display for EdgeTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}__{}", self.src, self.relation, self.dst)
    }
}

/// One typed edge list: local endpoint pairs plus a coupling weight per
/// edge (branch admittance magnitude or similar inter-node strength).
#[derive(Debug, Clone)]
pub struct EdgeList {
    pub key: EdgeTypeKey,
    /// (src local index, dst local index) per edge
    pub endpoints: Vec<(usize, usize)>,
    /// Coupling weight per edge, same length as `endpoints`
    pub weights: Vec<f64>,
}

impl EdgeList {
    pub fn num_edges(&self) -> usize {
        self.endpoints.len()
    }
}

/// Builder for [`GridTopology`].
#[derive(Debug, Default)]
pub struct GridTopologyBuilder {
    node_counts: BTreeMap<String, usize>,
    edges: Vec<EdgeList>,
    load_mw: BTreeMap<(String, usize), f64>,
    generation_mw: BTreeMap<(String, usize), f64>,
}

impl GridTopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node type with `count` nodes.
    pub fn add_node_type(mut self, node_type: impl Into<String>, count: usize) -> Self {
        self.node_counts.insert(node_type.into(), count);
        self
    }

    /// Set the load (MW) attached to a node, identified by type and local index.
    pub fn set_load(mut self, node_type: impl Into<String>, local: usize, mw: f64) -> Self {
        self.load_mw.insert((node_type.into(), local), mw);
        self
    }

    /// Set the generation capacity (MW) attached to a node.
    pub fn set_generation(mut self, node_type: impl Into<String>, local: usize, mw: f64) -> Self {
        self.generation_mw.insert((node_type.into(), local), mw);
        self
    }

    /// Add a typed edge list. `weights` may be empty, in which case every
    /// edge gets unit coupling weight.
    pub fn add_edge_type(
        mut self,
        key: EdgeTypeKey,
        endpoints: Vec<(usize, usize)>,
        weights: Vec<f64>,
    ) -> Self {
        let weights = if weights.is_empty() {
            vec![1.0; endpoints.len()]
        } else {
            weights
        };
        self.edges.push(EdgeList {
            key,
            endpoints,
            weights,
        });
        self
    }

    pub fn build(self) -> GridResult<GridTopology> {
        if self.node_counts.is_empty() {
            return Err(GridError::Topology("no node types declared".to_string()));
        }

        // Global offsets follow node-type lexical order, so the mapping is
        // deterministic for a given set of type labels.
        let mut offsets = BTreeMap::new();
        let mut total_nodes = 0usize;
        for (node_type, &count) in &self.node_counts {
            offsets.insert(node_type.clone(), total_nodes);
            total_nodes += count;
        }

        let mut load_mw = vec![0.0; total_nodes];
        for ((node_type, local), mw) in &self.load_mw {
            let global = global_index(&offsets, &self.node_counts, node_type, *local)?;
            load_mw[global] = *mw;
        }
        let mut generation_mw = vec![0.0; total_nodes];
        for ((node_type, local), mw) in &self.generation_mw {
            let global = global_index(&offsets, &self.node_counts, node_type, *local)?;
            generation_mw[global] = *mw;
        }

        // Flattened undirected adjacency over global indices.
        let mut graph = UnGraph::<usize, f64>::default();
        let node_indices: Vec<NodeIndex> = (0..total_nodes).map(|i| graph.add_node(i)).collect();

        for list in &self.edges {
            if list.weights.len() != list.endpoints.len() {
                return Err(GridError::Topology(format!(
                    "edge type {}: {} weights for {} edges",
                    list.key,
                    list.weights.len(),
                    list.endpoints.len()
                )));
            }
            for (i, &(src, dst)) in list.endpoints.iter().enumerate() {
                let src_global = global_index(&offsets, &self.node_counts, &list.key.src, src)?;
                let dst_global = global_index(&offsets, &self.node_counts, &list.key.dst, dst)?;
                graph.add_edge(
                    node_indices[src_global],
                    node_indices[dst_global],
                    list.weights[i],
                );
            }
        }

        Ok(GridTopology {
            node_counts: self.node_counts,
            offsets,
            total_nodes,
            edges: self.edges,
            load_mw,
            generation_mw,
            graph,
            node_indices,
        })
    }
}

fn global_index(
    offsets: &BTreeMap<String, usize>,
    counts: &BTreeMap<String, usize>,
    node_type: &str,
    local: usize,
) -> GridResult<usize> {
    let offset = offsets
        .get(node_type)
        .ok_or_else(|| GridError::Topology(format!("unknown node type '{node_type}'")))?;
    let count = counts[node_type];
    if local >= count {
        return Err(GridError::Topology(format!(
            "local index {local} out of range for node type '{node_type}' ({count} nodes)"
        )));
    }
    Ok(offset + local)
}

/// Immutable grid topology shared by the partition state, the action
/// space, the evaluator, and attention aggregation.
#[derive(Debug)]
pub struct GridTopology {
    node_counts: BTreeMap<String, usize>,
    offsets: BTreeMap<String, usize>,
    total_nodes: usize,
    edges: Vec<EdgeList>,
    load_mw: Vec<f64>,
    generation_mw: Vec<f64>,
    graph: UnGraph<usize, f64>,
    node_indices: Vec<NodeIndex>,
}

impl GridTopology {
    pub fn builder() -> GridTopologyBuilder {
        GridTopologyBuilder::new()
    }

    pub fn total_nodes(&self) -> usize {
        self.total_nodes
    }

    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.node_counts.keys().map(String::as_str)
    }

    pub fn node_count(&self, node_type: &str) -> Option<usize> {
        self.node_counts.get(node_type).copied()
    }

    pub fn edge_types(&self) -> impl Iterator<Item = &EdgeTypeKey> {
        self.edges.iter().map(|e| &e.key)
    }

    pub fn edge_lists(&self) -> &[EdgeList] {
        &self.edges
    }

    /// Map a local index within a node type to the global index space.
    pub fn local_to_global(&self, local: usize, node_type: &str) -> GridResult<usize> {
        global_index(&self.offsets, &self.node_counts, node_type, local)
    }

    /// Global node mapping: node type -> (offset, count).
    pub fn global_node_mapping(&self) -> BTreeMap<String, (usize, usize)> {
        self.node_counts
            .iter()
            .map(|(ty, &count)| (ty.clone(), (self.offsets[ty], count)))
            .collect()
    }

    pub fn load_mw(&self, global: usize) -> f64 {
        self.load_mw[global]
    }

    pub fn generation_mw(&self, global: usize) -> f64 {
        self.generation_mw[global]
    }

    /// Neighbors of a node in the flattened adjacency (global indices).
    pub fn neighbors(&self, global: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph
            .neighbors(self.node_indices[global])
            .map(|n| self.graph[n])
    }

    /// Degree of a node in the flattened adjacency.
    pub fn degree(&self, global: usize) -> usize {
        self.graph.neighbors(self.node_indices[global]).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_type_topology() -> GridTopology {
        GridTopology::builder()
            .add_node_type("bus", 3)
            .add_node_type("gen", 2)
            .add_edge_type(
                EdgeTypeKey::new("bus", "connects", "bus"),
                vec![(0, 1), (1, 2)],
                vec![2.0, 3.0],
            )
            .add_edge_type(
                EdgeTypeKey::new("gen", "feeds", "bus"),
                vec![(0, 0), (1, 2)],
                vec![],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn offsets_follow_lexical_type_order() {
        let topo = two_type_topology();
        // "bus" < "gen" lexically
        assert_eq!(topo.local_to_global(0, "bus").unwrap(), 0);
        assert_eq!(topo.local_to_global(2, "bus").unwrap(), 2);
        assert_eq!(topo.local_to_global(0, "gen").unwrap(), 3);
        assert_eq!(topo.local_to_global(1, "gen").unwrap(), 4);
        assert_eq!(topo.total_nodes(), 5);
    }

    #[test]
    fn out_of_range_local_index_rejected() {
        let topo = two_type_topology();
        assert!(topo.local_to_global(3, "bus").is_err());
        assert!(topo.local_to_global(0, "load").is_err());
    }

    #[test]
    fn adjacency_crosses_node_types() {
        let topo = two_type_topology();
        // gen#1 (global 4) feeds bus#2 (global 2)
        let nbrs: Vec<usize> = topo.neighbors(4).collect();
        assert_eq!(nbrs, vec![2]);
        // bus#1 (global 1) touches bus#0 and bus#2
        let mut nbrs: Vec<usize> = topo.neighbors(1).collect();
        nbrs.sort_unstable();
        assert_eq!(nbrs, vec![0, 2]);
    }

    #[test]
    fn composed_edge_key_format() {
        let key = EdgeTypeKey::new("bus", "connects", "bus");
        assert_eq!(key.composed(), "bus__connects__bus");
        assert_eq!(key.to_string(), "bus__connects__bus");
    }
}
