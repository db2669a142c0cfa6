//! Partition state management and observation building.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use faer::Mat;

use crate::error::GridResult;
use crate::partition::PartitionAssignment;
use crate::topology::GridTopology;

/// Per-node-type embedding table (nodes x feature-dim).
pub type EmbeddingTable = BTreeMap<String, Mat<f64>>;

/// Snapshot handed to the agent after reset/step.
///
/// Embeddings are shared (they are fixed for the environment lifetime);
/// the partition and boundary set are per-step copies.
#[derive(Debug, Clone)]
pub struct Observation {
    pub embeddings: Arc<EmbeddingTable>,
    pub partition: PartitionAssignment,
    pub boundary_nodes: BTreeSet<usize>,
}

/// Owns the live partition assignment and derives boundary/observation
/// views from it.
#[derive(Debug)]
pub struct StateManager {
    topology: Arc<GridTopology>,
    embeddings: Arc<EmbeddingTable>,
    partition: PartitionAssignment,
}

impl StateManager {
    pub fn new(topology: Arc<GridTopology>, embeddings: EmbeddingTable) -> Self {
        let partition = PartitionAssignment::unassigned(topology.total_nodes());
        Self {
            topology,
            embeddings: Arc::new(embeddings),
            partition,
        }
    }

    /// Install a freshly initialized partition.
    pub fn reset(&mut self, initial: PartitionAssignment) {
        self.partition = initial;
    }

    /// Reassign one node.
    pub fn update_partition(&mut self, node: usize, target_region: u16) {
        self.partition.set_region(node, target_region);
    }

    pub fn current_partition(&self) -> &PartitionAssignment {
        &self.partition
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingTable> {
        &self.embeddings
    }

    /// Nodes adjacent to at least one node in a different region.
    ///
    /// Region 0 (unassigned) counts as "different", so unassigned nodes on
    /// the frontier of an assigned area are boundary nodes and therefore
    /// eligible for assignment.
    pub fn get_boundary_nodes(&self) -> BTreeSet<usize> {
        let mut boundary = BTreeSet::new();
        for node in 0..self.partition.len() {
            let region = self.partition.region(node);
            for nbr in self.topology.neighbors(node) {
                if self.partition.region(nbr) != region {
                    boundary.insert(node);
                    break;
                }
            }
        }
        boundary
    }

    pub fn get_observation(&self) -> Observation {
        Observation {
            embeddings: Arc::clone(&self.embeddings),
            partition: self.partition.clone(),
            boundary_nodes: self.get_boundary_nodes(),
        }
    }

    /// Map local indices within a node type to global indices.
    pub fn local_to_global(&self, locals: &[usize], node_type: &str) -> GridResult<Vec<usize>> {
        locals
            .iter()
            .map(|&l| self.topology.local_to_global(l, node_type))
            .collect()
    }

    /// Node type -> (global offset, count).
    pub fn get_global_node_mapping(&self) -> BTreeMap<String, (usize, usize)> {
        self.topology.global_node_mapping()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::EdgeTypeKey;

    fn path_topology() -> Arc<GridTopology> {
        // 0 - 1 - 2 - 3
        Arc::new(
            GridTopology::builder()
                .add_node_type("bus", 4)
                .add_edge_type(
                    EdgeTypeKey::new("bus", "connects", "bus"),
                    vec![(0, 1), (1, 2), (2, 3)],
                    vec![],
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn boundary_is_region_frontier() {
        let mut state = StateManager::new(path_topology(), EmbeddingTable::new());
        state.reset(PartitionAssignment::from_regions(vec![1, 1, 2, 2]));
        let boundary = state.get_boundary_nodes();
        assert_eq!(boundary, BTreeSet::from([1, 2]));
    }

    #[test]
    fn unassigned_frontier_nodes_are_boundary() {
        let mut state = StateManager::new(path_topology(), EmbeddingTable::new());
        state.reset(PartitionAssignment::from_regions(vec![1, 1, 0, 0]));
        let boundary = state.get_boundary_nodes();
        // Node 1 borders unassigned node 2; node 2 borders region 1.
        // Node 3 only borders other unassigned nodes.
        assert_eq!(boundary, BTreeSet::from([1, 2]));
    }

    #[test]
    fn fully_unassigned_grid_has_no_boundary() {
        let state = StateManager::new(path_topology(), EmbeddingTable::new());
        assert!(state.get_boundary_nodes().is_empty());
    }

    #[test]
    fn update_moves_one_node() {
        let mut state = StateManager::new(path_topology(), EmbeddingTable::new());
        state.reset(PartitionAssignment::from_regions(vec![1, 1, 2, 2]));
        state.update_partition(1, 2);
        assert_eq!(state.current_partition().regions(), &[1, 2, 2, 2]);
    }
}
