//! Action validity, enumeration, and masking.
//!
//! An action reassigns one boundary node to a region already present
//! among its neighbors. The mask is a flat boolean vector of length
//! `total_nodes * k`, laid out as `node * k + (region - 1)`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::partition::{Action, PartitionAssignment, UNASSIGNED};
use crate::topology::GridTopology;

#[derive(Debug)]
pub struct ActionSpace {
    topology: Arc<GridTopology>,
    num_regions: u16,
}

impl ActionSpace {
    pub fn new(topology: Arc<GridTopology>, num_regions: u16) -> Self {
        Self {
            topology,
            num_regions,
        }
    }

    pub fn num_regions(&self) -> u16 {
        self.num_regions
    }

    /// Length of the flat action mask.
    pub fn mask_len(&self) -> usize {
        self.topology.total_nodes() * self.num_regions as usize
    }

    /// Flat mask index of an action.
    pub fn mask_index(&self, action: Action) -> usize {
        action.node * self.num_regions as usize + (action.target_region - 1) as usize
    }

    /// An action is valid when the node is on the boundary, the target is
    /// a real region different from the node's current one, and at least
    /// one neighbor already belongs to the target region.
    pub fn is_valid_action(
        &self,
        action: Action,
        partition: &PartitionAssignment,
        boundary_nodes: &BTreeSet<usize>,
    ) -> bool {
        if action.node >= self.topology.total_nodes() {
            return false;
        }
        if action.target_region == UNASSIGNED || action.target_region > self.num_regions {
            return false;
        }
        if !boundary_nodes.contains(&action.node) {
            return false;
        }
        if partition.region(action.node) == action.target_region {
            return false;
        }
        self.topology
            .neighbors(action.node)
            .any(|nbr| partition.region(nbr) == action.target_region)
    }

    pub fn get_valid_actions(
        &self,
        partition: &PartitionAssignment,
        boundary_nodes: &BTreeSet<usize>,
    ) -> BTreeSet<Action> {
        let mut actions = BTreeSet::new();
        for &node in boundary_nodes {
            let current = partition.region(node);
            let mut neighbor_regions = BTreeSet::new();
            for nbr in self.topology.neighbors(node) {
                let r = partition.region(nbr);
                if r != UNASSIGNED && r != current {
                    neighbor_regions.insert(r);
                }
            }
            for region in neighbor_regions {
                actions.insert(Action::new(node, region));
            }
        }
        actions
    }

    pub fn get_action_mask(
        &self,
        partition: &PartitionAssignment,
        boundary_nodes: &BTreeSet<usize>,
    ) -> Vec<bool> {
        let mut mask = vec![false; self.mask_len()];
        for action in self.get_valid_actions(partition, boundary_nodes) {
            mask[self.mask_index(action)] = true;
        }
        mask
    }
}
