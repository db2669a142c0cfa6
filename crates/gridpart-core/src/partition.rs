//! Partition assignment and reassignment actions.

use serde::{Deserialize, Serialize};

/// Region id marking a node as not yet assigned to any region.
pub const UNASSIGNED: u16 = 0;

/// Dense mapping from global node index to region id.
///
/// Region ids run `1..=k`; `0` means unassigned. The live copy is owned
/// by the state manager; snapshots placed into info records are clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionAssignment {
    regions: Vec<u16>,
}

impl PartitionAssignment {
    /// All nodes unassigned.
    pub fn unassigned(total_nodes: usize) -> Self {
        Self {
            regions: vec![UNASSIGNED; total_nodes],
        }
    }

    pub fn from_regions(regions: Vec<u16>) -> Self {
        Self { regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region(&self, node: usize) -> u16 {
        self.regions[node]
    }

    pub fn set_region(&mut self, node: usize, region: u16) {
        self.regions[node] = region;
    }

    pub fn regions(&self) -> &[u16] {
        &self.regions
    }

    pub fn unassigned_count(&self) -> usize {
        self.regions.iter().filter(|&&r| r == UNASSIGNED).count()
    }

    pub fn is_fully_assigned(&self) -> bool {
        self.unassigned_count() == 0
    }

    /// Fraction of nodes assigned to some region.
    pub fn completion_ratio(&self) -> f64 {
        if self.regions.is_empty() {
            return 1.0;
        }
        (self.regions.len() - self.unassigned_count()) as f64 / self.regions.len() as f64
    }

    /// Node count per region (index 0 = region 1, ... index k-1 = region k).
    pub fn region_counts(&self, num_regions: u16) -> Vec<usize> {
        let mut counts = vec![0usize; num_regions as usize];
        for &r in &self.regions {
            if r >= 1 && r <= num_regions {
                counts[(r - 1) as usize] += 1;
            }
        }
        counts
    }

    /// Global indices of the nodes in a region.
    pub fn region_nodes(&self, region: u16) -> Vec<usize> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, &r)| r == region)
            .map(|(i, _)| i)
            .collect()
    }
}

/// A single reassignment: move `node` into `target_region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Action {
    /// Global node index
    pub node: usize,
    /// Target region id (1-based; 0 is never a valid target)
    pub target_region: u16,
}

impl Action {
    pub fn new(node: usize, target_region: u16) -> Self {
        Self {
            node,
            target_region,
        }
    }
}
