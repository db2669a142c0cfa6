//! Partition quality metrics.
//!
//! A [`PartitionMetrics`] record is produced fresh each step by an
//! [`Evaluator`]. The episode controller keeps only the most recent one
//! to compute delta rewards. The reference [`MetricsEvaluator`] computes
//! the standard set over a [`GridTopology`]:
//!
//! - `load_cv`: coefficient of variation of per-region load (lower is better)
//! - `total_coupling` / `inter_region_lines`: summed weight and count of
//!   edges crossing region borders
//! - `power_imbalance_mean`: mean |generation - load| over regions
//! - `connectivity`: fraction of nonempty regions whose induced subgraph
//!   is connected (1.0 = every region is one electrical island)

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::partition::{PartitionAssignment, UNASSIGNED};
use crate::topology::GridTopology;

/// Scalar quality metrics of a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMetrics {
    pub load_cv: f64,
    pub total_coupling: f64,
    pub power_imbalance_mean: f64,
    pub connectivity: f64,
    pub inter_region_lines: usize,
}

impl Default for PartitionMetrics {
    /// Neutral baseline used before any evaluation has happened, chosen
    /// so a first-ever delta comparison yields a near-zero contribution.
    fn default() -> Self {
        Self {
            load_cv: 1.0,
            total_coupling: 1e5,
            power_imbalance_mean: 1e5,
            connectivity: 1.0,
            inter_region_lines: 0,
        }
    }
}

impl PartitionMetrics {
    /// Average coupling weight per inter-region line.
    pub fn avg_coupling(&self) -> f64 {
        self.total_coupling / (self.inter_region_lines.max(1) as f64)
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity >= 1.0
    }
}

/// Contract for partition-quality evaluation.
pub trait Evaluator {
    fn evaluate_partition(&self, partition: &PartitionAssignment) -> PartitionMetrics;
}

/// Reference evaluator over a [`GridTopology`].
#[derive(Debug)]
pub struct MetricsEvaluator {
    topology: Arc<GridTopology>,
    num_regions: u16,
}

impl MetricsEvaluator {
    pub fn new(topology: Arc<GridTopology>, num_regions: u16) -> Self {
        Self {
            topology,
            num_regions,
        }
    }

    fn region_connected(&self, partition: &PartitionAssignment, region: u16) -> bool {
        let members = partition.region_nodes(region);
        if members.len() <= 1 {
            return true;
        }

        // BFS restricted to nodes of this region.
        let mut visited = vec![false; self.topology.total_nodes()];
        let mut queue = VecDeque::new();
        visited[members[0]] = true;
        queue.push_back(members[0]);
        let mut reached = 1usize;

        while let Some(node) = queue.pop_front() {
            for nbr in self.topology.neighbors(node) {
                if !visited[nbr] && partition.region(nbr) == region {
                    visited[nbr] = true;
                    reached += 1;
                    queue.push_back(nbr);
                }
            }
        }

        reached == members.len()
    }
}

impl Evaluator for MetricsEvaluator {
    fn evaluate_partition(&self, partition: &PartitionAssignment) -> PartitionMetrics {
        let k = self.num_regions as usize;

        // Per-region load and generation totals over assigned nodes.
        let mut region_load = vec![0.0f64; k];
        let mut region_gen = vec![0.0f64; k];
        for node in 0..partition.len() {
            let r = partition.region(node);
            if r >= 1 && r as usize <= k {
                region_load[(r - 1) as usize] += self.topology.load_mw(node);
                region_gen[(r - 1) as usize] += self.topology.generation_mw(node);
            }
        }

        let mean_load = region_load.iter().sum::<f64>() / k as f64;
        let load_cv = if mean_load > 0.0 {
            let var = region_load
                .iter()
                .map(|l| (l - mean_load) * (l - mean_load))
                .sum::<f64>()
                / k as f64;
            var.sqrt() / mean_load
        } else {
            0.0
        };

        // Coupling across region borders; each typed edge counted once.
        // Edges touching an unassigned endpoint do not count as cuts.
        let mut total_coupling = 0.0;
        let mut inter_region_lines = 0usize;
        for list in self.topology.edge_lists() {
            for (i, &(src, dst)) in list.endpoints.iter().enumerate() {
                let src_global = match self.topology.local_to_global(src, &list.key.src) {
                    Ok(g) => g,
                    Err(_) => continue,
                };
                let dst_global = match self.topology.local_to_global(dst, &list.key.dst) {
                    Ok(g) => g,
                    Err(_) => continue,
                };
                let rs = partition.region(src_global);
                let rd = partition.region(dst_global);
                if rs != UNASSIGNED && rd != UNASSIGNED && rs != rd {
                    total_coupling += list.weights[i];
                    inter_region_lines += 1;
                }
            }
        }

        let power_imbalance_mean = region_load
            .iter()
            .zip(region_gen.iter())
            .map(|(l, g)| (g - l).abs())
            .sum::<f64>()
            / k as f64;

        let mut nonempty = 0usize;
        let mut connected = 0usize;
        for region in 1..=self.num_regions {
            if partition.region_nodes(region).is_empty() {
                continue;
            }
            nonempty += 1;
            if self.region_connected(partition, region) {
                connected += 1;
            }
        }
        let connectivity = if nonempty == 0 {
            1.0
        } else {
            connected as f64 / nonempty as f64
        };

        PartitionMetrics {
            load_cv,
            total_coupling,
            power_imbalance_mean,
            connectivity,
            inter_region_lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::EdgeTypeKey;

    /// 2x3 grid of buses, unit loads, generation at the two corners:
    ///   0 - 1 - 2
    ///   |   |   |
    ///   3 - 4 - 5
    fn grid_topology() -> Arc<GridTopology> {
        let mut builder = GridTopology::builder().add_node_type("bus", 6);
        for i in 0..6 {
            builder = builder.set_load("bus", i, 1.0);
        }
        builder = builder
            .set_generation("bus", 0, 3.0)
            .set_generation("bus", 5, 3.0);
        Arc::new(
            builder
                .add_edge_type(
                    EdgeTypeKey::new("bus", "connects", "bus"),
                    vec![(0, 1), (1, 2), (3, 4), (4, 5), (0, 3), (1, 4), (2, 5)],
                    vec![1.0, 1.0, 1.0, 1.0, 0.5, 0.5, 0.5],
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn balanced_split_metrics() {
        let topo = grid_topology();
        let eval = MetricsEvaluator::new(topo, 2);
        // Left column pair vs right: {0,1,3,4} / {2,5}
        let p = PartitionAssignment::from_regions(vec![1, 1, 2, 1, 1, 2]);
        let m = eval.evaluate_partition(&p);

        // Cut edges: 1-2 (1.0), 4-5 (1.0), 2-5 stays internal
        assert_eq!(m.inter_region_lines, 2);
        assert!((m.total_coupling - 2.0).abs() < 1e-12);
        assert!((m.connectivity - 1.0).abs() < 1e-12);
        // Loads 4 vs 2, mean 3 => cv = 1/3
        assert!((m.load_cv - 1.0 / 3.0).abs() < 1e-9);
        // Imbalance |3-4| and |3-2| => mean 1.0
        assert!((m.power_imbalance_mean - 1.0).abs() < 1e-12);
    }

    #[test]
    fn split_region_lowers_connectivity() {
        let topo = grid_topology();
        let eval = MetricsEvaluator::new(topo, 2);
        // Region 1 = {0, 5}: opposite corners, not adjacent
        let p = PartitionAssignment::from_regions(vec![1, 2, 2, 2, 2, 1]);
        let m = eval.evaluate_partition(&p);
        assert!((m.connectivity - 0.5).abs() < 1e-12);
        assert!(!m.is_connected());
    }

    #[test]
    fn unassigned_nodes_do_not_count_as_cuts() {
        let topo = grid_topology();
        let eval = MetricsEvaluator::new(topo, 2);
        let p = PartitionAssignment::from_regions(vec![1, 0, 2, 1, 0, 2]);
        let m = eval.evaluate_partition(&p);
        assert_eq!(m.inter_region_lines, 0);
        assert!((m.total_coupling - 0.0).abs() < 1e-12);
    }

    #[test]
    fn avg_coupling_guards_zero_lines() {
        let m = PartitionMetrics {
            total_coupling: 4.0,
            inter_region_lines: 0,
            ..PartitionMetrics::default()
        };
        assert!((m.avg_coupling() - 4.0).abs() < 1e-12);
    }
}
