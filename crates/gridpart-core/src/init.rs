//! Initial-partition heuristics.
//!
//! The environment requests a starting assignment from an [`Initializer`]
//! on every reset. The reference implementation grows K regions from
//! random seed nodes by breadth-first search, always expanding the
//! lightest region first so region loads stay balanced while each region
//! remains connected by construction.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{GridError, GridResult};
use crate::partition::{PartitionAssignment, UNASSIGNED};
use crate::topology::GridTopology;

/// Contract for initial-partition generation.
pub trait Initializer {
    /// Produce a starting assignment for `num_regions` regions. The RNG
    /// is owned by the caller so seeded resets are reproducible.
    fn initialize_partition(
        &mut self,
        num_regions: u16,
        rng: &mut StdRng,
    ) -> GridResult<PartitionAssignment>;
}

/// Balanced multi-source BFS growth from random seeds.
///
/// Nodes unreachable from every seed (disconnected components) are left
/// unassigned; completing them is the episode's job.
#[derive(Debug)]
pub struct RegionGrowthInitializer {
    topology: Arc<GridTopology>,
}

impl RegionGrowthInitializer {
    pub fn new(topology: Arc<GridTopology>) -> Self {
        Self { topology }
    }
}

impl Initializer for RegionGrowthInitializer {
    fn initialize_partition(
        &mut self,
        num_regions: u16,
        rng: &mut StdRng,
    ) -> GridResult<PartitionAssignment> {
        let total = self.topology.total_nodes();
        let k = num_regions as usize;
        if k == 0 {
            return Err(GridError::Init("need at least one region".to_string()));
        }
        if total < k {
            return Err(GridError::Init(format!(
                "cannot seed {k} regions on {total} nodes"
            )));
        }

        let mut partition = PartitionAssignment::unassigned(total);
        let mut region_load = vec![0.0f64; k];
        let mut frontier: Vec<VecDeque<usize>> = vec![VecDeque::new(); k];

        // Distinct random seeds, one per region.
        let mut seeds: Vec<usize> = Vec::with_capacity(k);
        while seeds.len() < k {
            let candidate = rng.gen_range(0..total);
            if !seeds.contains(&candidate) {
                seeds.push(candidate);
            }
        }
        for (r, &seed) in seeds.iter().enumerate() {
            partition.set_region(seed, (r + 1) as u16);
            region_load[r] += self.topology.load_mw(seed);
            frontier[r].push_back(seed);
        }

        // Grow one node at a time, always from the lightest region that
        // still has an expandable frontier.
        loop {
            let candidate = region_load
                .iter()
                .enumerate()
                .filter(|(r, _)| !frontier[*r].is_empty())
                .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(r, _)| r);
            let Some(r) = candidate else { break };

            while let Some(&node) = frontier[r].front() {
                let next = self
                    .topology
                    .neighbors(node)
                    .find(|&nbr| partition.region(nbr) == UNASSIGNED);
                match next {
                    Some(nbr) => {
                        partition.set_region(nbr, (r + 1) as u16);
                        region_load[r] += self.topology.load_mw(nbr);
                        frontier[r].push_back(nbr);
                        break;
                    }
                    None => {
                        frontier[r].pop_front();
                    }
                }
            }
        }

        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::EdgeTypeKey;
    use rand::SeedableRng;

    fn grid_topology() -> Arc<GridTopology> {
        let mut builder = GridTopology::builder().add_node_type("bus", 6);
        for i in 0..6 {
            builder = builder.set_load("bus", i, 1.0);
        }
        Arc::new(
            builder
                .add_edge_type(
                    EdgeTypeKey::new("bus", "connects", "bus"),
                    vec![(0, 1), (1, 2), (3, 4), (4, 5), (0, 3), (1, 4), (2, 5)],
                    vec![],
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn connected_grid_is_fully_assigned() {
        let mut init = RegionGrowthInitializer::new(grid_topology());
        let mut rng = StdRng::seed_from_u64(7);
        let p = init.initialize_partition(2, &mut rng).unwrap();
        assert!(p.is_fully_assigned());
        let counts = p.region_counts(2);
        assert_eq!(counts.iter().sum::<usize>(), 6);
        assert!(counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn same_seed_same_partition() {
        let topo = grid_topology();
        let mut a = RegionGrowthInitializer::new(Arc::clone(&topo));
        let mut b = RegionGrowthInitializer::new(topo);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        assert_eq!(
            a.initialize_partition(3, &mut rng_a).unwrap(),
            b.initialize_partition(3, &mut rng_b).unwrap()
        );
    }

    #[test]
    fn too_many_regions_rejected() {
        let mut init = RegionGrowthInitializer::new(grid_topology());
        let mut rng = StdRng::seed_from_u64(0);
        assert!(init.initialize_partition(7, &mut rng).is_err());
    }

    #[test]
    fn disconnected_component_stays_unassigned() {
        // Three buses with no edges at all: each seed reaches only itself,
        // so the third bus stays unassigned.
        let topo = Arc::new(
            GridTopology::builder()
                .add_node_type("bus", 3)
                .build()
                .unwrap(),
        );
        let mut init = RegionGrowthInitializer::new(topo);
        let mut rng = StdRng::seed_from_u64(1);
        let p = init.initialize_partition(2, &mut rng).unwrap();
        assert_eq!(p.unassigned_count(), 1);
    }
}
