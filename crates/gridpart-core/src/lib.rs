//! # gridpart-core: Partitioned Power Grid Modeling Core
//!
//! Data model and reference collaborators for incremental power-grid
//! partitioning: a heterogeneous grid topology with a global node index
//! space, a dense region assignment (`0` = unassigned), boundary-node
//! derivation, action validity/masking, partition-quality metrics, and a
//! balanced region-growth initializer.
//!
//! The episode control loop lives in the companion `gridpart-env` crate;
//! this crate deliberately knows nothing about rewards or termination.
//!
//! ## Design notes
//!
//! - The flattened adjacency is a petgraph `UnGraph`, so connectivity
//!   and boundary checks are ordinary graph walks.
//! - Node embeddings are `faer` matrices (nodes x feature-dim), keyed by
//!   node type.
//! - Trait seams ([`Initializer`], [`Evaluator`]) let callers swap the
//!   reference collaborators for external ones without touching the
//!   environment.
//! - All externally supplied numerics pass through [`sanitize`], which
//!   scrubs NaN/Inf instead of failing.

pub mod actions;
pub mod error;
pub mod init;
pub mod metrics;
pub mod partition;
pub mod sanitize;
pub mod state;
pub mod topology;

pub use actions::ActionSpace;
pub use error::{GridError, GridResult};
pub use init::{Initializer, RegionGrowthInitializer};
pub use metrics::{Evaluator, MetricsEvaluator, PartitionMetrics};
pub use partition::{Action, PartitionAssignment, UNASSIGNED};
pub use state::{EmbeddingTable, Observation, StateManager};
pub use topology::{EdgeList, EdgeTypeKey, GridTopology, GridTopologyBuilder};
