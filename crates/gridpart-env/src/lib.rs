//! # gridpart-env: Sequential Grid-Partitioning Environment
//!
//! The control loop of an incremental power-grid partitioning process,
//! exposed through a reset/step interface compatible with a
//! reinforcement-learning agent. Built on the data model and reference
//! collaborators in `gridpart-core`.
//!
//! An episode works on one grid: a heterogeneous topology, a table of
//! per-node-type embeddings from a graph encoder, and (optionally) the
//! encoder's edge-level attention scores. Construction fuses attention
//! into the embeddings once; `reset` installs an initial partition and
//! seeds the metric baseline; each `step` reassigns one boundary node,
//! rewards the resulting quality delta, and checks the termination rules
//! (budget, stuck, reward convergence).
//!
//! ```ignore
//! use gridpart_env::{Environment, EnvConfig};
//!
//! let mut env = Environment::with_reference_collaborators(
//!     topology, embeddings, attention, EnvConfig::new(4),
//! )?;
//! let (obs, info) = env.reset(Some(42))?;
//! let outcome = env.step(pick_action(&info.valid_actions));
//! ```

pub mod attention;
pub mod config;
pub mod env;
pub mod reward;
pub mod termination;

pub use attention::{augment_embeddings, AttentionTable, KeyMatch, CATCH_ALL_KEY};
pub use config::{ConvergenceConfig, EnvConfig, LegacyRewardWeights, RewardMode};
pub use env::{
    Environment, RenderMode, ResetInfo, StateInfo, StepInfo, StepOutcome, TerminationInfo,
};
pub use reward::{
    FinalBonusBreakdown, LegacyReward, RewardComponents, RewardModel, RewardStrategy,
    StepRewardBreakdown,
};
pub use termination::{EpisodeStatus, StopReason, TerminationEvaluator, TerminationKind};
