//! The episode controller.
//!
//! [`Environment`] drives the reset -> step* -> terminal lifecycle of one
//! partitioning episode. It owns its collaborators exclusively for its
//! lifetime (state manager, action space, initializer, evaluator, reward
//! strategy); everything is released when the environment is dropped.
//!
//! Lifecycle misuse (stepping a finished or never-reset episode) is a
//! programming error and panics. An *invalid action* is not misuse: it is
//! a designed terminal transition with a fixed penalty, reported through
//! the returned flags and info record.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use gridpart_core::actions::ActionSpace;
use gridpart_core::error::{GridError, GridResult};
use gridpart_core::init::{Initializer, RegionGrowthInitializer};
use gridpart_core::metrics::{Evaluator, MetricsEvaluator, PartitionMetrics};
use gridpart_core::partition::{Action, PartitionAssignment};
use gridpart_core::state::{EmbeddingTable, Observation, StateManager};
use gridpart_core::topology::GridTopology;

use crate::attention::{augment_embeddings, AttentionTable};
use crate::config::{EnvConfig, RewardMode};
use crate::reward::{
    FinalBonusBreakdown, LegacyReward, RewardComponents, RewardModel, RewardStrategy,
};
use crate::termination::{EpisodeStatus, StopReason, TerminationEvaluator, TerminationKind};

/// Reward for one completed step, kept for convergence detection.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub reward: f64,
}

/// Info record returned by [`Environment::reset`].
#[derive(Debug, Clone, Serialize)]
pub struct ResetInfo {
    pub step: usize,
    pub metrics: PartitionMetrics,
    pub partition: PartitionAssignment,
    pub boundary_nodes: BTreeSet<usize>,
    pub valid_actions: BTreeSet<Action>,
}

/// Attached to the info record of the step that ended the episode.
#[derive(Debug, Clone, Serialize)]
pub struct TerminationInfo {
    pub reason: StopReason,
    /// Kind used for bonus selection; absent for invalid-action endings
    pub kind: Option<TerminationKind>,
    /// Terminal component added on top of the step reward
    pub bonus: f64,
    /// Legacy-mode bonus breakdown, when one was computed
    pub breakdown: Option<FinalBonusBreakdown>,
}

/// Info record returned by [`Environment::step`].
#[derive(Debug, Clone, Serialize)]
pub struct StepInfo {
    pub step: usize,
    pub metrics: PartitionMetrics,
    /// Total reward for the step, terminal bonus included
    pub reward: f64,
    pub reward_mode: RewardMode,
    pub termination: Option<TerminationInfo>,
    pub reward_components: RewardComponents,
}

/// Everything one `step` call returns.
#[derive(Debug)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

/// Diagnostic snapshot of the live episode.
#[derive(Debug, Clone, Serialize)]
pub struct StateInfo {
    pub partition: PartitionAssignment,
    pub boundary_nodes: BTreeSet<usize>,
    pub step: usize,
    pub max_steps: usize,
    pub num_regions: u16,
    pub total_nodes: usize,
    pub terminated: bool,
    pub truncated: bool,
}

/// Rendering targets for [`Environment::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Print the text rendering to stdout
    Human,
    /// Return the text rendering
    Ansi,
}

/// Sequential decision environment over one partitioned grid.
pub struct Environment {
    topology: Arc<GridTopology>,
    state: StateManager,
    actions: ActionSpace,
    initializer: Box<dyn Initializer>,
    evaluator: Box<dyn Evaluator>,
    reward: RewardStrategy,
    termination: TerminationEvaluator,
    config: EnvConfig,
    rng: StdRng,
    previous_metrics: Option<PartitionMetrics>,
    current_step: usize,
    history: Vec<StepRecord>,
    status: EpisodeStatus,
}

impl Environment {
    /// Build an environment with explicit collaborators.
    ///
    /// If `attention` is given, the raw embeddings are augmented once,
    /// here, and the augmented table replaces the raw one for the
    /// environment's lifetime. `reward_model` must be given for the
    /// enhanced and dual-layer modes and must be absent for legacy mode.
    pub fn new(
        topology: Arc<GridTopology>,
        node_embeddings: EmbeddingTable,
        attention: Option<AttentionTable>,
        config: EnvConfig,
        initializer: Box<dyn Initializer>,
        evaluator: Box<dyn Evaluator>,
        reward_model: Option<Box<dyn RewardModel>>,
    ) -> GridResult<Self> {
        if config.num_regions == 0 {
            return Err(GridError::Config("num_regions must be at least 1".to_string()));
        }
        if config.max_steps == 0 {
            return Err(GridError::Config("max_steps must be at least 1".to_string()));
        }
        for (node_type, mat) in &node_embeddings {
            if let Some(count) = topology.node_count(node_type) {
                if mat.nrows() != count {
                    return Err(GridError::Validation(format!(
                        "embedding table for '{node_type}' has {} rows, topology has {count} nodes",
                        mat.nrows()
                    )));
                }
            } else {
                return Err(GridError::Validation(format!(
                    "embedding table for unknown node type '{node_type}'"
                )));
            }
        }

        let embeddings = match &attention {
            Some(table) => augment_embeddings(&topology, node_embeddings, table),
            None => node_embeddings,
        };

        let reward = match (config.reward_mode, reward_model) {
            (RewardMode::Legacy, None) => RewardStrategy::Legacy(LegacyReward::new(
                config.legacy_weights.clone(),
                config.max_steps,
            )),
            (RewardMode::Legacy, Some(_)) => {
                return Err(GridError::Config(
                    "legacy reward mode computes rewards internally; no reward model expected"
                        .to_string(),
                ))
            }
            (RewardMode::Enhanced, Some(model)) => RewardStrategy::Enhanced(model),
            (RewardMode::DualLayer, Some(model)) => RewardStrategy::DualLayer(model),
            (mode, None) => {
                return Err(GridError::Config(format!(
                    "{} reward mode requires an external reward model",
                    mode.label()
                )))
            }
        };

        let state = StateManager::new(Arc::clone(&topology), embeddings);
        let actions = ActionSpace::new(Arc::clone(&topology), config.num_regions);
        let termination = TerminationEvaluator::new(config.max_steps, config.convergence.clone());

        Ok(Self {
            topology,
            state,
            actions,
            initializer,
            evaluator,
            reward,
            termination,
            config,
            rng: StdRng::from_entropy(),
            previous_metrics: None,
            current_step: 0,
            history: Vec::new(),
            status: EpisodeStatus::default(),
        })
    }

    /// Build an environment wired to the reference initializer and
    /// evaluator from `gridpart-core`. Only valid for legacy mode.
    pub fn with_reference_collaborators(
        topology: Arc<GridTopology>,
        node_embeddings: EmbeddingTable,
        attention: Option<AttentionTable>,
        config: EnvConfig,
    ) -> GridResult<Self> {
        let initializer = Box::new(RegionGrowthInitializer::new(Arc::clone(&topology)));
        let evaluator = Box::new(MetricsEvaluator::new(
            Arc::clone(&topology),
            config.num_regions,
        ));
        Self::new(
            topology,
            node_embeddings,
            attention,
            config,
            initializer,
            evaluator,
            None,
        )
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_terminated(&self) -> bool {
        self.status.terminated
    }

    pub fn is_truncated(&self) -> bool {
        self.status.truncated
    }

    /// Start a new episode. A seed makes the initial partition (and any
    /// other RNG consumption this environment does) reproducible.
    pub fn reset(&mut self, seed: Option<u64>) -> GridResult<(Observation, ResetInfo)> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        let initial = self
            .initializer
            .initialize_partition(self.config.num_regions, &mut self.rng)?;
        if initial.len() != self.topology.total_nodes() {
            return Err(GridError::Init(format!(
                "initializer produced {} assignments for {} nodes",
                initial.len(),
                self.topology.total_nodes()
            )));
        }
        self.state.reset(initial);

        self.current_step = 0;
        self.history.clear();
        self.status = EpisodeStatus::default();
        match &mut self.reward {
            RewardStrategy::Legacy(_) => {}
            RewardStrategy::Enhanced(model) | RewardStrategy::DualLayer(model) => {
                model.reset_episode();
            }
        }

        let metrics = self
            .evaluator
            .evaluate_partition(self.state.current_partition());
        self.previous_metrics = Some(metrics.clone());

        let boundary = self.state.get_boundary_nodes();
        let valid_actions = self
            .actions
            .get_valid_actions(self.state.current_partition(), &boundary);

        debug!(
            nodes = self.topology.total_nodes(),
            regions = self.config.num_regions,
            boundary = boundary.len(),
            "episode reset"
        );

        let info = ResetInfo {
            step: 0,
            metrics,
            partition: self.state.current_partition().clone(),
            boundary_nodes: boundary,
            valid_actions,
        };
        Ok((self.state.get_observation(), info))
    }

    /// Apply one reassignment.
    ///
    /// # Panics
    ///
    /// Panics if called before the first `reset`, or after the episode
    /// terminated or was truncated; both are usage errors, not
    /// recoverable outcomes.
    pub fn step(&mut self, action: Action) -> StepOutcome {
        if self.status.is_over() {
            panic!("step() called on a finished episode; call reset() first");
        }
        let Some(previous) = self.previous_metrics.clone() else {
            panic!("step() called before reset()");
        };

        // Invalid action: a designed terminal transition, not an error.
        let boundary = self.state.get_boundary_nodes();
        if !self
            .actions
            .is_valid_action(action, self.state.current_partition(), &boundary)
        {
            self.status.terminated = true;
            let penalty = self.config.legacy_weights.invalid_action_penalty;
            debug!(?action, "invalid action, episode force-terminated");
            let info = StepInfo {
                step: self.current_step,
                metrics: previous,
                reward: penalty,
                reward_mode: self.reward.mode(),
                termination: Some(TerminationInfo {
                    reason: StopReason::InvalidAction,
                    kind: None,
                    bonus: 0.0,
                    breakdown: None,
                }),
                reward_components: RewardComponents::new(),
            };
            return StepOutcome {
                observation: self.state.get_observation(),
                reward: penalty,
                terminated: true,
                truncated: false,
                info,
            };
        }

        self.state.update_partition(action.node, action.target_region);

        let metrics = self
            .evaluator
            .evaluate_partition(self.state.current_partition());

        let (step_reward, mut components) = match &mut self.reward {
            RewardStrategy::Legacy(legacy) => {
                let (r, breakdown) =
                    legacy.improvement_reward(&metrics, &previous, self.current_step);
                (r, breakdown.components())
            }
            RewardStrategy::Enhanced(model) => {
                let boundary = self.state.get_boundary_nodes();
                model.compute_reward(self.state.current_partition(), &boundary, action, true)
            }
            RewardStrategy::DualLayer(model) => {
                let r = model.compute_incremental_reward(self.state.current_partition(), action);
                let mut components = RewardComponents::new();
                components.insert("incremental_reward".to_string(), r);
                (r, components)
            }
        };

        self.previous_metrics = Some(metrics.clone());
        self.current_step += 1;
        self.history.push(StepRecord {
            step: self.current_step,
            reward: step_reward,
        });

        let boundary = self.state.get_boundary_nodes();
        let valid_count = self
            .actions
            .get_valid_actions(self.state.current_partition(), &boundary)
            .len();
        let rewards: Vec<f64> = self.history.iter().map(|r| r.reward).collect();
        self.status = self
            .termination
            .check(self.current_step, valid_count, &rewards);

        let mut reward = step_reward;
        let mut termination = None;
        if self.status.is_over() {
            let partition = self.state.current_partition();
            let fully_assigned = partition.is_fully_assigned();
            let kind = TerminationEvaluator::classify(self.status, fully_assigned)
                .unwrap_or(TerminationKind::Stuck);
            let reason = stop_reason(kind, fully_assigned);

            let (bonus, breakdown) = match &mut self.reward {
                RewardStrategy::Legacy(legacy) => {
                    let (bonus, breakdown) = legacy.terminal_bonus(
                        kind,
                        &metrics,
                        partition.completion_ratio(),
                        self.current_step,
                    );
                    (bonus, Some(breakdown))
                }
                RewardStrategy::DualLayer(model) => {
                    let (bonus, final_components) = model.compute_final_reward(partition, kind);
                    for (name, value) in final_components {
                        components.insert(format!("final_{name}"), value);
                    }
                    (bonus, None)
                }
                // The enhanced collaborator handles episode end inside its
                // combined step call; no separate terminal component.
                RewardStrategy::Enhanced(_) => (0.0, None),
            };

            reward += bonus;
            termination = Some(TerminationInfo {
                reason,
                kind: Some(kind),
                bonus,
                breakdown,
            });
            debug!(
                step = self.current_step,
                kind = kind.label(),
                bonus,
                "episode ended"
            );
        }

        let info = StepInfo {
            step: self.current_step,
            metrics,
            reward,
            reward_mode: self.reward.mode(),
            termination,
            reward_components: components,
        };

        StepOutcome {
            observation: self.state.get_observation(),
            reward,
            terminated: self.status.terminated,
            truncated: self.status.truncated,
            info,
        }
    }

    /// Boolean mask over the flat action space for the current state.
    pub fn get_action_mask(&self) -> Vec<bool> {
        self.actions.get_action_mask(
            self.state.current_partition(),
            &self.state.get_boundary_nodes(),
        )
    }

    /// Diagnostic snapshot of the current episode state.
    pub fn get_state_info(&self) -> StateInfo {
        StateInfo {
            partition: self.state.current_partition().clone(),
            boundary_nodes: self.state.get_boundary_nodes(),
            step: self.current_step,
            max_steps: self.config.max_steps,
            num_regions: self.config.num_regions,
            total_nodes: self.topology.total_nodes(),
            terminated: self.status.terminated,
            truncated: self.status.truncated,
        }
    }

    /// Render the current state as text. `Ansi` returns the string,
    /// `Human` prints it and returns `None`.
    pub fn render(&self, mode: RenderMode) -> Option<String> {
        let text = self.render_text();
        match mode {
            RenderMode::Ansi => Some(text),
            RenderMode::Human => {
                println!("{text}");
                None
            }
        }
    }

    fn render_text(&self) -> String {
        let partition = self.state.current_partition();
        let counts = partition.region_counts(self.config.num_regions);
        let boundary = self.state.get_boundary_nodes();
        [
            format!("step: {}/{}", self.current_step, self.config.max_steps),
            format!("regions: {}", self.config.num_regions),
            format!("nodes: {}", self.topology.total_nodes()),
            format!("region sizes: {counts:?}"),
            format!("unassigned: {}", partition.unassigned_count()),
            format!("boundary nodes: {}", boundary.len()),
        ]
        .join("\n")
    }
}

fn stop_reason(kind: TerminationKind, fully_assigned: bool) -> StopReason {
    match kind {
        TerminationKind::Natural => StopReason::NaturalCompletion,
        TerminationKind::Stuck => StopReason::NoValidActions,
        TerminationKind::Timeout => {
            if fully_assigned {
                StopReason::TimeoutCompleted
            } else {
                StopReason::TimeoutIncomplete
            }
        }
    }
}
