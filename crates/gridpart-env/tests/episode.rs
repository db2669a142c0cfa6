//! Episode lifecycle tests over a small fixture grid.

use std::collections::BTreeMap;
use std::sync::Arc;

use faer::Mat;
use rand::rngs::StdRng;

use gridpart_core::error::GridResult;
use gridpart_core::init::Initializer;
use gridpart_core::metrics::{Evaluator, MetricsEvaluator, PartitionMetrics};
use gridpart_core::partition::{Action, PartitionAssignment};
use gridpart_core::state::EmbeddingTable;
use gridpart_core::topology::{EdgeTypeKey, GridTopology};
use gridpart_env::reward::{RewardComponents, RewardModel};
use gridpart_env::{ConvergenceConfig, EnvConfig, Environment, RewardMode, StopReason, TerminationKind};

/// Route step diagnostics to the test output (respects RUST_LOG).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 4-bus path 0 - 1 - 2 - 3, unit load per bus, no generation.
fn path_topology() -> Arc<GridTopology> {
    let mut builder = GridTopology::builder().add_node_type("bus", 4);
    for i in 0..4 {
        builder = builder.set_load("bus", i, 1.0);
    }
    Arc::new(
        builder
            .add_edge_type(
                EdgeTypeKey::new("bus", "connects", "bus"),
                vec![(0, 1), (1, 2), (2, 3)],
                vec![],
            )
            .build()
            .unwrap(),
    )
}

/// Hands out a fixed starting partition, so tests control the episode.
struct FixedInitializer {
    regions: Vec<u16>,
}

impl Initializer for FixedInitializer {
    fn initialize_partition(
        &mut self,
        _num_regions: u16,
        _rng: &mut StdRng,
    ) -> GridResult<PartitionAssignment> {
        Ok(PartitionAssignment::from_regions(self.regions.clone()))
    }
}

fn legacy_env(initial: Vec<u16>, config: EnvConfig) -> Environment {
    init_tracing();
    let topology = path_topology();
    let evaluator = Box::new(MetricsEvaluator::new(Arc::clone(&topology), config.num_regions));
    Environment::new(
        topology,
        EmbeddingTable::new(),
        None,
        config,
        Box::new(FixedInitializer { regions: initial }),
        evaluator,
        None,
    )
    .unwrap()
}

#[test]
fn reset_establishes_baseline() {
    let mut env = legacy_env(vec![1, 1, 2, 2], EnvConfig::new(2));
    let (_, info) = env.reset(None).unwrap();

    assert_eq!(env.current_step(), 0);
    assert!(!env.is_terminated());
    assert!(!env.is_truncated());
    assert_eq!(info.step, 0);
    assert_eq!(info.partition.regions(), &[1, 1, 2, 2]);
    assert!(!info.valid_actions.is_empty());

    // Cached baseline equals a fresh evaluation of the initial partition.
    let evaluator = MetricsEvaluator::new(path_topology(), 2);
    assert_eq!(info.metrics, evaluator.evaluate_partition(&info.partition));
}

#[test]
fn invalid_action_terminates_without_mutation() {
    let mut env = legacy_env(vec![1, 1, 2, 2], EnvConfig::new(2));
    env.reset(None).unwrap();

    // Node 0 is interior to region 1, so this move is invalid.
    let outcome = env.step(Action::new(0, 2));
    assert!(outcome.terminated);
    assert!(!outcome.truncated);
    assert_eq!(outcome.reward, -10.0);

    let termination = outcome.info.termination.unwrap();
    assert_eq!(termination.reason, StopReason::InvalidAction);
    assert_eq!(termination.kind, None);

    // No state mutation, no step counted.
    let state = env.get_state_info();
    assert_eq!(state.partition.regions(), &[1, 1, 2, 2]);
    assert_eq!(state.step, 0);
    assert!(state.terminated);
}

#[test]
#[should_panic(expected = "finished episode")]
fn step_after_end_panics() {
    let mut env = legacy_env(vec![1, 1, 2, 2], EnvConfig::new(2));
    env.reset(None).unwrap();
    env.step(Action::new(0, 2)); // invalid, closes the episode
    env.step(Action::new(1, 2));
}

#[test]
#[should_panic(expected = "before reset")]
fn step_before_reset_panics() {
    let mut env = legacy_env(vec![1, 1, 2, 2], EnvConfig::new(2));
    env.step(Action::new(1, 2));
}

#[test]
fn step_counter_is_monotonic() {
    let mut env = legacy_env(vec![1, 1, 2, 2], EnvConfig::new(2));
    env.reset(None).unwrap();

    // Shuffle node 1 back and forth; the episode stays live.
    let moves = [Action::new(1, 2), Action::new(1, 1), Action::new(1, 2)];
    for (i, &action) in moves.iter().enumerate() {
        let outcome = env.step(action);
        assert!(!outcome.terminated, "step {i}");
        assert!(!outcome.truncated, "step {i}");
        assert_eq!(outcome.info.step, i + 1);
    }
    assert_eq!(env.current_step(), 3);
}

#[test]
fn action_mask_is_idempotent() {
    let mut env = legacy_env(vec![1, 1, 2, 2], EnvConfig::new(2));
    env.reset(None).unwrap();
    assert_eq!(env.get_action_mask(), env.get_action_mask());
}

#[test]
fn legacy_step_reports_components() {
    let mut env = legacy_env(vec![1, 1, 2, 2], EnvConfig::new(2));
    env.reset(None).unwrap();
    let outcome = env.step(Action::new(1, 2));
    assert_eq!(outcome.info.reward_mode, RewardMode::Legacy);
    assert!(outcome.info.reward_components.contains_key("clipped"));
    assert!(outcome.info.reward_components.contains_key("load_cv"));
}

#[test]
fn completing_the_assignment_ends_naturally_with_completion_bonus() {
    // Node 3 starts unassigned; a short convergence window closes the
    // episode right after the assignment is completed.
    let config = EnvConfig {
        convergence: ConvergenceConfig {
            window: 2,
            threshold: 1000.0,
        },
        ..EnvConfig::new(2)
    };
    let mut env = legacy_env(vec![1, 1, 2, 0], config);
    let (_, info) = env.reset(None).unwrap();
    assert!(info.valid_actions.contains(&Action::new(3, 2)));

    let first = env.step(Action::new(3, 2));
    assert!(!first.terminated && !first.truncated);
    assert!(first.observation.partition.is_fully_assigned());

    let last = env.step(Action::new(1, 2));
    assert!(last.terminated);
    assert!(!last.truncated);

    let termination = last.info.termination.unwrap();
    assert_eq!(termination.kind, Some(TerminationKind::Natural));
    assert_eq!(termination.reason, StopReason::NaturalCompletion);
    let breakdown = termination.breakdown.unwrap();
    assert_eq!(breakdown.completion, 15.0);
    assert_eq!(breakdown.scale, 1.0);
    assert!(termination.bonus >= 15.0);
    assert!((last.reward - (last.info.reward_components["clipped"] + termination.bonus)).abs() < 1e-9);
}

#[test]
fn timeout_incomplete_applies_fixed_plus_proportional_penalty() {
    let config = EnvConfig {
        max_steps: 1,
        ..EnvConfig::new(2)
    };
    let mut env = legacy_env(vec![1, 1, 2, 0], config);
    env.reset(None).unwrap();

    // A valid move that does not complete the assignment.
    let outcome = env.step(Action::new(2, 1));
    assert!(outcome.truncated);
    assert!(!outcome.terminated);
    assert!(!outcome.observation.partition.is_fully_assigned());

    let termination = outcome.info.termination.unwrap();
    assert_eq!(termination.kind, Some(TerminationKind::Timeout));
    assert_eq!(termination.reason, StopReason::TimeoutIncomplete);
    // One of four nodes unassigned: -5 flat, -10 * 0.25 proportional.
    assert!((termination.bonus - (-5.0 - 0.25 * 10.0)).abs() < 1e-12);
}

#[test]
fn timeout_on_completed_assignment_discounts_the_bonus() {
    let config = EnvConfig {
        max_steps: 1,
        ..EnvConfig::new(2)
    };
    let mut env = legacy_env(vec![1, 1, 2, 2], config);
    env.reset(None).unwrap();

    let outcome = env.step(Action::new(1, 2));
    assert!(outcome.truncated);

    let termination = outcome.info.termination.unwrap();
    assert_eq!(termination.reason, StopReason::TimeoutCompleted);
    let breakdown = termination.breakdown.unwrap();
    assert_eq!(breakdown.scale, 0.7);
    assert!((termination.bonus - breakdown.raw_total * 0.7).abs() < 1e-9);
}

#[test]
fn seeded_resets_are_reproducible() {
    let topology = path_topology();
    let make = || {
        Environment::with_reference_collaborators(
            Arc::clone(&topology),
            EmbeddingTable::new(),
            None,
            EnvConfig::new(2),
        )
        .unwrap()
    };
    let mut a = make();
    let mut b = make();
    let (_, info_a) = a.reset(Some(17)).unwrap();
    let (_, info_b) = b.reset(Some(17)).unwrap();
    assert_eq!(info_a.partition, info_b.partition);
}

/// Minimal external collaborator for the dual-layer regime.
struct StubRewardModel;

impl RewardModel for StubRewardModel {
    fn compute_reward(
        &mut self,
        _partition: &PartitionAssignment,
        _boundary: &std::collections::BTreeSet<usize>,
        _action: Action,
        _return_components: bool,
    ) -> (f64, RewardComponents) {
        let mut components = RewardComponents::new();
        components.insert("combined".to_string(), 1.25);
        (1.25, components)
    }

    fn compute_incremental_reward(
        &mut self,
        _partition: &PartitionAssignment,
        _action: Action,
    ) -> f64 {
        0.5
    }

    fn compute_final_reward(
        &mut self,
        _partition: &PartitionAssignment,
        _termination: TerminationKind,
    ) -> (f64, RewardComponents) {
        let mut components = RewardComponents::new();
        components.insert("terminal".to_string(), 2.0);
        (2.0, components)
    }

    fn get_current_metrics(&self, _partition: &PartitionAssignment) -> PartitionMetrics {
        PartitionMetrics::default()
    }

    fn reset_episode(&mut self) {}
}

#[test]
fn dual_layer_adds_external_final_reward_at_timeout() {
    let topology = path_topology();
    let config = EnvConfig {
        max_steps: 1,
        reward_mode: RewardMode::DualLayer,
        ..EnvConfig::new(2)
    };
    let evaluator = Box::new(MetricsEvaluator::new(Arc::clone(&topology), 2));
    let mut env = Environment::new(
        topology,
        EmbeddingTable::new(),
        None,
        config,
        Box::new(FixedInitializer {
            regions: vec![1, 1, 2, 0],
        }),
        evaluator,
        Some(Box::new(StubRewardModel)),
    )
    .unwrap();

    env.reset(None).unwrap();
    let outcome = env.step(Action::new(2, 1));
    assert!(outcome.truncated);
    assert_eq!(outcome.info.reward_mode, RewardMode::DualLayer);
    // 0.5 incremental + 2.0 external terminal
    assert!((outcome.reward - 2.5).abs() < 1e-12);
    assert_eq!(outcome.info.reward_components["incremental_reward"], 0.5);
    assert_eq!(outcome.info.reward_components["final_terminal"], 2.0);
    let termination = outcome.info.termination.unwrap();
    assert_eq!(termination.kind, Some(TerminationKind::Timeout));
}

#[test]
fn enhanced_mode_reward_comes_only_from_the_combined_call() {
    let topology = path_topology();
    let config = EnvConfig {
        max_steps: 1,
        reward_mode: RewardMode::Enhanced,
        ..EnvConfig::new(2)
    };
    let evaluator = Box::new(MetricsEvaluator::new(Arc::clone(&topology), 2));
    let mut env = Environment::new(
        topology,
        EmbeddingTable::new(),
        None,
        config,
        Box::new(FixedInitializer {
            regions: vec![1, 1, 2, 0],
        }),
        evaluator,
        Some(Box::new(StubRewardModel)),
    )
    .unwrap();

    env.reset(None).unwrap();
    let outcome = env.step(Action::new(2, 1));
    assert!(outcome.truncated);
    assert_eq!(outcome.info.reward_mode, RewardMode::Enhanced);

    // The collaborator's combined call is the whole step reward; the
    // episode end adds no terminal component on top.
    assert!((outcome.reward - 1.25).abs() < 1e-12);
    assert_eq!(outcome.info.reward_components["combined"], 1.25);
    let termination = outcome.info.termination.unwrap();
    assert_eq!(termination.bonus, 0.0);
    assert!(termination.breakdown.is_none());
    assert!(outcome
        .info
        .reward_components
        .keys()
        .all(|k| !k.starts_with("final_")));
}

#[test]
fn external_modes_require_a_reward_model() {
    let topology = path_topology();
    let config = EnvConfig {
        reward_mode: RewardMode::Enhanced,
        ..EnvConfig::new(2)
    };
    let evaluator = Box::new(MetricsEvaluator::new(Arc::clone(&topology), 2));
    let result = Environment::new(
        topology,
        EmbeddingTable::new(),
        None,
        config,
        Box::new(FixedInitializer {
            regions: vec![1, 1, 2, 2],
        }),
        evaluator,
        None,
    );
    assert!(result.is_err());
}

#[test]
fn render_reports_episode_state() {
    let mut env = legacy_env(vec![1, 1, 2, 0], EnvConfig::new(2));
    env.reset(None).unwrap();
    let text = env
        .render(gridpart_env::RenderMode::Ansi)
        .expect("ansi mode returns text");
    assert!(text.contains("step: 0/200"));
    assert!(text.contains("unassigned: 1"));
}

#[test]
fn embedding_row_mismatch_is_a_construction_error() {
    let topology = path_topology();
    let mut embeddings: EmbeddingTable = BTreeMap::new();
    embeddings.insert("bus".to_string(), Mat::zeros(3, 2)); // 4 buses expected
    let result = Environment::with_reference_collaborators(
        topology,
        embeddings,
        None,
        EnvConfig::new(2),
    );
    assert!(result.is_err());
}
