//! Environment configuration.
//!
//! One settings object selects the reward regime, the step budget, the
//! region count, and every weight/threshold the legacy reward uses. All
//! constants that the reward formulas bake in (tier thresholds, terminal
//! discounts, penalties) are fields here with the conventional values as
//! defaults, so experiments can tune them without code changes.

use serde::{Deserialize, Serialize};

/// The three mutually exclusive reward regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardMode {
    /// Rewards computed entirely in-crate (improvement delta + final bonus)
    Legacy,
    /// One combined per-step call into an external reward collaborator
    Enhanced,
    /// External incremental reward per step plus a separate external
    /// final-reward call at episode end
    DualLayer,
}

impl RewardMode {
    pub fn label(&self) -> &'static str {
        match self {
            RewardMode::Legacy => "legacy",
            RewardMode::Enhanced => "enhanced",
            RewardMode::DualLayer => "dual_layer",
        }
    }
}

/// Weights, thresholds, and penalties for the legacy reward regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyRewardWeights {
    /// Improvement weight on load CV delta
    pub load_cv_weight: f64,
    /// Improvement weight on total coupling delta
    pub coupling_weight: f64,
    /// Improvement weight on mean power imbalance delta
    pub power_balance_weight: f64,
    /// Flat per-step exploration incentive
    pub exploration_bonus: f64,
    /// Load-CV level under which the maintenance bonus applies
    pub quality_cv_threshold: f64,
    /// Bonus for holding load CV under the threshold
    pub quality_maintenance_bonus: f64,
    /// Per-remaining-step time-efficiency bonus
    pub time_bonus_per_step: f64,
    /// Step-reward clip range
    pub step_reward_min: f64,
    pub step_reward_max: f64,
    /// Flat penalty when a step leaves the partition disconnected
    pub disconnection_penalty: f64,
    /// Flat penalty (and forced termination) for an invalid action
    pub invalid_action_penalty: f64,

    /// Final bonus: flat completion component
    pub completion_bonus: f64,
    /// Final bonus: connectivity component (only when fully connected)
    pub connectivity_bonus: f64,
    /// Final penalty overriding everything when the end state is disconnected
    pub disconnected_final_penalty: f64,
    /// Discount applied to the partial bonus when the episode stalls with
    /// unassigned nodes left
    pub stuck_discount: f64,
    /// Discount applied when the budget runs out on a completed assignment
    pub timeout_completed_discount: f64,
    /// Flat part of the timeout-incomplete penalty
    pub timeout_penalty_base: f64,
    /// Per-unassigned-fraction part of the timeout-incomplete penalty
    pub timeout_penalty_scale: f64,
    /// Fraction of the step budget under which the efficiency bonus applies
    pub efficiency_cutoff: f64,
    /// Scale of the unused-budget efficiency bonus
    pub efficiency_bonus_scale: f64,
}

impl Default for LegacyRewardWeights {
    fn default() -> Self {
        Self {
            load_cv_weight: 5.0,
            coupling_weight: 2.0,
            power_balance_weight: 3.0,
            exploration_bonus: 0.1,
            quality_cv_threshold: 0.2,
            quality_maintenance_bonus: 0.3,
            time_bonus_per_step: 0.005,
            step_reward_min: -3.0,
            step_reward_max: 2.0,
            disconnection_penalty: -10.0,
            invalid_action_penalty: -10.0,
            completion_bonus: 15.0,
            connectivity_bonus: 5.0,
            disconnected_final_penalty: -30.0,
            stuck_discount: 0.3,
            timeout_completed_discount: 0.7,
            timeout_penalty_base: -5.0,
            timeout_penalty_scale: 10.0,
            efficiency_cutoff: 0.8,
            efficiency_bonus_scale: 10.0,
        }
    }
}

/// Reward-convergence detection over a trailing window of step rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Number of most recent steps considered
    pub window: usize,
    /// Episode terminates when the window's reward std-dev drops below this
    pub threshold: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            window: 10,
            threshold: 0.01,
        }
    }
}

/// Environment settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Target region count K
    pub num_regions: u16,
    /// Step budget per episode
    pub max_steps: usize,
    pub reward_mode: RewardMode,
    pub legacy_weights: LegacyRewardWeights,
    pub convergence: ConvergenceConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            num_regions: 2,
            max_steps: 200,
            reward_mode: RewardMode::Legacy,
            legacy_weights: LegacyRewardWeights::default(),
            convergence: ConvergenceConfig::default(),
        }
    }
}

impl EnvConfig {
    pub fn new(num_regions: u16) -> Self {
        Self {
            num_regions,
            ..Self::default()
        }
    }
}
