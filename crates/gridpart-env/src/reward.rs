//! Reward strategies.
//!
//! Three mutually exclusive regimes, fixed at construction:
//!
//! - **legacy** computes everything in-crate: a per-step improvement
//!   delta against the previous metrics plus a tiered final bonus at
//!   episode end, scaled by how the episode ended.
//! - **enhanced** delegates the whole step reward to an external
//!   [`RewardModel`] in one combined call; that collaborator owns any
//!   end-of-episode handling itself.
//! - **dual_layer** delegates the incremental reward per step and makes
//!   a separate final-reward call at episode end, parameterized by the
//!   termination kind.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use gridpart_core::metrics::PartitionMetrics;
use gridpart_core::partition::{Action, PartitionAssignment};

use crate::config::{LegacyRewardWeights, RewardMode};
use crate::termination::TerminationKind;

/// Named reward components for diagnostics.
pub type RewardComponents = BTreeMap<String, f64>;

/// Contract for the external reward collaborators used by the enhanced
/// and dual-layer regimes.
pub trait RewardModel {
    /// Combined step reward (enhanced regime).
    fn compute_reward(
        &mut self,
        partition: &PartitionAssignment,
        boundary_nodes: &BTreeSet<usize>,
        action: Action,
        return_components: bool,
    ) -> (f64, RewardComponents);

    /// Incremental step reward (dual-layer regime).
    fn compute_incremental_reward(
        &mut self,
        partition: &PartitionAssignment,
        action: Action,
    ) -> f64;

    /// Terminal reward (dual-layer regime).
    fn compute_final_reward(
        &mut self,
        partition: &PartitionAssignment,
        termination: TerminationKind,
    ) -> (f64, RewardComponents);

    /// Metrics as this collaborator sees them, for diagnostics.
    fn get_current_metrics(&self, partition: &PartitionAssignment) -> PartitionMetrics;

    /// Clear episode-local state on reset.
    fn reset_episode(&mut self);
}

/// Per-step reward breakdown for the legacy regime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepRewardBreakdown {
    pub exploration: f64,
    pub load_cv: f64,
    pub coupling: f64,
    pub power_balance: f64,
    pub quality_maintenance: f64,
    pub time_efficiency: f64,
    pub disconnection_penalty: f64,
    pub total: f64,
    pub clipped: f64,
}

impl StepRewardBreakdown {
    pub fn components(&self) -> RewardComponents {
        let mut map = RewardComponents::new();
        map.insert("exploration".to_string(), self.exploration);
        map.insert("load_cv".to_string(), self.load_cv);
        map.insert("coupling".to_string(), self.coupling);
        map.insert("power_balance".to_string(), self.power_balance);
        map.insert(
            "quality_maintenance".to_string(),
            self.quality_maintenance,
        );
        map.insert("time_efficiency".to_string(), self.time_efficiency);
        map.insert(
            "disconnection_penalty".to_string(),
            self.disconnection_penalty,
        );
        map.insert("total".to_string(), self.total);
        map.insert("clipped".to_string(), self.clipped);
        map
    }
}

/// Final-bonus breakdown for the legacy regime, retained in the terminal
/// step's info record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinalBonusBreakdown {
    pub completion: f64,
    pub quality: f64,
    pub efficiency: f64,
    /// Pre-scaling sum of the components above
    pub raw_total: f64,
    /// Discount/penalty scaling applied for the termination circumstance
    pub scale: f64,
    /// Value actually added to the step reward
    pub total: f64,
    pub metrics: PartitionMetrics,
}

/// In-crate reward computation for the legacy regime.
#[derive(Debug)]
pub struct LegacyReward {
    weights: LegacyRewardWeights,
    max_steps: usize,
}

impl LegacyReward {
    pub fn new(weights: LegacyRewardWeights, max_steps: usize) -> Self {
        Self { weights, max_steps }
    }

    pub fn weights(&self) -> &LegacyRewardWeights {
        &self.weights
    }

    /// Delta reward for one step: how much each metric improved since the
    /// previous step, weighted, plus exploration/quality/time incentives,
    /// clipped to the configured range. Breaking connectivity short-circuits
    /// to the flat disconnection penalty.
    pub fn improvement_reward(
        &self,
        current: &PartitionMetrics,
        previous: &PartitionMetrics,
        current_step: usize,
    ) -> (f64, StepRewardBreakdown) {
        let w = &self.weights;

        if current.connectivity < 1.0 {
            let breakdown = StepRewardBreakdown {
                disconnection_penalty: w.disconnection_penalty,
                total: w.disconnection_penalty,
                clipped: w.disconnection_penalty,
                ..StepRewardBreakdown::default()
            };
            return (w.disconnection_penalty, breakdown);
        }

        // Lower is better for all three metrics, so prev - curr > 0 means
        // the step improved the partition.
        let cv_reward = (previous.load_cv - current.load_cv) * w.load_cv_weight;
        let coupling_reward =
            (previous.total_coupling - current.total_coupling) * w.coupling_weight;
        let pb_reward = (previous.power_imbalance_mean - current.power_imbalance_mean)
            * w.power_balance_weight;

        let quality_maintenance = if current.load_cv < w.quality_cv_threshold {
            w.quality_maintenance_bonus
        } else {
            0.0
        };

        let remaining = self.max_steps.saturating_sub(current_step) as f64;
        let time_efficiency = (remaining * w.time_bonus_per_step).max(0.0);

        let total = w.exploration_bonus
            + cv_reward
            + coupling_reward
            + pb_reward
            + quality_maintenance
            + time_efficiency;
        let clipped = total.clamp(w.step_reward_min, w.step_reward_max);

        let breakdown = StepRewardBreakdown {
            exploration: w.exploration_bonus,
            load_cv: cv_reward,
            coupling: coupling_reward,
            power_balance: pb_reward,
            quality_maintenance,
            time_efficiency,
            disconnection_penalty: 0.0,
            total,
            clipped,
        };
        (clipped, breakdown)
    }

    /// Unscaled end-of-episode bonus against the final metrics: flat
    /// completion component plus tiered quality components plus an
    /// early-finish efficiency component. A disconnected final partition
    /// overrides everything with the flat penalty.
    fn final_bonus(&self, metrics: &PartitionMetrics, current_step: usize) -> FinalBonusBreakdown {
        let w = &self.weights;

        if metrics.connectivity < 1.0 {
            return FinalBonusBreakdown {
                raw_total: w.disconnected_final_penalty,
                scale: 1.0,
                total: w.disconnected_final_penalty,
                metrics: metrics.clone(),
                ..FinalBonusBreakdown::default()
            };
        }

        let mut quality = 0.0;
        if metrics.load_cv < 0.1 {
            quality += 20.0;
        } else if metrics.load_cv < 0.2 {
            quality += 10.0;
        } else if metrics.load_cv < 0.3 {
            quality += 5.0;
        }

        let avg_coupling = metrics.avg_coupling();
        if avg_coupling < 0.3 {
            quality += 10.0;
        } else if avg_coupling < 0.5 {
            quality += 5.0;
        }

        if metrics.power_imbalance_mean < 10.0 {
            quality += 8.0;
        } else if metrics.power_imbalance_mean < 50.0 {
            quality += 4.0;
        }

        quality += w.connectivity_bonus;

        let mut efficiency = 0.0;
        if (current_step as f64) < self.max_steps as f64 * w.efficiency_cutoff {
            let ratio = 1.0 - current_step as f64 / self.max_steps as f64;
            efficiency = ratio * w.efficiency_bonus_scale;
        }

        let raw_total = w.completion_bonus + quality + efficiency;
        FinalBonusBreakdown {
            completion: w.completion_bonus,
            quality,
            efficiency,
            raw_total,
            scale: 1.0,
            total: raw_total,
            metrics: metrics.clone(),
        }
    }

    /// Terminal bonus scaled by how the episode ended.
    ///
    /// - natural completion: the full bonus;
    /// - stalled with unassigned nodes: bonus x completion ratio x the
    ///   stuck discount;
    /// - timeout on a complete assignment: bonus x the timeout discount;
    /// - timeout with nodes unassigned: flat penalty plus a penalty
    ///   proportional to the unassigned fraction (no bonus evaluation).
    pub fn terminal_bonus(
        &self,
        kind: TerminationKind,
        metrics: &PartitionMetrics,
        completion_ratio: f64,
        current_step: usize,
    ) -> (f64, FinalBonusBreakdown) {
        let w = &self.weights;
        match kind {
            TerminationKind::Natural => {
                let breakdown = self.final_bonus(metrics, current_step);
                (breakdown.total, breakdown)
            }
            TerminationKind::Stuck => {
                let mut breakdown = self.final_bonus(metrics, current_step);
                breakdown.scale = completion_ratio * w.stuck_discount;
                breakdown.total = breakdown.raw_total * breakdown.scale;
                (breakdown.total, breakdown)
            }
            TerminationKind::Timeout => {
                if completion_ratio >= 1.0 {
                    let mut breakdown = self.final_bonus(metrics, current_step);
                    breakdown.scale = w.timeout_completed_discount;
                    breakdown.total = breakdown.raw_total * breakdown.scale;
                    (breakdown.total, breakdown)
                } else {
                    let penalty = w.timeout_penalty_base
                        - (1.0 - completion_ratio) * w.timeout_penalty_scale;
                    let breakdown = FinalBonusBreakdown {
                        raw_total: penalty,
                        scale: 1.0,
                        total: penalty,
                        metrics: metrics.clone(),
                        ..FinalBonusBreakdown::default()
                    };
                    (penalty, breakdown)
                }
            }
        }
    }
}

/// The reward regime selected at construction. The step path matches on
/// this tag; no mode comparison happens anywhere else.
pub enum RewardStrategy {
    Legacy(LegacyReward),
    Enhanced(Box<dyn RewardModel>),
    DualLayer(Box<dyn RewardModel>),
}

impl RewardStrategy {
    pub fn mode(&self) -> RewardMode {
        match self {
            RewardStrategy::Legacy(_) => RewardMode::Legacy,
            RewardStrategy::Enhanced(_) => RewardMode::Enhanced,
            RewardStrategy::DualLayer(_) => RewardMode::DualLayer,
        }
    }
}

impl std::fmt::Debug for RewardStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mode().label())
    }
}
