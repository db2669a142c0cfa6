//! Episode termination rules.
//!
//! Checked once per step, in a fixed order: budget exhaustion first
//! (truncation always wins), then "stuck" (no legal move remains), then
//! reward convergence over a trailing window. At most one terminal flag
//! is ever set.

use serde::Serialize;

use crate::config::ConvergenceConfig;

/// How a finished episode ended, used to select the terminal bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    /// Natural termination with every node assigned
    Natural,
    /// Natural termination with unassigned nodes remaining
    Stuck,
    /// Step budget exhausted
    Timeout,
}

impl TerminationKind {
    pub fn label(&self) -> &'static str {
        match self {
            TerminationKind::Natural => "natural",
            TerminationKind::Stuck => "stuck",
            TerminationKind::Timeout => "timeout",
        }
    }
}

/// Labeled reason attached to the terminal step's info record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The submitted action failed validation; episode force-closed
    InvalidAction,
    /// All nodes assigned, no further improvement possible or converged
    NaturalCompletion,
    /// No legal move remained while nodes were still unassigned
    NoValidActions,
    /// Budget ran out on a fully assigned partition
    TimeoutCompleted,
    /// Budget ran out with nodes still unassigned
    TimeoutIncomplete,
}

/// Terminal flags for one step. Both false while the episode is live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeStatus {
    pub terminated: bool,
    pub truncated: bool,
}

impl EpisodeStatus {
    pub fn is_over(&self) -> bool {
        self.terminated || self.truncated
    }
}

#[derive(Debug)]
pub struct TerminationEvaluator {
    max_steps: usize,
    convergence: ConvergenceConfig,
}

impl TerminationEvaluator {
    pub fn new(max_steps: usize, convergence: ConvergenceConfig) -> Self {
        Self {
            max_steps,
            convergence,
        }
    }

    /// Evaluate the termination rules for the step that just completed.
    pub fn check(
        &self,
        current_step: usize,
        valid_action_count: usize,
        reward_history: &[f64],
    ) -> EpisodeStatus {
        if current_step >= self.max_steps {
            return EpisodeStatus {
                terminated: false,
                truncated: true,
            };
        }
        if valid_action_count == 0 {
            return EpisodeStatus {
                terminated: true,
                truncated: false,
            };
        }
        if self.converged(reward_history) {
            return EpisodeStatus {
                terminated: true,
                truncated: false,
            };
        }
        EpisodeStatus::default()
    }

    /// True when the trailing reward window is full and its standard
    /// deviation is below the convergence threshold.
    fn converged(&self, reward_history: &[f64]) -> bool {
        let window = self.convergence.window;
        if window == 0 || reward_history.len() < window {
            return false;
        }
        let recent = &reward_history[reward_history.len() - window..];
        let mean = recent.iter().sum::<f64>() / window as f64;
        let var = recent.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / window as f64;
        var.sqrt() < self.convergence.threshold
    }

    /// Classify a finished episode for terminal-bonus selection.
    pub fn classify(status: EpisodeStatus, fully_assigned: bool) -> Option<TerminationKind> {
        if status.terminated {
            Some(if fully_assigned {
                TerminationKind::Natural
            } else {
                TerminationKind::Stuck
            })
        } else if status.truncated {
            Some(TerminationKind::Timeout)
        } else {
            None
        }
    }
}
