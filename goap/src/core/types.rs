//! Shared deterministic types for pursuit bookkeeping.
//!
//! These types describe what a pursuit did. They carry no behavior and are
//! serializable so callers can persist or print them.

use serde::{Deserialize, Serialize};

/// Execution manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Executing,
    AwaitingSubgoal,
    Replanning,
    CoolingDown,
    Succeeded,
    Failed,
}

/// Why the manager left `Executing` for `Replanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanCause {
    /// Observed state no longer satisfies the next step's preconditions.
    Drift,
    /// A discovery action finished; its results were not known at plan time.
    Discovery,
    /// The runner rejected a step as unmet and no subgoal was declared.
    PreconditionUnmet,
    /// Observed state broke a safety invariant.
    Inconsistency,
    /// The plan ran out but the goal does not hold.
    PlanCompletedShort,
}

/// One state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub phase: Phase,
    pub depth: usize,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replan_cause: Option<ReplanCause>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl TransitionRecord {
    pub fn new(phase: Phase, depth: usize, goal: impl Into<String>) -> Self {
        Self {
            phase,
            depth,
            goal: goal.into(),
            step: None,
            replan_cause: None,
            detail: String::new(),
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_cause(mut self, cause: ReplanCause) -> Self {
        self.replan_cause = Some(cause);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Counters accumulated over a whole pursuit, subgoals included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PursuitStats {
    pub plans: u32,
    pub steps_executed: u32,
    pub replans: u32,
    pub subgoals: u32,
    pub cooldowns: u32,
    pub max_depth_reached: usize,
}

/// Ordered transition log of a pursuit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PursuitLog {
    pub transitions: Vec<TransitionRecord>,
    pub stats: PursuitStats,
}

impl PursuitLog {
    pub fn record(&mut self, record: TransitionRecord) {
        if record.depth > self.stats.max_depth_reached {
            self.stats.max_depth_reached = record.depth;
        }
        self.transitions.push(record);
    }

    /// Phases in order, for compact assertions and summaries.
    pub fn phases(&self) -> Vec<Phase> {
        self.transitions.iter().map(|record| record.phase).collect()
    }

    pub fn replan_causes(&self) -> Vec<ReplanCause> {
        self.transitions
            .iter()
            .filter_map(|record| record.replan_cause)
            .collect()
    }
}
