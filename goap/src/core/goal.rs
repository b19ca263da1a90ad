//! Goal specifications.

use std::collections::HashSet;
use std::time::Duration;

use crate::core::error::CatalogError;
use crate::core::state::WorldState;

/// A partial target state the agent should reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalSpec {
    pub name: String,
    /// Constraints that must all hold for the goal to be reached.
    pub target: WorldState,
    /// Higher is more important.
    pub priority: u32,
    /// Tightens the pursuit deadline for this goal and its subgoals.
    pub timeout: Option<Duration>,
}

impl GoalSpec {
    pub fn new(name: impl Into<String>, target: WorldState) -> Self {
        Self {
            name: name.into(),
            target,
            priority: 0,
            timeout: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_satisfied_by(&self, state: &WorldState) -> bool {
        state.satisfies(&self.target)
    }
}

/// Reject candidate lists that declare the same goal name twice.
pub fn ensure_unique_goal_names(goals: &[GoalSpec]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for goal in goals {
        if !seen.insert(goal.name.as_str()) {
            return Err(CatalogError::DuplicateGoal {
                name: goal.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_goal_names_are_rejected() {
        let goals = vec![
            GoalSpec::new("level_up", WorldState::new()),
            GoalSpec::new("gather", WorldState::new()),
            GoalSpec::new("level_up", WorldState::new()),
        ];
        let err = ensure_unique_goal_names(&goals).expect_err("duplicate");
        assert_eq!(
            err,
            CatalogError::DuplicateGoal {
                name: "level_up".to_string()
            }
        );
    }

    #[test]
    fn satisfied_goal_matches_state() {
        let goal = GoalSpec::new(
            "hold_item",
            crate::world_state! { HasItem => true }.expect("target"),
        );
        let state = crate::world_state! { HasItem => true, AtTarget => false }.expect("state");
        assert!(goal.is_satisfied_by(&state));
    }
}
