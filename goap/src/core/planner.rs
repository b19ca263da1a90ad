//! Weighted A* search over world states.
//!
//! - `g`: accumulated action cost from the start state.
//! - `h`: number of goal constraints not satisfied. Orders the search only; it
//!   is not admissible for every catalog.
//! - Frontier order: `g + h`, then lower `g`, then insertion order. Together
//!   with catalog declaration order this makes search fully deterministic.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::catalog::{ActionCatalog, ActionDefinition, Params};
use crate::core::goal::GoalSpec;
use crate::core::state::{StateKey, Value, WorldState, apply, matches, unsatisfied};

/// Bounds on a single search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Maximum number of node expansions.
    pub max_expansions: usize,
    /// Maximum number of steps in a plan.
    pub max_plan_length: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_expansions: 10_000,
            max_plan_length: 32,
        }
    }
}

/// One action of a plan with its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub action: Arc<ActionDefinition>,
    pub params: Params,
}

impl PlanStep {
    pub fn name(&self) -> &str {
        &self.action.name
    }
}

/// Ordered, immutable sequence of steps reaching a goal.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub total_cost: u64,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.steps.iter().map(PlanStep::name).collect()
    }

    /// State predicted by applying every step's effects to `start`.
    pub fn predicted_final_state(&self, start: &WorldState) -> WorldState {
        self.steps
            .iter()
            .fold(start.clone(), |state, step| apply(&state, &step.action.effects))
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "plan {} for '{}' (cost {}, {} steps)",
            self.id,
            self.goal,
            self.total_cost,
            self.steps.len()
        )?;
        for (idx, step) in self.steps.iter().enumerate() {
            writeln!(f, "  {}. {} (cost {})", idx + 1, step.name(), step.action.cost)?;
        }
        Ok(())
    }
}

/// Why a search stopped without reaching the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExhaustionReason {
    /// Every reachable state was explored.
    NoSolution,
    /// The expansion budget ran out first.
    ExpansionBudget { limit: usize },
    /// Some states were not expanded because plans would exceed the length
    /// bound.
    DepthLimit { limit: usize },
}

impl ExhaustionReason {
    /// True when a solution might still exist beyond the search bounds.
    pub fn is_budget_exceeded(&self) -> bool {
        !matches!(self, ExhaustionReason::NoSolution)
    }
}

/// A precondition that did not hold where an action was needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmetPrecondition {
    pub key: StateKey,
    pub required: Value,
    pub found: Option<Value>,
}

/// The blocked action closest to being applicable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedAction {
    pub action: String,
    pub unmet: Vec<UnmetPrecondition>,
}

/// Diagnosis of a failed search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BottleneckReport {
    pub goal: String,
    pub reason: ExhaustionReason,
    /// Goal keys never satisfied by any discovered state.
    pub unreached_keys: Vec<StateKey>,
    pub blocked_action: Option<BlockedAction>,
    pub expansions: usize,
}

impl fmt::Display for BottleneckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            ExhaustionReason::NoSolution => "no solution exists".to_string(),
            ExhaustionReason::ExpansionBudget { limit } => {
                format!("search budget exceeded ({limit} expansions)")
            }
            ExhaustionReason::DepthLimit { limit } => {
                format!("search budget exceeded (plan length {limit})")
            }
        };
        write!(
            f,
            "goal '{}' unreachable: {} after {} expansions",
            self.goal, reason, self.expansions
        )?;
        if !self.unreached_keys.is_empty() {
            let keys: Vec<&str> = self.unreached_keys.iter().map(|key| key.name()).collect();
            write!(f, "; never satisfied: {}", keys.join(", "))?;
        }
        if let Some(blocked) = &self.blocked_action {
            let unmet: Vec<String> = blocked
                .unmet
                .iter()
                .map(|pre| match &pre.found {
                    Some(found) => format!("{}={} (found {})", pre.key, pre.required, found),
                    None => format!("{}={} (missing)", pre.key, pre.required),
                })
                .collect();
            write!(f, "; blocked: {} needs {}", blocked.action, unmet.join(", "))?;
        }
        Ok(())
    }
}

/// Search failed; carries the bottleneck report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("planning exhausted: {report}")]
pub struct PlanningExhausted {
    pub report: BottleneckReport,
}

#[derive(Debug)]
struct Node {
    state: WorldState,
    g: u64,
    depth: usize,
    parent: Option<usize>,
    action: Option<usize>,
}

/// Candidate for the "nearest blocked action" in a bottleneck report, ordered
/// so that the minimum is the best candidate.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct BlockedRank {
    unmet: usize,
    h: usize,
    g: u64,
    action: usize,
}

/// Plans over an [`ActionCatalog`] within [`SearchLimits`].
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    catalog: &'a ActionCatalog,
    limits: SearchLimits,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a ActionCatalog, limits: SearchLimits) -> Self {
        Self { catalog, limits }
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    /// Find the lowest-cost plan from `start` to `goal.target`.
    pub fn plan(&self, start: &WorldState, goal: &GoalSpec) -> Result<Plan, PlanningExhausted> {
        let actions: Vec<&Arc<ActionDefinition>> = self.catalog.iter().collect();
        let target = &goal.target;

        let mut nodes = vec![Node {
            state: start.clone(),
            g: 0,
            depth: 0,
            parent: None,
            action: None,
        }];
        let mut best_g: HashMap<WorldState, u64> = HashMap::new();
        best_g.insert(start.clone(), 0);

        let mut reached: BTreeSet<StateKey> = satisfied_keys(start, target);
        let mut frontier = BinaryHeap::new();
        let mut seq = 0u64;
        frontier.push(Reverse((heuristic(start, target) as u64, 0u64, seq, 0usize)));

        let mut expansions = 0usize;
        let mut budget_hit = false;
        let mut depth_pruned = false;
        let mut blocked: Option<(BlockedRank, Vec<UnmetPrecondition>)> = None;

        while let Some(Reverse((_, g, _, node_idx))) = frontier.pop() {
            let state = nodes[node_idx].state.clone();
            if best_g.get(&state).is_some_and(|best| *best < g) {
                continue;
            }
            if matches(&state, target) {
                let plan = self.reconstruct(&nodes, node_idx, &actions, goal);
                debug!(
                    goal = %goal.name,
                    expansions,
                    steps = plan.len(),
                    cost = plan.total_cost,
                    "plan found"
                );
                return Ok(plan);
            }
            if expansions >= self.limits.max_expansions {
                budget_hit = true;
                break;
            }
            expansions += 1;

            let depth = nodes[node_idx].depth;
            if depth >= self.limits.max_plan_length {
                depth_pruned = true;
                continue;
            }

            let h = heuristic(&state, target);
            let missing = unsatisfied(&state, target);
            for (action_idx, action) in actions.iter().enumerate() {
                if !matches(&state, &action.preconditions) {
                    if helps(action, target, &missing) {
                        let unmet = unmet_preconditions(&state, action);
                        let rank = BlockedRank {
                            unmet: unmet.len(),
                            h,
                            g,
                            action: action_idx,
                        };
                        if blocked.as_ref().is_none_or(|(best, _)| rank < *best) {
                            blocked = Some((rank, unmet));
                        }
                    }
                    continue;
                }

                let successor = apply(&state, &action.effects);
                let successor_g = g + u64::from(action.cost);
                if best_g
                    .get(&successor)
                    .is_some_and(|best| *best <= successor_g)
                {
                    continue;
                }
                best_g.insert(successor.clone(), successor_g);
                reached.extend(satisfied_keys(&successor, target));

                let f = successor_g + heuristic(&successor, target) as u64;
                seq += 1;
                nodes.push(Node {
                    state: successor,
                    g: successor_g,
                    depth: depth + 1,
                    parent: Some(node_idx),
                    action: Some(action_idx),
                });
                frontier.push(Reverse((f, successor_g, seq, nodes.len() - 1)));
            }
        }

        let reason = if budget_hit {
            ExhaustionReason::ExpansionBudget {
                limit: self.limits.max_expansions,
            }
        } else if depth_pruned {
            ExhaustionReason::DepthLimit {
                limit: self.limits.max_plan_length,
            }
        } else {
            ExhaustionReason::NoSolution
        };
        let unreached_keys = target.keys().filter(|key| !reached.contains(key)).collect();
        let blocked_action = blocked.map(|(rank, unmet)| BlockedAction {
            action: actions[rank.action].name.clone(),
            unmet,
        });
        debug!(goal = %goal.name, expansions, ?reason, "planning exhausted");

        Err(PlanningExhausted {
            report: BottleneckReport {
                goal: goal.name.clone(),
                reason,
                unreached_keys,
                blocked_action,
                expansions,
            },
        })
    }

    fn reconstruct(
        &self,
        nodes: &[Node],
        goal_idx: usize,
        actions: &[&Arc<ActionDefinition>],
        goal: &GoalSpec,
    ) -> Plan {
        let mut steps = Vec::new();
        let mut cursor = Some(goal_idx);
        while let Some(idx) = cursor {
            let node = &nodes[idx];
            if let Some(action_idx) = node.action {
                let action = Arc::clone(actions[action_idx]);
                steps.push(PlanStep {
                    params: action.params.clone(),
                    action,
                });
            }
            cursor = node.parent;
        }
        steps.reverse();
        Plan {
            id: Uuid::new_v4(),
            goal: goal.name.clone(),
            steps,
            total_cost: nodes[goal_idx].g,
        }
    }
}

fn heuristic(state: &WorldState, target: &WorldState) -> usize {
    target
        .iter()
        .filter(|(key, required)| state.get(*key) != Some(*required))
        .count()
}

fn satisfied_keys(state: &WorldState, target: &WorldState) -> BTreeSet<StateKey> {
    target
        .iter()
        .filter(|(key, required)| state.get(*key) == Some(*required))
        .map(|(key, _)| key)
        .collect()
}

/// True if `action` would set at least one currently missing goal constraint.
fn helps(action: &ActionDefinition, target: &WorldState, missing: &[StateKey]) -> bool {
    missing.iter().any(|key| {
        action
            .effects
            .get(*key)
            .is_some_and(|value| target.get(*key) == Some(value))
    })
}

fn unmet_preconditions(state: &WorldState, action: &ActionDefinition) -> Vec<UnmetPrecondition> {
    action
        .preconditions
        .iter()
        .filter(|(key, required)| state.get(*key) != Some(*required))
        .map(|(key, required)| UnmetPrecondition {
            key,
            required: required.clone(),
            found: state.get(key).cloned(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_state;

    fn scenario_a_catalog() -> ActionCatalog {
        ActionCatalog::from_actions([
            ActionDefinition::builder("move")
                .cost(1)
                .effect(StateKey::AtTarget, true)
                .build()
                .expect("move"),
            ActionDefinition::builder("gather")
                .cost(2)
                .pre(StateKey::AtTarget, true)
                .effect(StateKey::HasItem, true)
                .build()
                .expect("gather"),
        ])
        .expect("catalog")
    }

    fn has_item_goal() -> GoalSpec {
        GoalSpec::new("get_item", world_state! { HasItem => true }.expect("target"))
    }

    #[test]
    fn finds_move_then_gather() {
        let catalog = scenario_a_catalog();
        let start = world_state! { AtTarget => false, HasItem => false }.expect("start");

        let plan = Planner::new(&catalog, SearchLimits::default())
            .plan(&start, &has_item_goal())
            .expect("plan");

        assert_eq!(plan.action_names(), vec!["move", "gather"]);
        assert_eq!(plan.total_cost, 3);
    }

    #[test]
    fn satisfied_goal_yields_empty_plan() {
        let catalog = scenario_a_catalog();
        let start = world_state! { HasItem => true }.expect("start");
        let plan = Planner::new(&catalog, SearchLimits::default())
            .plan(&start, &has_item_goal())
            .expect("plan");
        assert!(plan.is_empty());
        assert_eq!(plan.total_cost, 0);
    }

    #[test]
    fn prefers_cheaper_path_over_shorter_one() {
        let catalog = ActionCatalog::from_actions([
            ActionDefinition::builder("buy")
                .cost(10)
                .effect(StateKey::HasItem, true)
                .build()
                .expect("buy"),
            ActionDefinition::builder("move")
                .cost(1)
                .effect(StateKey::AtTarget, true)
                .build()
                .expect("move"),
            ActionDefinition::builder("gather")
                .cost(2)
                .pre(StateKey::AtTarget, true)
                .effect(StateKey::HasItem, true)
                .build()
                .expect("gather"),
        ])
        .expect("catalog");
        let start = world_state! { AtTarget => false, HasItem => false }.expect("start");

        let plan = Planner::new(&catalog, SearchLimits::default())
            .plan(&start, &has_item_goal())
            .expect("plan");

        assert_eq!(plan.action_names(), vec!["move", "gather"]);
        assert_eq!(plan.total_cost, 3);
    }

    #[test]
    fn unreachable_key_is_reported() {
        let catalog = scenario_a_catalog();
        let start = world_state! { AtTarget => false, HasItem => false }.expect("start");
        let goal = GoalSpec::new(
            "craft",
            world_state! { HasItem => true, HasCraftedItem => true }.expect("target"),
        );

        let err = Planner::new(&catalog, SearchLimits::default())
            .plan(&start, &goal)
            .expect_err("exhausted");

        assert_eq!(err.report.reason, ExhaustionReason::NoSolution);
        assert_eq!(err.report.unreached_keys, vec![StateKey::HasCraftedItem]);
    }

    #[test]
    fn blocked_action_names_unmet_precondition() {
        // gather needs at_target, but nothing can move there.
        let catalog = ActionCatalog::from_actions([ActionDefinition::builder("gather")
            .cost(2)
            .pre(StateKey::AtTarget, true)
            .effect(StateKey::HasItem, true)
            .build()
            .expect("gather")])
        .expect("catalog");
        let start = world_state! { AtTarget => false, HasItem => false }.expect("start");

        let err = Planner::new(&catalog, SearchLimits::default())
            .plan(&start, &has_item_goal())
            .expect_err("exhausted");

        let blocked = err.report.blocked_action.expect("blocked action");
        assert_eq!(blocked.action, "gather");
        assert_eq!(
            blocked.unmet,
            vec![UnmetPrecondition {
                key: StateKey::AtTarget,
                required: Value::Bool(true),
                found: Some(Value::Bool(false)),
            }]
        );
        assert_eq!(err.report.unreached_keys, vec![StateKey::HasItem]);
    }

    #[test]
    fn expansion_budget_is_distinguished_from_no_solution() {
        let catalog = scenario_a_catalog();
        let start = world_state! { AtTarget => false, HasItem => false }.expect("start");
        let limits = SearchLimits {
            max_expansions: 1,
            max_plan_length: 32,
        };

        let err = Planner::new(&catalog, limits)
            .plan(&start, &has_item_goal())
            .expect_err("budget");

        assert_eq!(
            err.report.reason,
            ExhaustionReason::ExpansionBudget { limit: 1 }
        );
        assert!(err.report.reason.is_budget_exceeded());
    }

    #[test]
    fn plan_length_bound_is_reported_as_depth_limit() {
        let catalog = scenario_a_catalog();
        let start = world_state! { AtTarget => false, HasItem => false }.expect("start");
        let limits = SearchLimits {
            max_expansions: 100,
            max_plan_length: 1,
        };

        let err = Planner::new(&catalog, limits)
            .plan(&start, &has_item_goal())
            .expect_err("depth");

        assert_eq!(err.report.reason, ExhaustionReason::DepthLimit { limit: 1 });
    }

    #[test]
    fn identical_inputs_yield_identical_plans() {
        let catalog = ActionCatalog::from_actions([
            ActionDefinition::builder("move_a")
                .cost(1)
                .effect(StateKey::AtTarget, true)
                .build()
                .expect("a"),
            ActionDefinition::builder("move_b")
                .cost(1)
                .effect(StateKey::AtTarget, true)
                .build()
                .expect("b"),
            ActionDefinition::builder("gather")
                .cost(2)
                .pre(StateKey::AtTarget, true)
                .effect(StateKey::HasItem, true)
                .build()
                .expect("gather"),
        ])
        .expect("catalog");
        let start = world_state! { AtTarget => false, HasItem => false }.expect("start");
        let planner = Planner::new(&catalog, SearchLimits::default());

        let first = planner.plan(&start, &has_item_goal()).expect("first");
        for _ in 0..10 {
            let again = planner.plan(&start, &has_item_goal()).expect("again");
            assert_eq!(again.steps, first.steps);
            assert_eq!(again.total_cost, first.total_cost);
        }
        // Ties resolve to the earlier declaration.
        assert_eq!(first.action_names(), vec!["move_a", "gather"]);
    }
}
