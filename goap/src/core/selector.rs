//! Weighted multi-factor goal selection.
//!
//! `score = w_n·necessity + w_f·feasibility + w_p·progression + w_s·stability`
//! with every term in `[0, 1]`. Feasibility comes from a bounded planner probe;
//! candidates that fail the probe are only chosen when nothing else is
//! feasible. Ties keep declaration order.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::catalog::ActionCatalog;
use crate::core::error::CatalogError;
use crate::core::game_data::GameDataProvider;
use crate::core::goal::{GoalSpec, ensure_unique_goal_names};
use crate::core::planner::{BottleneckReport, Planner, SearchLimits};
use crate::core::state::{StateKey, Value, WorldState};

/// Cost at which a feasible goal scores 0.5 feasibility.
const FEASIBILITY_HALF_COST: f64 = 10.0;

/// Relative weight of each scoring term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub necessity: f64,
    pub feasibility: f64,
    pub progression: f64,
    pub stability: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            necessity: 0.25,
            feasibility: 0.25,
            progression: 0.25,
            stability: 0.25,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("necessity", self.necessity),
            ("feasibility", self.feasibility),
            ("progression", self.progression),
            ("stability", self.stability),
        ];
        for (name, weight) in all {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("weights.{name} must be a non-negative number"));
            }
        }
        if all.iter().all(|(_, weight)| *weight == 0.0) {
            return Err("at least one weight must be > 0".to_string());
        }
        Ok(())
    }
}

/// Per-goal scoring hooks supplied by the embedding application.
pub trait GoalScorer: Send + Sync {
    fn necessity(&self, _goal: &GoalSpec, _state: &WorldState) -> Option<f64> {
        None
    }

    fn progression(&self, _goal: &GoalSpec, _state: &WorldState) -> Option<f64> {
        None
    }
}

/// Outcome of the bounded feasibility probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Probe {
    Feasible { cost: u64, steps: usize },
    Infeasible { report: BottleneckReport },
}

/// Score breakdown for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalScore {
    pub goal: String,
    pub necessity: f64,
    pub feasibility: f64,
    pub progression: f64,
    pub stability: f64,
    pub total: f64,
    pub probe: Probe,
}

impl GoalScore {
    pub fn is_feasible(&self) -> bool {
        matches!(self.probe, Probe::Feasible { .. })
    }
}

/// Result of a selection round.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `index` points into the candidate slice; `scores` covers every
    /// candidate not already satisfied, in declaration order.
    Selected { index: usize, scores: Vec<GoalScore> },
    /// Every candidate already holds in the current state.
    AllSatisfied,
    /// The candidate list was empty.
    NoCandidates,
}

/// Picks the next goal to pursue.
#[derive(Clone)]
pub struct GoalSelector {
    weights: ScoreWeights,
    probe_limits: SearchLimits,
    game_data: Arc<dyn GameDataProvider>,
    scorers: HashMap<String, Arc<dyn GoalScorer>>,
}

impl std::fmt::Debug for GoalSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalSelector")
            .field("weights", &self.weights)
            .field("probe_limits", &self.probe_limits)
            .field("scorers", &self.scorers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GoalSelector {
    pub fn new(
        weights: ScoreWeights,
        probe_limits: SearchLimits,
        game_data: Arc<dyn GameDataProvider>,
    ) -> Self {
        Self {
            weights,
            probe_limits,
            game_data,
            scorers: HashMap::new(),
        }
    }

    /// Attach scoring hooks to the goal named `goal`.
    pub fn with_scorer(mut self, goal: impl Into<String>, scorer: Arc<dyn GoalScorer>) -> Self {
        self.scorers.insert(goal.into(), scorer);
        self
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Score every unsatisfied candidate and pick one.
    pub fn select(
        &self,
        catalog: &ActionCatalog,
        state: &WorldState,
        candidates: &[GoalSpec],
    ) -> Result<Selection, CatalogError> {
        ensure_unique_goal_names(candidates)?;
        if candidates.is_empty() {
            return Ok(Selection::NoCandidates);
        }

        let max_priority = candidates.iter().map(|goal| goal.priority).max().unwrap_or(0);
        let mut scored: Vec<(usize, GoalScore)> = Vec::new();
        for (index, goal) in candidates.iter().enumerate() {
            if goal.is_satisfied_by(state) {
                debug!(goal = %goal.name, "candidate already satisfied");
                continue;
            }
            scored.push((index, self.score(catalog, state, goal, max_priority)));
        }
        if scored.is_empty() {
            return Ok(Selection::AllSatisfied);
        }

        let any_feasible = scored.iter().any(|(_, score)| score.is_feasible());
        let mut best: Option<(usize, f64)> = None;
        for (index, score) in &scored {
            if any_feasible && !score.is_feasible() {
                continue;
            }
            // Strictly greater keeps the earliest declaration on ties.
            if best.is_none_or(|(_, total)| score.total > total) {
                best = Some((*index, score.total));
            }
        }
        let index = match best {
            Some((index, _)) => index,
            None => scored[0].0,
        };
        debug!(goal = %candidates[index].name, any_feasible, "goal selected");

        Ok(Selection::Selected {
            index,
            scores: scored.into_iter().map(|(_, score)| score).collect(),
        })
    }

    /// Compute the score breakdown for a single goal.
    pub fn score(
        &self,
        catalog: &ActionCatalog,
        state: &WorldState,
        goal: &GoalSpec,
        max_priority: u32,
    ) -> GoalScore {
        let scorer = self.scorers.get(&goal.name);

        let necessity = scorer
            .and_then(|hook| hook.necessity(goal, state))
            .or_else(|| self.game_data.necessity(goal, state))
            .unwrap_or_else(|| priority_necessity(goal.priority, max_priority));

        let probe = match Planner::new(catalog, self.probe_limits).plan(state, goal) {
            Ok(plan) => Probe::Feasible {
                cost: plan.total_cost,
                steps: plan.len(),
            },
            Err(exhausted) => Probe::Infeasible {
                report: exhausted.report,
            },
        };
        let feasibility = match &probe {
            Probe::Feasible { cost, .. } => {
                FEASIBILITY_HALF_COST / (FEASIBILITY_HALF_COST + *cost as f64)
            }
            Probe::Infeasible { .. } => 0.0,
        };

        let progression = scorer
            .and_then(|hook| hook.progression(goal, state))
            .or_else(|| self.game_data.progression(goal, state))
            .unwrap_or_else(|| target_progress(state, &goal.target));

        let stability = target_stability(&goal.target, self.game_data.as_ref());

        let necessity = clamp_unit(necessity);
        let progression = clamp_unit(progression);
        let total = self.weights.necessity * necessity
            + self.weights.feasibility * feasibility
            + self.weights.progression * progression
            + self.weights.stability * stability;

        GoalScore {
            goal: goal.name.clone(),
            necessity,
            feasibility,
            progression,
            stability,
            total,
            probe,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn priority_necessity(priority: u32, max_priority: u32) -> f64 {
    if max_priority == 0 {
        return 1.0;
    }
    f64::from(priority) / f64::from(max_priority)
}

/// Fraction of the target already accomplished.
///
/// Booleans and strings count as done only when equal. Integers count
/// proportionally toward a positive target.
pub fn target_progress(state: &WorldState, target: &WorldState) -> f64 {
    if target.is_empty() {
        return 1.0;
    }
    let total: f64 = target
        .iter()
        .map(|(key, required)| constraint_progress(state.get(key), required))
        .sum();
    total / target.len() as f64
}

fn constraint_progress(current: Option<&Value>, required: &Value) -> f64 {
    match (current, required) {
        (Some(Value::Int(current)), Value::Int(required)) => {
            if current == required {
                1.0
            } else if *required > 0 && *current >= 0 {
                (*current as f64 / *required as f64).min(1.0)
            } else {
                0.0
            }
        }
        (Some(current), required) if current == required => 1.0,
        _ => 0.0,
    }
}

/// Fraction of target constraints that are reasonable to aim for.
///
/// Boolean and string targets are always reasonable: they are only ever
/// compared by equality. Integer targets must fall inside the provider's
/// bounds when bounds are known.
pub fn target_stability(target: &WorldState, game_data: &dyn GameDataProvider) -> f64 {
    if target.is_empty() {
        return 1.0;
    }
    let reasonable = target
        .iter()
        .filter(|(key, required)| target_is_reasonable(*key, required, game_data))
        .count();
    reasonable as f64 / target.len() as f64
}

fn target_is_reasonable(key: StateKey, required: &Value, game_data: &dyn GameDataProvider) -> bool {
    match required {
        Value::Bool(_) | Value::Text(_) => true,
        Value::Int(required) => match game_data.bounds(key) {
            Some((min, max)) => (min..=max).contains(required),
            None => true,
        },
    }
}
