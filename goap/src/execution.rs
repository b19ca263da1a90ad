//! Goal pursuit: plan, execute, recover, recurse.
//!
//! A pursuit is a state machine over [`Phase`]:
//!
//! ```text
//! Planning -> Executing -> { AwaitingSubgoal | Replanning | CoolingDown } -> Executing
//!          -> Succeeded | Failed
//! ```
//!
//! Every step is executed through the [`ActionRunner`] and only the observed
//! delta is applied to the context. Subgoals re-enter the same cycle in a
//! child context one level deeper; the parent retries the blocked step after
//! the child succeeds. Replans, cooldown waits and subgoal rounds are each
//! bounded by [`AgentConfig`], and the whole pursuit runs under a wall-clock
//! deadline.

use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::core::budget::{remaining_budget, tighten_deadline};
use crate::core::catalog::ActionCatalog;
use crate::core::context::ExecutionContext;
use crate::core::error::{CatalogError, SubgoalError};
use crate::core::goal::GoalSpec;
use crate::core::invariants::validate_state_invariants;
use crate::core::planner::{BottleneckReport, Plan, PlanStep, Planner};
use crate::core::selector::{GoalScore, GoalSelector, Selection};
use crate::core::state::WorldState;
use crate::core::subgoal::{SubgoalRequest, build_goal};
use crate::core::types::{Phase, PursuitLog, ReplanCause, TransitionRecord};
use crate::explain::{Explanation, explain_plan};
use crate::io::config::AgentConfig;
use crate::io::runner::{ActionFailure, ActionRunner, RunnerContext};

/// Why a pursuit failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PursuitFailure {
    #[error("{0}")]
    PlanningExhausted(BottleneckReport),
    #[error("subgoal depth {requested} exceeds max depth {max}")]
    MaxDepthExceeded { requested: usize, max: usize },
    #[error(transparent)]
    Subgoal(#[from] SubgoalError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("step '{step}' failed: {failure:?}")]
    ActionFailed {
        step: String,
        failure: ActionFailure,
        message: Option<String>,
    },
    #[error("goal '{goal}' needed more than {limit} replans")]
    ReplanLimitExceeded { goal: String, limit: u32 },
    #[error("step '{step}' still cooling down after {limit} retries")]
    CooldownRetriesExhausted { step: String, limit: u32 },
    #[error("step '{step}' still blocked after {limit} subgoal rounds")]
    SubgoalAttemptsExhausted { step: String, limit: u32 },
    #[error("observed state violates invariants: {}", .violations.join("; "))]
    StateInconsistency { violations: Vec<String> },
    #[error("subgoal '{goal}' for step '{step}' failed")]
    SubgoalFailed {
        goal: String,
        step: String,
        #[source]
        source: Box<PursuitFailure>,
    },
    #[error("goal '{goal}' timed out")]
    TimedOut { goal: String },
    #[error("no candidate goals")]
    NoCandidates,
    #[error("action runner error: {0}")]
    Runner(String),
}

impl PursuitFailure {
    /// Failures that end the top-level pursuit as-is instead of being
    /// attributed to the parent step.
    fn passes_through(&self) -> bool {
        matches!(
            self,
            PursuitFailure::MaxDepthExceeded { .. }
                | PursuitFailure::Subgoal(_)
                | PursuitFailure::TimedOut { .. }
                | PursuitFailure::Runner(_)
        )
    }

    /// The innermost failure of a chain of subgoal failures.
    pub fn root_cause(&self) -> &PursuitFailure {
        match self {
            PursuitFailure::SubgoalFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Terminal status of a pursuit.
#[derive(Debug, Clone, PartialEq)]
pub enum PursuitStatus {
    Succeeded,
    Failed(PursuitFailure),
    /// The selected goal could not be planned at all.
    Exhausted(BottleneckReport),
}

#[derive(Debug, Clone)]
pub struct PursuitResult {
    pub status: PursuitStatus,
    /// Goal that was pursued; `None` when selection never picked one.
    pub goal: Option<String>,
    pub log: PursuitLog,
    /// Last state known to the top-level context.
    pub final_state: WorldState,
    /// Selector breakdown for the round that chose `goal`.
    pub scores: Vec<GoalScore>,
}

impl PursuitResult {
    pub fn is_success(&self) -> bool {
        self.status == PursuitStatus::Succeeded
    }

    fn without_goal(status: PursuitStatus, final_state: WorldState) -> Self {
        Self {
            status,
            goal: None,
            log: PursuitLog::default(),
            final_state,
            scores: Vec::new(),
        }
    }
}

/// Drives goal pursuits for one agent.
///
/// The catalog can be swapped between pursuits with
/// [`replace_catalog`](Self::replace_catalog); a running pursuit keeps the
/// catalog it started with.
pub struct ExecutionManager<R> {
    runner: R,
    catalog: RwLock<Arc<ActionCatalog>>,
    selector: GoalSelector,
    config: AgentConfig,
}

impl<R: ActionRunner> ExecutionManager<R> {
    pub fn new(
        runner: R,
        catalog: ActionCatalog,
        selector: GoalSelector,
        config: AgentConfig,
    ) -> Self {
        Self {
            runner,
            catalog: RwLock::new(Arc::new(catalog)),
            selector,
            config,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn catalog(&self) -> Arc<ActionCatalog> {
        let guard = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install a new catalog for subsequent pursuits, returning the old one.
    pub fn replace_catalog(&self, catalog: ActionCatalog) -> Arc<ActionCatalog> {
        let mut guard = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        info!(actions = catalog.len(), "action catalog replaced");
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    /// Plan `goal` from `state` without executing anything.
    pub fn explain_plan(&self, goal: &GoalSpec, state: &WorldState) -> Explanation {
        explain_plan(&self.catalog(), goal, state, self.config.search_limits())
    }

    /// Pick the best candidate for the current world and pursue it to a
    /// terminal state.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn select_and_pursue_goal(&self, candidates: &[GoalSpec]) -> PursuitResult {
        let state = match self.runner.snapshot().await {
            Ok(state) => state,
            Err(err) => {
                return PursuitResult::without_goal(
                    PursuitStatus::Failed(PursuitFailure::Runner(format!("{err:#}"))),
                    WorldState::new(),
                );
            }
        };

        let catalog = self.catalog();
        match self.selector.select(&catalog, &state, candidates) {
            Err(err) => PursuitResult::without_goal(
                PursuitStatus::Failed(PursuitFailure::Catalog(err)),
                state,
            ),
            Ok(Selection::NoCandidates) => PursuitResult::without_goal(
                PursuitStatus::Failed(PursuitFailure::NoCandidates),
                state,
            ),
            Ok(Selection::AllSatisfied) => {
                info!("every candidate goal already holds");
                PursuitResult::without_goal(PursuitStatus::Succeeded, state)
            }
            Ok(Selection::Selected { index, scores }) => {
                self.pursue_from(catalog, &candidates[index], state, scores)
                    .await
            }
        }
    }

    /// Pursue a specific goal, skipping selection.
    pub async fn pursue(&self, goal: &GoalSpec) -> PursuitResult {
        match self.runner.snapshot().await {
            Ok(state) => {
                self.pursue_from(self.catalog(), goal, state, Vec::new())
                    .await
            }
            Err(err) => PursuitResult {
                goal: Some(goal.name.clone()),
                ..PursuitResult::without_goal(
                    PursuitStatus::Failed(PursuitFailure::Runner(format!("{err:#}"))),
                    WorldState::new(),
                )
            },
        }
    }

    async fn pursue_from(
        &self,
        catalog: Arc<ActionCatalog>,
        goal: &GoalSpec,
        state: WorldState,
        scores: Vec<GoalScore>,
    ) -> PursuitResult {
        let mut pursuit = Pursuit {
            manager: self,
            catalog,
            log: PursuitLog::default(),
        };
        let mut ctx = ExecutionContext::new(state, self.config.max_depth);
        let deadline = Instant::now() + self.config.pursuit_timeout();

        let status = match pursuit.run_goal(goal, &mut ctx, deadline).await {
            Ok(()) => PursuitStatus::Succeeded,
            Err(PursuitFailure::PlanningExhausted(report)) => PursuitStatus::Exhausted(report),
            Err(err) => PursuitStatus::Failed(err),
        };
        info!(goal = %goal.name, status = ?status, "pursuit finished");

        PursuitResult {
            status,
            goal: Some(goal.name.clone()),
            log: pursuit.log,
            final_state: ctx.state,
            scores,
        }
    }
}

/// Mutable bookkeeping of one top-level pursuit, shared by its subgoals.
struct Pursuit<'m, R> {
    manager: &'m ExecutionManager<R>,
    catalog: Arc<ActionCatalog>,
    log: PursuitLog,
}

/// Per-goal retry counters.
#[derive(Debug, Default)]
struct Attempts {
    replans: u32,
    cooldowns: u32,
    subgoal_rounds: u32,
}

impl Attempts {
    fn next_step(&mut self) {
        self.cooldowns = 0;
        self.subgoal_rounds = 0;
    }
}

impl<R: ActionRunner> Pursuit<'_, R> {
    /// Run `goal` to completion under its own deadline.
    ///
    /// Boxed so that subgoals can recurse through it.
    fn run_goal<'a>(
        &'a mut self,
        goal: &'a GoalSpec,
        ctx: &'a mut ExecutionContext,
        deadline: Instant,
    ) -> BoxFuture<'a, Result<(), PursuitFailure>> {
        let span = info_span!("goal", goal = %goal.name, depth = ctx.depth());
        async move {
            let depth = ctx.depth();
            let deadline = tighten_deadline(deadline, goal.timeout);
            let result = match timeout_at(deadline, self.run_cycle(goal, ctx, deadline)).await {
                Ok(result) => result,
                Err(_) => Err(PursuitFailure::TimedOut {
                    goal: goal.name.clone(),
                }),
            };
            let record = match &result {
                Ok(()) => TransitionRecord::new(Phase::Succeeded, depth, &goal.name),
                Err(err) => TransitionRecord::new(Phase::Failed, depth, &goal.name)
                    .with_detail(err.to_string()),
            };
            self.record(record);
            result
        }
        .instrument(span)
        .boxed()
    }

    async fn run_cycle(
        &mut self,
        goal: &GoalSpec,
        ctx: &mut ExecutionContext,
        deadline: Instant,
    ) -> Result<(), PursuitFailure> {
        let manager = self.manager;
        let config = &manager.config;
        let mut attempts = Attempts::default();

        self.record(TransitionRecord::new(Phase::Planning, ctx.depth(), &goal.name));
        let mut plan = self.plan(goal, &ctx.state)?;
        let mut cursor = 0usize;

        loop {
            if goal.is_satisfied_by(&ctx.state) {
                return Ok(());
            }
            if remaining_budget(deadline).is_none() {
                return Err(PursuitFailure::TimedOut {
                    goal: goal.name.clone(),
                });
            }

            let Some(step) = plan.steps.get(cursor).cloned() else {
                plan = self
                    .replan(goal, ctx, ReplanCause::PlanCompletedShort, &mut attempts)
                    .await?;
                cursor = 0;
                continue;
            };
            if !ctx.state.satisfies(&step.action.preconditions) {
                warn!(step = step.name(), "observed state drifted from plan");
                plan = self
                    .replan(goal, ctx, ReplanCause::Drift, &mut attempts)
                    .await?;
                cursor = 0;
                continue;
            }

            self.record(
                TransitionRecord::new(Phase::Executing, ctx.depth(), &goal.name)
                    .with_step(step.name()),
            );
            let runner_ctx = RunnerContext {
                goal: goal.name.clone(),
                step: step.name().to_string(),
                depth: ctx.depth(),
                preserved: ctx.preserved().clone(),
            };
            let outcome = manager
                .runner
                .execute(step.name(), &step.params, &runner_ctx)
                .await
                .map_err(|err| PursuitFailure::Runner(format!("{err:#}")))?;
            self.log.stats.steps_executed += 1;

            ctx.observe(&outcome.observed_delta);
            let violations = validate_state_invariants(&ctx.state);
            if !violations.is_empty() {
                warn!(step = step.name(), ?violations, "observed state is inconsistent");
                plan = self
                    .replan(goal, ctx, ReplanCause::Inconsistency, &mut attempts)
                    .await?;
                cursor = 0;
                let violations = validate_state_invariants(&ctx.state);
                if !violations.is_empty() {
                    return Err(PursuitFailure::StateInconsistency { violations });
                }
                continue;
            }

            match outcome.failure_kind() {
                None => {
                    debug!(step = step.name(), "step succeeded");
                    cursor += 1;
                    attempts.next_step();
                    if step.action.is_discovery() && !goal.is_satisfied_by(&ctx.state) {
                        plan = self
                            .replan(goal, ctx, ReplanCause::Discovery, &mut attempts)
                            .await?;
                        cursor = 0;
                    }
                }
                Some(ActionFailure::TimedUnavailable) => {
                    attempts.cooldowns += 1;
                    if attempts.cooldowns > config.max_cooldown_retries {
                        return Err(PursuitFailure::CooldownRetriesExhausted {
                            step: step.name().to_string(),
                            limit: config.max_cooldown_retries,
                        });
                    }
                    let wait = outcome.cooldown_remaining.unwrap_or_default();
                    let fits = remaining_budget(deadline).is_some_and(|left| wait < left);
                    if !fits {
                        return Err(PursuitFailure::TimedOut {
                            goal: goal.name.clone(),
                        });
                    }
                    let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
                    warn!(step = step.name(), wait_ms, "cooling down");
                    self.log.stats.cooldowns += 1;
                    self.record(
                        TransitionRecord::new(Phase::CoolingDown, ctx.depth(), &goal.name)
                            .with_step(step.name())
                            .with_detail(format!("{wait_ms}ms")),
                    );
                    tokio::time::sleep(wait).await;
                }
                Some(ActionFailure::PreconditionUnmet) => {
                    let requests = if outcome.subgoals.is_empty() {
                        step.action.requires.clone()
                    } else {
                        outcome.subgoals
                    };
                    if requests.is_empty() {
                        plan = self
                            .replan(goal, ctx, ReplanCause::PreconditionUnmet, &mut attempts)
                            .await?;
                        cursor = 0;
                        continue;
                    }
                    attempts.subgoal_rounds += 1;
                    if attempts.subgoal_rounds > config.max_subgoal_attempts {
                        return Err(PursuitFailure::SubgoalAttemptsExhausted {
                            step: step.name().to_string(),
                            limit: config.max_subgoal_attempts,
                        });
                    }
                    for mut request in requests {
                        request.requested_by = Some(step.name().to_string());
                        self.run_subgoal(&step, request, ctx, deadline).await?;
                    }
                }
                Some(failure) => {
                    return Err(PursuitFailure::ActionFailed {
                        step: step.name().to_string(),
                        failure,
                        message: outcome.message,
                    });
                }
            }
        }
    }

    async fn run_subgoal(
        &mut self,
        step: &PlanStep,
        request: SubgoalRequest,
        ctx: &mut ExecutionContext,
        deadline: Instant,
    ) -> Result<(), PursuitFailure> {
        let subgoal = build_goal(&request, &ctx.state)?;
        let mut child = ctx
            .child(&request)
            .map_err(|err| PursuitFailure::MaxDepthExceeded {
                requested: err.requested,
                max: err.max,
            })?;
        self.log.stats.subgoals += 1;
        self.record(
            TransitionRecord::new(Phase::AwaitingSubgoal, ctx.depth(), &subgoal.name)
                .with_step(step.name()),
        );

        match self.run_goal(&subgoal, &mut child, deadline).await {
            Ok(()) => {
                ctx.merge_child(child);
                // The next request (or the retried step) must see what this child did.
                let snapshot = self.snapshot().await?;
                ctx.refresh(snapshot);
                Ok(())
            }
            Err(err) if err.passes_through() => Err(err),
            Err(err) => Err(PursuitFailure::SubgoalFailed {
                goal: subgoal.name.clone(),
                step: step.name().to_string(),
                source: Box::new(err),
            }),
        }
    }

    /// Fresh snapshot, then a new plan for the same goal at the same depth.
    async fn replan(
        &mut self,
        goal: &GoalSpec,
        ctx: &mut ExecutionContext,
        cause: ReplanCause,
        attempts: &mut Attempts,
    ) -> Result<Plan, PursuitFailure> {
        attempts.replans += 1;
        let limit = self.manager.config.max_replans;
        if attempts.replans > limit {
            return Err(PursuitFailure::ReplanLimitExceeded {
                goal: goal.name.clone(),
                limit,
            });
        }
        attempts.next_step();
        self.log.stats.replans += 1;
        self.record(
            TransitionRecord::new(Phase::Replanning, ctx.depth(), &goal.name).with_cause(cause),
        );
        let snapshot = self.snapshot().await?;
        ctx.refresh(snapshot);
        self.plan(goal, &ctx.state)
    }

    fn plan(&mut self, goal: &GoalSpec, state: &WorldState) -> Result<Plan, PursuitFailure> {
        self.log.stats.plans += 1;
        let plan = Planner::new(&self.catalog, self.manager.config.search_limits())
            .plan(state, goal)
            .map_err(|err| PursuitFailure::PlanningExhausted(err.report))?;
        debug!(goal = %goal.name, steps = ?plan.action_names(), cost = plan.total_cost, "plan ready");
        Ok(plan)
    }

    async fn snapshot(&self) -> Result<WorldState, PursuitFailure> {
        self.manager
            .runner
            .snapshot()
            .await
            .map_err(|err| PursuitFailure::Runner(format!("{err:#}")))
    }

    fn record(&mut self, record: TransitionRecord) {
        info!(
            phase = ?record.phase,
            depth = record.depth,
            goal = %record.goal,
            step = record.step.as_deref().unwrap_or(""),
            "transition"
        );
        self.log.record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StateKey;

    #[test]
    fn root_cause_unwraps_nested_subgoal_failures() {
        let inner = PursuitFailure::ActionFailed {
            step: "gather".to_string(),
            failure: ActionFailure::Rejected,
            message: Some("no tool".to_string()),
        };
        let outer = PursuitFailure::SubgoalFailed {
            goal: "reach_resource_threshold<-craft".to_string(),
            step: "craft".to_string(),
            source: Box::new(PursuitFailure::SubgoalFailed {
                goal: "move_to_location<-gather".to_string(),
                step: "gather".to_string(),
                source: Box::new(inner.clone()),
            }),
        };
        assert_eq!(outer.root_cause(), &inner);
        assert_eq!(inner.to_string(), "step 'gather' failed: Rejected");
    }

    #[test]
    fn structural_failures_pass_through_subgoals() {
        assert!(PursuitFailure::MaxDepthExceeded { requested: 3, max: 2 }.passes_through());
        assert!(
            PursuitFailure::Subgoal(SubgoalError::UnsupportedSubgoalType {
                goal_type: "x".to_string()
            })
            .passes_through()
        );
        assert!(
            !PursuitFailure::ReplanLimitExceeded {
                goal: "g".to_string(),
                limit: 1
            }
            .passes_through()
        );
    }

    #[test]
    fn inconsistency_message_lists_violations() {
        let failure = PursuitFailure::StateInconsistency {
            violations: vec![format!("{} exceeds {}", StateKey::Hp, StateKey::MaxHp)],
        };
        assert_eq!(
            failure.to_string(),
            "observed state violates invariants: hp exceeds max_hp"
        );
    }
}
