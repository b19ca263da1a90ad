//! Action runner abstraction.
//!
//! The [`ActionRunner`] trait decouples the execution manager from whatever
//! actually performs actions (a game client, a simulator). Tests use scripted
//! runners that return predetermined outcomes without touching the network.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::core::catalog::Params;
use crate::core::context::PreservedBag;
use crate::core::state::WorldState;
use crate::core::subgoal::SubgoalRequest;

/// Why a step did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFailure {
    /// The world did not satisfy what the step needs; recoverable through
    /// subgoals or replanning.
    PreconditionUnmet,
    /// Cooldown or rate limit; retry the same step after the wait.
    TimedUnavailable,
    /// The runner refused the action outright.
    Rejected,
    Unknown,
}

/// Result of executing one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Values actually observed after the call. Applied verbatim; the
    /// catalog's predicted effects are never trusted for execution.
    #[serde(default)]
    pub observed_delta: WorldState,
    #[serde(default)]
    pub failure: Option<ActionFailure>,
    #[serde(default, with = "duration_ms")]
    pub cooldown_remaining: Option<Duration>,
    /// Subgoals the runner reports as blocking the step.
    #[serde(default)]
    pub subgoals: Vec<SubgoalRequest>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(observed_delta: WorldState) -> Self {
        Self {
            success: true,
            observed_delta,
            ..Self::default()
        }
    }

    pub fn precondition_unmet() -> Self {
        Self::failed(ActionFailure::PreconditionUnmet)
    }

    pub fn cooling_down(remaining: Duration) -> Self {
        Self {
            cooldown_remaining: Some(remaining),
            ..Self::failed(ActionFailure::TimedUnavailable)
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::failed(ActionFailure::Rejected)
        }
    }

    pub fn failed(failure: ActionFailure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn with_delta(mut self, observed_delta: WorldState) -> Self {
        self.observed_delta = observed_delta;
        self
    }

    pub fn with_subgoal(mut self, request: SubgoalRequest) -> Self {
        self.subgoals.push(request);
        self
    }

    /// Failure kind, treating an unexplained unsuccessful outcome as unknown.
    pub fn failure_kind(&self) -> Option<ActionFailure> {
        if self.success {
            return None;
        }
        Some(self.failure.unwrap_or(ActionFailure::Unknown))
    }
}

/// What the runner is told about the call site.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunnerContext {
    pub goal: String,
    pub step: String,
    pub depth: usize,
    pub preserved: PreservedBag,
}

/// Performs actions against the authoritative world.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Execute one bound action. `Err` means the runner itself broke (I/O,
    /// protocol); action-level failures are reported in the outcome.
    async fn execute(
        &self,
        action: &str,
        params: &Params,
        ctx: &RunnerContext,
    ) -> Result<ExecutionOutcome>;

    /// Fresh authoritative state.
    async fn snapshot(&self) -> Result<WorldState>;
}

#[async_trait]
impl<R: ActionRunner + ?Sized> ActionRunner for Arc<R> {
    async fn execute(
        &self,
        action: &str,
        params: &Params,
        ctx: &RunnerContext,
    ) -> Result<ExecutionOutcome> {
        (**self).execute(action, params, ctx).await
    }

    async fn snapshot(&self) -> Result<WorldState> {
        (**self).snapshot().await
    }
}

/// Wraps a runner so that every call holds one permit of a shared semaphore.
///
/// Clone the semaphore handle across wrappers to make independent agents
/// share a single call budget.
pub struct RateLimitedRunner<R> {
    inner: R,
    permits: Arc<Semaphore>,
}

impl<R: ActionRunner> RateLimitedRunner<R> {
    pub fn new(inner: R, max_concurrent: usize) -> Self {
        Self::sharing(inner, Arc::new(Semaphore::new(max_concurrent)))
    }

    pub fn sharing(inner: R, permits: Arc<Semaphore>) -> Self {
        Self { inner, permits }
    }

    pub fn permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.permits)
    }
}

#[async_trait]
impl<R: ActionRunner> ActionRunner for RateLimitedRunner<R> {
    #[instrument(skip_all, fields(action = action, depth = ctx.depth))]
    async fn execute(
        &self,
        action: &str,
        params: &Params,
        ctx: &RunnerContext,
    ) -> Result<ExecutionOutcome> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("acquire runner permit")?;
        debug!(available = self.permits.available_permits(), "runner permit held");
        self.inner.execute(action, params, ctx).await
    }

    async fn snapshot(&self) -> Result<WorldState> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("acquire runner permit")?;
        self.inner.snapshot().await
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                ser.serialize_some(&millis)
            }
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_millis))
    }
}
