//! Test-only helpers: a scripted action runner and catalog builders.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

use crate::core::catalog::{ActionCatalog, ActionDefinition, Params};
use crate::core::goal::GoalSpec;
use crate::core::selector::GoalSelector;
use crate::core::state::{StateKey, Value, WorldState};
use crate::execution::ExecutionManager;
use crate::io::config::AgentConfig;
use crate::io::runner::{ActionRunner, ExecutionOutcome, RunnerContext};

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub action: String,
    pub params: Params,
    pub goal: String,
    pub depth: usize,
}

#[derive(Debug, Default)]
struct ScriptState {
    world: WorldState,
    queued: HashMap<String, VecDeque<ExecutionOutcome>>,
    always: HashMap<String, ExecutionOutcome>,
    calls: Vec<RecordedCall>,
    snapshots: usize,
}

/// Runner that owns a fake world.
///
/// For each call it returns, in order of preference: the next queued outcome
/// for the action, the persistent outcome for the action, or an honest
/// outcome derived from the catalog (unmet preconditions fail, otherwise the
/// declared effects are observed). The observed delta of whatever it returns
/// is applied to its world, so [`snapshot`](ActionRunner::snapshot) stays
/// consistent with what the manager saw.
#[derive(Debug)]
pub struct ScriptedRunner {
    catalog: ActionCatalog,
    state: Mutex<ScriptState>,
}

impl ScriptedRunner {
    pub fn new(world: WorldState, catalog: &ActionCatalog) -> Self {
        Self {
            catalog: catalog.clone(),
            state: Mutex::new(ScriptState {
                world,
                ..ScriptState::default()
            }),
        }
    }

    /// Queue a one-shot outcome for `action`.
    pub fn script(&self, action: &str, outcome: ExecutionOutcome) -> &Self {
        self.lock()
            .queued
            .entry(action.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Return `outcome` for every call to `action` once its queue is empty.
    pub fn always(&self, action: &str, outcome: ExecutionOutcome) -> &Self {
        self.lock().always.insert(action.to_string(), outcome);
        self
    }

    pub fn world(&self) -> WorldState {
        self.lock().world.clone()
    }

    pub fn set_world(&self, world: WorldState) {
        self.lock().world = world;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(|call| call.action.clone())
            .collect()
    }

    pub fn snapshot_count(&self) -> usize {
        self.lock().snapshots
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn honest_outcome(&self, action: &str, world: &WorldState) -> ExecutionOutcome {
        match self.catalog.get(action) {
            Some(definition) if world.satisfies(&definition.preconditions) => {
                ExecutionOutcome::succeeded(definition.effects.clone())
            }
            Some(_) => ExecutionOutcome::precondition_unmet(),
            None => ExecutionOutcome::rejected(format!("unknown action '{action}'")),
        }
    }
}

#[async_trait]
impl ActionRunner for ScriptedRunner {
    async fn execute(
        &self,
        action: &str,
        params: &Params,
        ctx: &RunnerContext,
    ) -> Result<ExecutionOutcome> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            action: action.to_string(),
            params: params.clone(),
            goal: ctx.goal.clone(),
            depth: ctx.depth,
        });
        let queued = state
            .queued
            .get_mut(action)
            .and_then(|queue| queue.pop_front());
        let outcome = match queued.or_else(|| state.always.get(action).cloned()) {
            Some(outcome) => outcome,
            None => self.honest_outcome(action, &state.world),
        };
        state.world = state.world.applied(&outcome.observed_delta);
        Ok(outcome)
    }

    async fn snapshot(&self) -> Result<WorldState> {
        let mut state = self.lock();
        state.snapshots += 1;
        Ok(state.world.clone())
    }
}

/// Build an action or panic; for test catalogs only.
pub fn action(
    name: &str,
    cost: u32,
    pre: &[(StateKey, Value)],
    effects: &[(StateKey, Value)],
) -> ActionDefinition {
    let mut builder = ActionDefinition::builder(name).cost(cost);
    for (key, value) in pre {
        builder = builder.pre(*key, value.clone());
    }
    for (key, value) in effects {
        builder = builder.effect(*key, value.clone());
    }
    builder.build().expect("test action")
}

/// `{move(1, {}, {at_target}), gather(2, {at_target}, {has_item})}`.
pub fn move_gather_catalog() -> ActionCatalog {
    ActionCatalog::from_actions([
        action("move", 1, &[], &[(StateKey::AtTarget, Value::Bool(true))]),
        action(
            "gather",
            2,
            &[(StateKey::AtTarget, Value::Bool(true))],
            &[(StateKey::HasItem, Value::Bool(true))],
        ),
    ])
    .expect("test catalog")
}

/// Goal from typed pairs; panics on kind mismatch.
pub fn goal(name: &str, target: &[(StateKey, Value)]) -> GoalSpec {
    let target = WorldState::from_pairs(target.iter().cloned()).expect("test goal");
    GoalSpec::new(name, target)
}

/// Manager with default selector settings over `runner`.
pub fn manager<R: ActionRunner>(
    runner: R,
    catalog: ActionCatalog,
    config: AgentConfig,
) -> ExecutionManager<R> {
    let selector = GoalSelector::new(
        config.weights,
        config.probe_limits(),
        Arc::new(crate::core::game_data::NoGameData),
    );
    ExecutionManager::new(runner, catalog, selector, config)
}
