//! Per-pursuit execution context.
//!
//! One context is owned by each goal pursuit. Subgoals run in a child context
//! that copies the preserved bag and sits one level deeper; nothing here is
//! shared between agents.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::core::state::{StateKey, Value, WorldState, apply};
use crate::core::subgoal::SubgoalRequest;

/// Values carried across subgoal boundaries, keyed by context name.
pub type PreservedBag = BTreeMap<String, Value>;

/// Default bound on subgoal nesting.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// A subgoal would nest deeper than allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("subgoal depth {requested} exceeds max depth {max}")]
pub struct DepthExceeded {
    pub requested: usize,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    /// Latest authoritative state.
    pub state: WorldState,
    depth: usize,
    max_depth: usize,
    preserved: PreservedBag,
}

impl ExecutionContext {
    /// Top-level context at depth 0.
    pub fn new(state: WorldState, max_depth: usize) -> Self {
        Self {
            state,
            depth: 0,
            max_depth,
            preserved: PreservedBag::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn preserved(&self) -> &PreservedBag {
        &self.preserved
    }

    pub fn preserve(&mut self, name: impl Into<String>, value: Value) {
        self.preserved.insert(name.into(), value);
    }

    /// Apply an observed delta to the live state.
    pub fn observe(&mut self, delta: &WorldState) {
        self.state = apply(&self.state, delta);
    }

    /// Replace the live state with a fresh authoritative snapshot.
    pub fn refresh(&mut self, snapshot: WorldState) {
        self.state = snapshot;
    }

    /// Context for pursuing `request` one level deeper.
    ///
    /// Keys named in `request.preserve` are captured into the bag before
    /// descending, so the requester can rely on their pre-subgoal values.
    /// Names are checked against [`StateKey`] when the request is resolved; a
    /// key with no live value is skipped.
    pub fn child(&self, request: &SubgoalRequest) -> Result<ExecutionContext, DepthExceeded> {
        let requested = self.depth + 1;
        if requested > self.max_depth {
            return Err(DepthExceeded {
                requested,
                max: self.max_depth,
            });
        }
        let mut preserved = self.preserved.clone();
        for name in &request.preserve {
            if let Some(value) = StateKey::from_str(name)
                .ok()
                .and_then(|key| self.state.get(key))
            {
                preserved.insert(name.clone(), value.clone());
            }
        }
        Ok(ExecutionContext {
            state: self.state.clone(),
            depth: requested,
            max_depth: self.max_depth,
            preserved,
        })
    }

    /// Take back the preserved bag of a finished child.
    pub fn merge_child(&mut self, child: ExecutionContext) {
        self.preserved.extend(child.preserved);
    }
}
