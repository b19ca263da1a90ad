//! Read-only domain facts consulted during goal scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::goal::GoalSpec;
use crate::core::state::{StateKey, WorldState};

/// Domain knowledge the selector queries but never mutates.
///
/// Every method has a neutral default so providers only implement what they
/// know.
pub trait GameDataProvider: Send + Sync {
    /// Inclusive `(min, max)` range an integer key can take.
    fn bounds(&self, _key: StateKey) -> Option<(i64, i64)> {
        None
    }

    /// How urgently `goal` should be pursued from `state`, in `[0, 1]`.
    fn necessity(&self, _goal: &GoalSpec, _state: &WorldState) -> Option<f64> {
        None
    }

    /// How much reaching `goal` advances the character, in `[0, 1]`.
    fn progression(&self, _goal: &GoalSpec, _state: &WorldState) -> Option<f64> {
        None
    }
}

/// Provider with no domain knowledge; the selector falls back to its
/// built-in estimates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGameData;

impl GameDataProvider for NoGameData {}

/// Table-driven provider, typically loaded alongside a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticGameData {
    /// Integer bounds per key.
    pub bounds: HashMap<StateKey, (i64, i64)>,
    /// Fixed progression value per goal name.
    pub progression: HashMap<String, f64>,
}

impl StaticGameData {
    pub fn with_bounds(mut self, key: StateKey, min: i64, max: i64) -> Self {
        self.bounds.insert(key, (min, max));
        self
    }

    pub fn with_progression(mut self, goal: impl Into<String>, value: f64) -> Self {
        self.progression.insert(goal.into(), value);
        self
    }
}

impl GameDataProvider for StaticGameData {
    fn bounds(&self, key: StateKey) -> Option<(i64, i64)> {
        self.bounds.get(&key).copied()
    }

    fn progression(&self, goal: &GoalSpec, _state: &WorldState) -> Option<f64> {
        self.progression.get(&goal.name).copied()
    }
}
