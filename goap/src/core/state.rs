//! Typed world state for planning and execution.
//!
//! The key set is closed: every [`StateKey`] declares the [`ValueKind`] it
//! holds, and values are type-checked on insertion. Keys arriving as strings
//! (scenario files, runner payloads) go through [`StateKey::from_str`], which
//! rejects anything undeclared.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::CatalogError;

/// Value type a [`StateKey`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Text => "string",
        };
        f.write_str(name)
    }
}

macro_rules! state_keys {
    ($($variant:ident => $name:literal : $kind:ident),+ $(,)?) => {
        /// Closed set of world facts the planner reasons about.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum StateKey {
            $($variant),+
        }

        impl StateKey {
            /// Every declared key, in declaration order.
            pub const ALL: &'static [StateKey] = &[$(StateKey::$variant),+];

            /// Stable snake_case name used in scenario files and logs.
            pub fn name(self) -> &'static str {
                match self {
                    $(StateKey::$variant => $name),+
                }
            }

            pub fn kind(self) -> ValueKind {
                match self {
                    $(StateKey::$variant => ValueKind::$kind),+
                }
            }
        }
    };
}

state_keys! {
    X => "x": Int,
    Y => "y": Int,
    TargetX => "target_x": Int,
    TargetY => "target_y": Int,
    AtTarget => "at_target": Bool,
    AtResourceLocation => "at_resource_location": Bool,
    AtMonsterLocation => "at_monster_location": Bool,
    AtWorkshop => "at_workshop": Bool,
    AtBank => "at_bank": Bool,
    LocationKnown => "location_known": Bool,
    CooldownReady => "cooldown_ready": Bool,
    CharacterSafe => "character_safe": Bool,
    Hp => "hp": Int,
    MaxHp => "max_hp": Int,
    Level => "level": Int,
    Xp => "xp": Int,
    Gold => "gold": Int,
    HasItem => "has_item": Bool,
    HasCraftedItem => "has_crafted_item": Bool,
    TargetItem => "target_item": Text,
    ItemCount => "item_count": Int,
    InventoryUsed => "inventory_used": Int,
    InventoryMax => "inventory_max": Int,
    InventoryFull => "inventory_full": Bool,
    EquippedItem => "equipped_item": Text,
    TaskActive => "task_active": Bool,
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateKey {
    type Err = CatalogError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        StateKey::ALL
            .iter()
            .copied()
            .find(|key| key.name() == raw)
            .ok_or_else(|| CatalogError::UnknownKey {
                key: raw.to_string(),
            })
    }
}

/// Tagged state value.
///
/// Booleans and integers never convert into each other; comparisons between
/// values of different kinds are always unequal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Mapping from declared keys to typed values.
///
/// Used both for full snapshots and for partial constraint sets
/// (preconditions, effects, goal targets). Ordered so that hashing, equality
/// and iteration are deterministic.
///
/// Deserialization goes through [`WorldState::from_pairs`], so payloads with a
/// value of the wrong kind for its key are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<StateKey, Value>",
    into = "BTreeMap<StateKey, Value>"
)]
pub struct WorldState(BTreeMap<StateKey, Value>);

impl TryFrom<BTreeMap<StateKey, Value>> for WorldState {
    type Error = CatalogError;

    fn try_from(map: BTreeMap<StateKey, Value>) -> Result<Self, Self::Error> {
        Self::from_pairs(map)
    }
}

impl From<WorldState> for BTreeMap<StateKey, Value> {
    fn from(state: WorldState) -> Self {
        state.0
    }
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from typed pairs, rejecting values of the wrong kind.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (StateKey, Value)>,
    {
        let mut state = Self::new();
        for (key, value) in pairs {
            state.insert(key, value)?;
        }
        Ok(state)
    }

    /// Build a state from string-keyed values (scenario files, runner payloads).
    pub fn from_named<I, S>(pairs: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut state = Self::new();
        for (name, value) in pairs {
            let key = StateKey::from_str(name.as_ref())?;
            state.insert(key, value)?;
        }
        Ok(state)
    }

    /// Insert a value, returning the previous one. Fails on kind mismatch.
    pub fn insert(
        &mut self,
        key: StateKey,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, CatalogError> {
        let value = value.into();
        if value.kind() != key.kind() {
            return Err(CatalogError::TypeMismatch {
                key,
                expected: key.kind(),
                found: value.kind(),
            });
        }
        Ok(self.0.insert(key, value))
    }

    pub fn get(&self, key: StateKey) -> Option<&Value> {
        self.0.get(&key)
    }

    pub fn contains(&self, key: StateKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateKey, &Value)> + '_ {
        self.0.iter().map(|(key, value)| (*key, value))
    }

    pub fn int(&self, key: StateKey) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn bool(&self, key: StateKey) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// True if every constraint in `partial` holds in `self`.
    pub fn satisfies(&self, partial: &WorldState) -> bool {
        matches(self, partial)
    }

    /// Overwrite the keys in `effects`, returning a new state.
    pub fn applied(&self, effects: &WorldState) -> WorldState {
        apply(self, effects)
    }
}

/// Every key in `partial` must be present in `state` with an equal value.
///
/// A key missing from `state` never matches.
pub fn matches(state: &WorldState, partial: &WorldState) -> bool {
    partial
        .iter()
        .all(|(key, required)| state.get(key) == Some(required))
}

/// Pure STRIPS-style overwrite: listed keys take the effect value, all other
/// keys are carried over unchanged.
pub fn apply(state: &WorldState, effects: &WorldState) -> WorldState {
    let mut next = state.clone();
    for (key, value) in effects.iter() {
        next.0.insert(key, value.clone());
    }
    next
}

/// Keys of `partial` not currently satisfied by `state`, in key order.
pub fn unsatisfied(state: &WorldState, partial: &WorldState) -> Vec<StateKey> {
    partial
        .iter()
        .filter(|(key, required)| state.get(*key) != Some(*required))
        .map(|(key, _)| key)
        .collect()
}

/// Build a [`WorldState`] from `Key => value` pairs.
///
/// Evaluates to `Result<WorldState, CatalogError>`; values of the wrong kind
/// for their key are rejected.
#[macro_export]
macro_rules! world_state {
    () => {
        ::std::result::Result::<$crate::core::state::WorldState, $crate::core::error::CatalogError>::Ok(
            $crate::core::state::WorldState::new(),
        )
    };
    ($($key:ident => $value:expr),+ $(,)?) => {
        $crate::core::state::WorldState::from_pairs([
            $((
                $crate::core::state::StateKey::$key,
                $crate::core::state::Value::from($value),
            )),+
        ])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_requires_every_partial_key() {
        let state = world_state! { AtTarget => true, HasItem => false }.expect("state");
        let partial = world_state! { AtTarget => true }.expect("partial");
        assert!(matches(&state, &partial));

        let missing = world_state! { Level => 3 }.expect("partial");
        assert!(!matches(&state, &missing));
    }

    #[test]
    fn empty_partial_always_matches() {
        let state = WorldState::new();
        assert!(matches(&state, &WorldState::new()));
    }

    #[test]
    fn apply_overwrites_listed_keys_only() {
        let state = world_state! { AtTarget => false, HasItem => false, Hp => 10 }.expect("state");
        let effects = world_state! { AtTarget => true, Hp => 4 }.expect("effects");

        let next = apply(&state, &effects);

        assert_eq!(next.bool(StateKey::AtTarget), Some(true));
        assert_eq!(next.int(StateKey::Hp), Some(4));
        assert_eq!(next.bool(StateKey::HasItem), Some(false));
        // Input untouched.
        assert_eq!(state.bool(StateKey::AtTarget), Some(false));
    }

    #[test]
    fn insert_rejects_kind_mismatch() {
        let mut state = WorldState::new();
        let err = state.insert(StateKey::HasItem, 1).expect_err("mismatch");
        assert_eq!(
            err,
            CatalogError::TypeMismatch {
                key: StateKey::HasItem,
                expected: ValueKind::Bool,
                found: ValueKind::Int,
            }
        );
    }

    #[test]
    fn bool_and_int_values_never_compare_equal() {
        assert_ne!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Bool(false), Value::Int(0));
    }

    #[test]
    fn from_named_rejects_unknown_key() {
        let err = WorldState::from_named([("at_targt", Value::Bool(true))]).expect_err("unknown");
        assert_eq!(
            err,
            CatalogError::UnknownKey {
                key: "at_targt".to_string()
            }
        );
    }

    #[test]
    fn key_names_round_trip_through_from_str() {
        for key in StateKey::ALL {
            assert_eq!(key.name().parse::<StateKey>().expect("parse"), *key);
        }
    }

    #[test]
    fn unsatisfied_lists_missing_and_different_keys() {
        let state = world_state! { AtTarget => true, Hp => 5 }.expect("state");
        let target = world_state! { AtTarget => true, Hp => 10, HasItem => true }.expect("target");
        assert_eq!(
            unsatisfied(&state, &target),
            vec![StateKey::Hp, StateKey::HasItem]
        );
    }

    #[test]
    fn deserializing_checks_value_kinds() {
        let err = serde_json::from_str::<WorldState>(r#"{"at_target":"yes"}"#)
            .expect_err("text for bool key");
        assert!(err.to_string().contains("at_target"), "{err}");

        let state: WorldState =
            serde_json::from_str(r#"{"at_target":true,"hp":7}"#).expect("typed payload");
        assert_eq!(state.int(StateKey::Hp), Some(7));
        assert_eq!(state.bool(StateKey::AtTarget), Some(true));
    }
}
