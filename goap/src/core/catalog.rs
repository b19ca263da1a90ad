//! Action definitions and the catalog the planner searches over.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::error::CatalogError;
use crate::core::state::{StateKey, Value, WorldState, matches};
use crate::core::subgoal::{SubgoalKind, SubgoalRequest};

/// Bound parameters passed through to the action runner. Opaque to planning.
pub type Params = BTreeMap<String, Value>;

/// Coarse role of an action in a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    /// Effects are expected to be predictable.
    #[default]
    Execution,
    /// Effects reveal information the plan could not account for; the
    /// execution manager replans after every discovery step.
    Discovery,
}

/// Declarative action: what it needs, what it changes, what it costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDefinition {
    pub name: String,
    pub preconditions: WorldState,
    /// Full-overwrite values, not deltas.
    pub effects: WorldState,
    pub cost: u32,
    pub category: ActionCategory,
    pub params: Params,
    /// Subgoals to pursue when the runner reports this action's
    /// preconditions unmet at execution time.
    pub requires: Vec<SubgoalRequest>,
}

impl ActionDefinition {
    pub fn builder(name: impl Into<String>) -> ActionBuilder {
        ActionBuilder {
            action: ActionDefinition {
                name: name.into(),
                preconditions: WorldState::new(),
                effects: WorldState::new(),
                cost: 1,
                category: ActionCategory::Execution,
                params: Params::new(),
                requires: Vec::new(),
            },
            error: None,
        }
    }

    pub fn is_discovery(&self) -> bool {
        self.category == ActionCategory::Discovery
    }
}

/// Builder that records the first type error and reports it from [`build`].
///
/// [`build`]: ActionBuilder::build
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    action: ActionDefinition,
    error: Option<CatalogError>,
}

impl ActionBuilder {
    pub fn cost(mut self, cost: u32) -> Self {
        self.action.cost = cost;
        self
    }

    pub fn category(mut self, category: ActionCategory) -> Self {
        self.action.category = category;
        self
    }

    pub fn pre(mut self, key: StateKey, value: impl Into<Value>) -> Self {
        if let Err(err) = self.action.preconditions.insert(key, value) {
            self.error.get_or_insert(err);
        }
        self
    }

    pub fn effect(mut self, key: StateKey, value: impl Into<Value>) -> Self {
        if let Err(err) = self.action.effects.insert(key, value) {
            self.error.get_or_insert(err);
        }
        self
    }

    pub fn preconditions(mut self, preconditions: WorldState) -> Self {
        self.action.preconditions = preconditions;
        self
    }

    pub fn effects(mut self, effects: WorldState) -> Self {
        self.action.effects = effects;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.action.params.insert(name.into(), value.into());
        self
    }

    pub fn requires(mut self, request: SubgoalRequest) -> Self {
        self.action.requires.push(request);
        self
    }

    pub fn build(self) -> Result<ActionDefinition, CatalogError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.action),
        }
    }
}

/// Registry of actions in declaration order.
///
/// Declaration order is part of the contract: it fixes successor order during
/// search and therefore plan determinism.
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: Vec<Arc<ActionDefinition>>,
    index: HashMap<String, usize>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_actions<I>(actions: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = ActionDefinition>,
    {
        let mut catalog = Self::new();
        for action in actions {
            catalog.register(action)?;
        }
        Ok(catalog)
    }

    /// Add an action, rejecting duplicate names and unusable subgoal
    /// declarations.
    pub fn register(&mut self, action: ActionDefinition) -> Result<(), CatalogError> {
        if self.index.contains_key(&action.name) {
            return Err(CatalogError::DuplicateAction { name: action.name });
        }
        for request in &action.requires {
            if let Err(source) = SubgoalKind::validate(request) {
                return Err(CatalogError::InvalidSubgoal {
                    action: action.name,
                    source,
                });
            }
        }
        self.index.insert(action.name.clone(), self.actions.len());
        self.actions.push(Arc::new(action));
        Ok(())
    }

    /// Derive a parameterized instance of a registered action.
    ///
    /// The instance inherits the base preconditions, effects, cost and
    /// category; `params` are merged over the base params and `effects`
    /// overwrite the base effects.
    pub fn instantiate(
        &self,
        base: &str,
        name: impl Into<String>,
        params: Params,
        effects: &WorldState,
    ) -> Result<ActionDefinition, CatalogError> {
        let base_action = self.get(base).ok_or_else(|| CatalogError::UnknownAction {
            name: base.to_string(),
        })?;
        let mut instance = ActionDefinition::clone(base_action);
        instance.name = name.into();
        instance.params.extend(params);
        instance.effects = instance.effects.applied(effects);
        Ok(instance)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ActionDefinition>> {
        self.index.get(name).map(|idx| &self.actions[*idx])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActionDefinition>> + '_ {
        self.actions.iter()
    }

    /// Actions whose preconditions hold in `state`, in declaration order.
    pub fn applicable_actions<'a>(
        &'a self,
        state: &'a WorldState,
    ) -> impl Iterator<Item = &'a Arc<ActionDefinition>> + 'a {
        self.actions
            .iter()
            .filter(move |action| matches(state, &action.preconditions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SubgoalError;

    fn move_action() -> ActionDefinition {
        ActionDefinition::builder("move")
            .cost(1)
            .effect(StateKey::AtTarget, true)
            .build()
            .expect("move")
    }

    fn gather_action() -> ActionDefinition {
        ActionDefinition::builder("gather")
            .cost(2)
            .pre(StateKey::AtTarget, true)
            .effect(StateKey::HasItem, true)
            .build()
            .expect("gather")
    }

    #[test]
    fn duplicate_action_names_are_rejected() {
        let err = ActionCatalog::from_actions([move_action(), gather_action(), move_action()])
            .expect_err("duplicate");
        assert_eq!(
            err,
            CatalogError::DuplicateAction {
                name: "move".to_string()
            }
        );
    }

    #[test]
    fn builder_reports_first_type_error() {
        let err = ActionDefinition::builder("bad")
            .pre(StateKey::AtTarget, 1)
            .effect(StateKey::Hp, "full")
            .build()
            .expect_err("type error");
        assert!(matches!(
            err,
            CatalogError::TypeMismatch {
                key: StateKey::AtTarget,
                ..
            }
        ));
    }

    #[test]
    fn applicable_actions_filters_by_preconditions_in_order() {
        let catalog = ActionCatalog::from_actions([move_action(), gather_action()]).expect("catalog");

        let away = crate::world_state! { AtTarget => false }.expect("state");
        let names: Vec<&str> = catalog
            .applicable_actions(&away)
            .map(|action| action.name.as_str())
            .collect();
        assert_eq!(names, vec!["move"]);

        let there = crate::world_state! { AtTarget => true }.expect("state");
        let names: Vec<&str> = catalog
            .applicable_actions(&there)
            .map(|action| action.name.as_str())
            .collect();
        assert_eq!(names, vec!["move", "gather"]);
    }

    #[test]
    fn unsupported_declared_subgoal_fails_registration() {
        let action = ActionDefinition::builder("fight")
            .requires(SubgoalRequest::new("summon_dragon"))
            .build()
            .expect("build");
        let err = ActionCatalog::from_actions([action]).expect_err("invalid subgoal");
        assert_eq!(
            err,
            CatalogError::InvalidSubgoal {
                action: "fight".to_string(),
                source: SubgoalError::UnsupportedSubgoalType {
                    goal_type: "summon_dragon".to_string()
                },
            }
        );
    }

    #[test]
    fn restore_hit_points_without_max_hp_is_accepted_at_load() {
        let action = ActionDefinition::builder("fight")
            .requires(SubgoalRequest::new("restore_hit_points"))
            .build()
            .expect("build");
        assert!(ActionCatalog::from_actions([action]).is_ok());
    }

    #[test]
    fn instantiate_binds_params_and_overrides_effects() {
        let catalog = ActionCatalog::from_actions([move_action()]).expect("catalog");
        let effects = crate::world_state! { X => 2, Y => 3 }.expect("effects");
        let mut params = Params::new();
        params.insert("x".to_string(), Value::from(2));
        params.insert("y".to_string(), Value::from(3));

        let instance = catalog
            .instantiate("move", "move_to_2_3", params, &effects)
            .expect("instance");

        assert_eq!(instance.name, "move_to_2_3");
        assert_eq!(instance.params.get("x"), Some(&Value::from(2)));
        assert_eq!(instance.effects.int(StateKey::X), Some(2));
        assert_eq!(instance.effects.bool(StateKey::AtTarget), Some(true));
    }

    #[test]
    fn instantiate_unknown_base_fails() {
        let catalog = ActionCatalog::new();
        let err = catalog
            .instantiate("move", "m", Params::new(), &WorldState::new())
            .expect_err("unknown base");
        assert_eq!(
            err,
            CatalogError::UnknownAction {
                name: "move".to_string()
            }
        );
    }
}
