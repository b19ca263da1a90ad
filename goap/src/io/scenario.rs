//! Scenario files: a start state, an action catalog and candidate goals.
//!
//! ```toml
//! [state]
//! at_target = false
//! has_item = false
//!
//! [[actions]]
//! name = "move"
//! cost = 1
//! effects = { at_target = true }
//!
//! [[actions]]
//! name = "gather"
//! cost = 2
//! preconditions = { at_target = true }
//! effects = { has_item = true }
//!
//! [[goals]]
//! name = "get_item"
//! target = { has_item = true }
//! ```
//!
//! An action with `base = "<name>"` is an instance of an earlier action: it
//! inherits everything from the base, merges its own `params`, and overlays
//! its own `preconditions` and `effects`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::catalog::{ActionCatalog, ActionCategory, ActionDefinition, Params};
use crate::core::game_data::StaticGameData;
use crate::core::goal::{GoalSpec, ensure_unique_goal_names};
use crate::core::state::{Value, WorldState};
use crate::core::subgoal::SubgoalRequest;

/// Validated scenario contents.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub state: WorldState,
    pub catalog: ActionCatalog,
    pub goals: Vec<GoalSpec>,
    pub game_data: StaticGameData,
}

impl Scenario {
    pub fn goal(&self, name: &str) -> Option<&GoalSpec> {
        self.goals.iter().find(|goal| goal.name == name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    #[serde(default)]
    state: BTreeMap<String, Value>,
    #[serde(default)]
    actions: Vec<ActionEntry>,
    #[serde(default)]
    goals: Vec<GoalEntry>,
    #[serde(default)]
    game_data: StaticGameData,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionEntry {
    name: String,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    cost: Option<u32>,
    #[serde(default)]
    category: Option<ActionCategory>,
    #[serde(default)]
    preconditions: BTreeMap<String, Value>,
    #[serde(default)]
    effects: BTreeMap<String, Value>,
    #[serde(default)]
    params: Params,
    #[serde(default)]
    requires: Vec<SubgoalRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GoalEntry {
    name: String,
    #[serde(default)]
    priority: u32,
    #[serde(default)]
    timeout_secs: Option<u64>,
    target: BTreeMap<String, Value>,
}

/// Read and validate a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_scenario(&contents).with_context(|| format!("load scenario {}", path.display()))
}

/// Parse and validate scenario TOML.
pub fn parse_scenario(contents: &str) -> Result<Scenario> {
    let file: ScenarioFile = toml::from_str(contents).context("parse scenario toml")?;

    let state = WorldState::from_named(file.state).context("[state]")?;

    let mut catalog = ActionCatalog::new();
    for entry in file.actions {
        let name = entry.name.clone();
        let action = build_action(&catalog, entry).with_context(|| format!("action '{name}'"))?;
        catalog
            .register(action)
            .with_context(|| format!("register action '{name}'"))?;
    }

    let mut goals = Vec::with_capacity(file.goals.len());
    for entry in file.goals {
        let target = WorldState::from_named(entry.target)
            .with_context(|| format!("goal '{}' target", entry.name))?;
        let mut goal = GoalSpec::new(entry.name, target).with_priority(entry.priority);
        if let Some(secs) = entry.timeout_secs {
            goal = goal.with_timeout(Duration::from_secs(secs));
        }
        goals.push(goal);
    }
    ensure_unique_goal_names(&goals)?;

    Ok(Scenario {
        state,
        catalog,
        goals,
        game_data: file.game_data,
    })
}

fn build_action(catalog: &ActionCatalog, entry: ActionEntry) -> Result<ActionDefinition> {
    let preconditions = WorldState::from_named(entry.preconditions).context("preconditions")?;
    let effects = WorldState::from_named(entry.effects).context("effects")?;

    let mut action = match &entry.base {
        Some(base) => {
            let mut instance = catalog.instantiate(base, entry.name, entry.params, &effects)?;
            instance.preconditions = instance.preconditions.applied(&preconditions);
            instance.requires.extend(entry.requires);
            instance
        }
        None => {
            let mut builder = ActionDefinition::builder(entry.name)
                .preconditions(preconditions)
                .effects(effects);
            for (name, value) in entry.params {
                builder = builder.param(name, value);
            }
            for request in entry.requires {
                builder = builder.requires(request);
            }
            builder.build()?
        }
    };
    if let Some(cost) = entry.cost {
        action.cost = cost;
    }
    if let Some(category) = entry.category {
        action.category = category;
    }
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CatalogError;
    use crate::core::state::StateKey;

    const SCENARIO_A: &str = r#"
[state]
at_target = false
has_item = false

[[actions]]
name = "move"
cost = 1
effects = { at_target = true }

[[actions]]
name = "gather"
cost = 2
preconditions = { at_target = true }
effects = { has_item = true }

[[goals]]
name = "get_item"
priority = 3
timeout_secs = 30
target = { has_item = true }
"#;

    #[test]
    fn parses_state_actions_and_goals() {
        let scenario = parse_scenario(SCENARIO_A).expect("parse");
        assert_eq!(scenario.state.bool(StateKey::AtTarget), Some(false));
        assert_eq!(scenario.catalog.len(), 2);
        assert_eq!(scenario.catalog.get("gather").expect("gather").cost, 2);

        let goal = scenario.goal("get_item").expect("goal");
        assert_eq!(goal.priority, 3);
        assert_eq!(goal.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn unknown_state_key_is_rejected() {
        let err = parse_scenario("[state]\nmana = 3\n").expect_err("unknown key");
        let catalog_err = err.downcast_ref::<CatalogError>().expect("catalog error");
        assert_eq!(
            catalog_err,
            &CatalogError::UnknownKey {
                key: "mana".to_string()
            }
        );
    }

    #[test]
    fn wrong_value_kind_is_rejected() {
        let err = parse_scenario("[state]\nhp = true\n").expect_err("type mismatch");
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::TypeMismatch { key: StateKey::Hp, .. })
        ));
    }

    #[test]
    fn instances_inherit_from_base() {
        let text = r#"
[[actions]]
name = "gather"
cost = 2
preconditions = { at_resource_location = true }
effects = { has_item = true }

[[actions]]
name = "gather_copper"
base = "gather"
params = { item = "copper_ore" }
effects = { target_item = "copper_ore" }
"#;
        let scenario = parse_scenario(text).expect("parse");
        let copper = scenario.catalog.get("gather_copper").expect("instance");
        assert_eq!(copper.cost, 2);
        assert_eq!(copper.params.get("item"), Some(&Value::from("copper_ore")));
        assert_eq!(copper.effects.bool(StateKey::HasItem), Some(true));
        assert_eq!(
            copper.effects.get(StateKey::TargetItem),
            Some(&Value::from("copper_ore"))
        );
        assert_eq!(copper.preconditions.bool(StateKey::AtResourceLocation), Some(true));
    }

    #[test]
    fn duplicate_actions_and_goals_are_rejected() {
        let actions = "[[actions]]\nname = \"move\"\n\n[[actions]]\nname = \"move\"\n";
        let err = parse_scenario(actions).expect_err("duplicate action");
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::DuplicateAction { .. })
        ));

        let goals = "[[goals]]\nname = \"g\"\ntarget = { hp = 1 }\n\n[[goals]]\nname = \"g\"\ntarget = { hp = 2 }\n";
        let err = parse_scenario(goals).expect_err("duplicate goal");
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::DuplicateGoal { .. })
        ));
    }

    #[test]
    fn unsupported_declared_subgoal_fails_at_load() {
        let text = r#"
[[actions]]
name = "fight"
[[actions.requires]]
goal_type = "summon_dragon"
"#;
        let err = parse_scenario(text).expect_err("bad subgoal");
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::InvalidSubgoal { .. })
        ));
    }

    #[test]
    fn load_scenario_reports_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("scenario.toml");
        fs::write(&path, "[state]\nhp = \"full\"\n").expect("write");
        let err = load_scenario(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("scenario.toml"));
    }
}
