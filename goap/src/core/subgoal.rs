//! Subgoal requests and the factory that turns them into goals.
//!
//! The factory is a closed, exhaustively matched table. It performs no I/O:
//! the only inputs are the request and the current state.

use serde::{Deserialize, Serialize};

use crate::core::catalog::Params;
use crate::core::error::SubgoalError;
use crate::core::goal::GoalSpec;
use crate::core::state::{StateKey, Value, ValueKind, WorldState};

/// Dependency raised by a step that cannot proceed in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgoalRequest {
    pub goal_type: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub priority: u32,
    /// Context keys the requester needs carried across the recursive call.
    #[serde(default)]
    pub preserve: Vec<String>,
    /// Step that raised the request; filled in by the execution manager.
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl SubgoalRequest {
    pub fn new(goal_type: impl Into<String>) -> Self {
        Self {
            goal_type: goal_type.into(),
            params: Params::new(),
            priority: 0,
            preserve: Vec::new(),
            requested_by: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn preserving(mut self, key: impl Into<String>) -> Self {
        self.preserve.push(key.into());
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Supported subgoal shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubgoalKind {
    /// Stand on the given map coordinates.
    MoveToLocation { x: i64, y: i64 },
    /// Hold exactly `quantity` of `item`.
    ReachResourceThreshold { item: String, quantity: i64 },
    /// Heal back to full hit points.
    RestoreHitPoints { max_hp: i64 },
    /// Have `item` equipped.
    EquipItem { item: String },
}

impl SubgoalKind {
    /// Resolve a request into a typed subgoal, validating its parameters.
    ///
    /// `state` supplies defaults a request may omit (e.g. `max_hp`).
    pub fn resolve(request: &SubgoalRequest, state: &WorldState) -> Result<Self, SubgoalError> {
        if let Some(key) = request
            .preserve
            .iter()
            .find(|name| name.parse::<StateKey>().is_err())
        {
            return Err(SubgoalError::UnknownPreserveKey {
                goal_type: request.goal_type.clone(),
                key: key.clone(),
            });
        }
        let params = ParamReader { request };
        match request.goal_type.as_str() {
            "move_to_location" => Ok(SubgoalKind::MoveToLocation {
                x: params.int("x")?,
                y: params.int("y")?,
            }),
            "reach_resource_threshold" => Ok(SubgoalKind::ReachResourceThreshold {
                item: params.text("item")?,
                quantity: params.int("quantity")?,
            }),
            "restore_hit_points" => {
                let max_hp = match params.optional_int("max_hp")? {
                    Some(value) => value,
                    None => state.int(StateKey::MaxHp).ok_or_else(|| {
                        SubgoalError::MissingParameter {
                            goal_type: request.goal_type.clone(),
                            param: "max_hp".to_string(),
                        }
                    })?,
                };
                Ok(SubgoalKind::RestoreHitPoints { max_hp })
            }
            "equip_item" => Ok(SubgoalKind::EquipItem {
                item: params.text("item")?,
            }),
            other => Err(SubgoalError::UnsupportedSubgoalType {
                goal_type: other.to_string(),
            }),
        }
    }

    /// Check a request without live state.
    ///
    /// Parameters that default from state (`max_hp`) may be absent; the goal
    /// type and every explicit parameter must still be valid.
    pub fn validate(request: &SubgoalRequest) -> Result<(), SubgoalError> {
        match Self::resolve(request, &WorldState::new()) {
            Ok(_) => Ok(()),
            Err(SubgoalError::MissingParameter { param, .. }) if param == "max_hp" => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn target(&self) -> Vec<(StateKey, Value)> {
        match self {
            SubgoalKind::MoveToLocation { x, y } => {
                vec![(StateKey::X, Value::Int(*x)), (StateKey::Y, Value::Int(*y))]
            }
            SubgoalKind::ReachResourceThreshold { item, quantity } => vec![
                (StateKey::TargetItem, Value::Text(item.clone())),
                (StateKey::ItemCount, Value::Int(*quantity)),
            ],
            SubgoalKind::RestoreHitPoints { max_hp } => vec![(StateKey::Hp, Value::Int(*max_hp))],
            SubgoalKind::EquipItem { item } => {
                vec![(StateKey::EquippedItem, Value::Text(item.clone()))]
            }
        }
    }
}

/// Build the goal a subgoal request stands for.
pub fn build_goal(request: &SubgoalRequest, state: &WorldState) -> Result<GoalSpec, SubgoalError> {
    let kind = SubgoalKind::resolve(request, state)?;
    let target = WorldState::from_pairs(kind.target()).map_err(|_| {
        // Targets are built from typed variants; a mismatch here means the
        // table above disagrees with the key declarations.
        SubgoalError::UnsupportedSubgoalType {
            goal_type: request.goal_type.clone(),
        }
    })?;
    let name = match &request.requested_by {
        Some(step) => format!("{}<-{}", request.goal_type, step),
        None => request.goal_type.clone(),
    };
    Ok(GoalSpec::new(name, target).with_priority(request.priority))
}

struct ParamReader<'a> {
    request: &'a SubgoalRequest,
}

impl ParamReader<'_> {
    fn raw(&self, name: &str) -> Result<&Value, SubgoalError> {
        self.request
            .params
            .get(name)
            .ok_or_else(|| SubgoalError::MissingParameter {
                goal_type: self.request.goal_type.clone(),
                param: name.to_string(),
            })
    }

    fn invalid(&self, name: &str, expected: ValueKind) -> SubgoalError {
        SubgoalError::InvalidParameter {
            goal_type: self.request.goal_type.clone(),
            param: name.to_string(),
            expected,
        }
    }

    fn int(&self, name: &str) -> Result<i64, SubgoalError> {
        self.raw(name)?
            .as_int()
            .ok_or_else(|| self.invalid(name, ValueKind::Int))
    }

    fn optional_int(&self, name: &str) -> Result<Option<i64>, SubgoalError> {
        match self.request.params.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_int()
                .map(Some)
                .ok_or_else(|| self.invalid(name, ValueKind::Int)),
        }
    }

    fn text(&self, name: &str) -> Result<String, SubgoalError> {
        self.raw(name)?
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(name, ValueKind::Text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_to_location_targets_coordinates() {
        let request = SubgoalRequest::new("move_to_location")
            .param("x", 4)
            .param("y", -2)
            .with_priority(7);
        let goal = build_goal(&request, &WorldState::new()).expect("goal");
        assert_eq!(goal.target.int(StateKey::X), Some(4));
        assert_eq!(goal.target.int(StateKey::Y), Some(-2));
        assert_eq!(goal.priority, 7);
    }

    #[test]
    fn reach_resource_threshold_targets_item_count() {
        let request = SubgoalRequest::new("reach_resource_threshold")
            .param("item", "copper_ore")
            .param("quantity", 10);
        let goal = build_goal(&request, &WorldState::new()).expect("goal");
        assert_eq!(
            goal.target.get(StateKey::TargetItem),
            Some(&Value::from("copper_ore"))
        );
        assert_eq!(goal.target.int(StateKey::ItemCount), Some(10));
    }

    #[test]
    fn restore_hit_points_defaults_to_state_max() {
        let state = crate::world_state! { Hp => 12, MaxHp => 120 }.expect("state");
        let goal = build_goal(&SubgoalRequest::new("restore_hit_points"), &state).expect("goal");
        assert_eq!(goal.target.int(StateKey::Hp), Some(120));
    }

    #[test]
    fn unknown_goal_type_is_rejected() {
        let err = build_goal(&SubgoalRequest::new("summon_dragon"), &WorldState::new())
            .expect_err("unsupported");
        assert_eq!(
            err,
            SubgoalError::UnsupportedSubgoalType {
                goal_type: "summon_dragon".to_string()
            }
        );
    }

    #[test]
    fn missing_and_mistyped_parameters_are_rejected() {
        let missing = build_goal(
            &SubgoalRequest::new("move_to_location").param("x", 1),
            &WorldState::new(),
        )
        .expect_err("missing y");
        assert!(matches!(missing, SubgoalError::MissingParameter { ref param, .. } if param == "y"));

        let mistyped = build_goal(
            &SubgoalRequest::new("equip_item").param("item", true),
            &WorldState::new(),
        )
        .expect_err("bool item");
        assert!(matches!(
            mistyped,
            SubgoalError::InvalidParameter {
                expected: ValueKind::Text,
                ..
            }
        ));
    }

    #[test]
    fn preserve_names_must_be_state_keys() {
        let request = SubgoalRequest::new("move_to_location")
            .param("x", 1)
            .param("y", 2)
            .preserving("x")
            .preserving("quest_log");
        let err = SubgoalKind::validate(&request).expect_err("unknown preserve key");
        assert_eq!(
            err,
            SubgoalError::UnknownPreserveKey {
                goal_type: "move_to_location".to_string(),
                key: "quest_log".to_string()
            }
        );
    }

    #[test]
    fn goal_name_records_requesting_step() {
        let mut request = SubgoalRequest::new("equip_item").param("item", "copper_dagger");
        request.requested_by = Some("fight#0".to_string());
        let goal = build_goal(&request, &WorldState::new()).expect("goal");
        assert_eq!(goal.name, "equip_item<-fight#0");
    }
}
