//! Load-time error types for catalogs, goals and subgoal requests.
//!
//! These surface immediately when data is constructed or loaded; none of them
//! is deferred to plan execution.

use thiserror::Error;

use crate::core::state::{StateKey, ValueKind};

/// Catalog or goal misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("duplicate action '{name}'")]
    DuplicateAction { name: String },

    #[error("unknown state key '{key}'")]
    UnknownKey { key: String },

    #[error("state key '{key}' expects {expected} but got {found}")]
    TypeMismatch {
        key: StateKey,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("unknown action '{name}'")]
    UnknownAction { name: String },

    #[error("duplicate goal '{name}'")]
    DuplicateGoal { name: String },

    #[error("action '{action}' declares an invalid subgoal: {source}")]
    InvalidSubgoal {
        action: String,
        #[source]
        source: SubgoalError,
    },
}

/// A subgoal request that cannot be turned into a goal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubgoalError {
    #[error("unsupported subgoal type '{goal_type}'")]
    UnsupportedSubgoalType { goal_type: String },

    #[error("subgoal '{goal_type}' is missing parameter '{param}'")]
    MissingParameter { goal_type: String, param: String },

    #[error("subgoal '{goal_type}' parameter '{param}' must be {expected}")]
    InvalidParameter {
        goal_type: String,
        param: String,
        expected: ValueKind,
    },

    #[error("subgoal '{goal_type}' preserves '{key}', which is not a state key")]
    UnknownPreserveKey { goal_type: String, key: String },
}
