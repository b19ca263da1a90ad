//! Goal-oriented action planning with a recursive execution manager.
//!
//! An agent holds a catalog of declarative actions (preconditions, effects,
//! cost) and a set of candidate goals. It picks the goal worth pursuing,
//! plans a cheapest action sequence with A*, and executes it step by step
//! against an external runner. Unmet dependencies discovered at execution
//! time become subgoals that are pursued recursively before the blocked step
//! is retried. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state model, planning, goal
//!   scoring, subgoal construction). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting edges (action runners, config and scenario
//!   files). Isolated to enable scripted runners in tests.
//!
//! [`execution`] coordinates both to pursue goals; [`explain`] reports plans
//! without executing them.

pub mod core;
pub mod execution;
pub mod exit_codes;
pub mod explain;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
