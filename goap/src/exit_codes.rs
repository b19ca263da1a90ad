//! Stable exit codes for `goap` CLI commands.

/// Command succeeded; for `explain`, a plan was found.
pub const OK: i32 = 0;
/// Command failed due to an invalid scenario, config or other errors.
pub const INVALID: i32 = 1;
/// `goap explain` found no plan within the search limits.
pub const EXHAUSTED: i32 = 2;
