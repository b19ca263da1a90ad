//! Deterministic, pure logic shared by the planner and the execution manager.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod catalog;
pub mod context;
pub mod error;
pub mod game_data;
pub mod goal;
pub mod invariants;
pub mod planner;
pub mod selector;
pub mod state;
pub mod subgoal;
pub mod types;
