//! Side-effecting edges: action runners, config and scenario files.

pub mod config;
pub mod runner;
pub mod scenario;
