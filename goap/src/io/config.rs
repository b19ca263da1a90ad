//! Agent configuration stored as TOML (default `goap.toml`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::context::DEFAULT_MAX_DEPTH;
use crate::core::planner::SearchLimits;
use crate::core::selector::ScoreWeights;

/// Agent configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that suit a single character pursuing short goals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum subgoal nesting below a top-level goal.
    pub max_depth: usize,

    /// Wall-clock budget per top-level pursuit, in seconds.
    pub pursuit_timeout_secs: u64,

    /// Replans allowed per goal before the pursuit fails.
    pub max_replans: u32,

    /// Cooldown waits allowed per step.
    pub max_cooldown_retries: u32,

    /// Subgoal rounds allowed per step.
    pub max_subgoal_attempts: u32,

    pub search: SearchConfig,

    /// Bounds for the feasibility probe run while scoring goals.
    pub probe: SearchConfig,

    pub weights: ScoreWeights,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub max_expansions: usize,
    pub max_plan_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let limits = SearchLimits::default();
        Self {
            max_expansions: limits.max_expansions,
            max_plan_length: limits.max_plan_length,
        }
    }
}

impl SearchConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            max_expansions: self.max_expansions,
            max_plan_length: self.max_plan_length,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            pursuit_timeout_secs: 5 * 60,
            max_replans: 8,
            max_cooldown_retries: 16,
            max_subgoal_attempts: 3,
            search: SearchConfig::default(),
            probe: SearchConfig {
                max_expansions: 500,
                ..SearchConfig::default()
            },
            weights: ScoreWeights::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(anyhow!("max_depth must be > 0"));
        }
        if self.pursuit_timeout_secs == 0 {
            return Err(anyhow!("pursuit_timeout_secs must be > 0"));
        }
        if self.max_subgoal_attempts == 0 {
            return Err(anyhow!("max_subgoal_attempts must be > 0"));
        }
        for (name, search) in [("search", &self.search), ("probe", &self.probe)] {
            if search.max_expansions == 0 {
                return Err(anyhow!("{name}.max_expansions must be > 0"));
            }
            if search.max_plan_length == 0 {
                return Err(anyhow!("{name}.max_plan_length must be > 0"));
            }
        }
        self.weights.validate().map_err(|msg| anyhow!(msg))?;
        Ok(())
    }

    pub fn pursuit_timeout(&self) -> Duration {
        Duration::from_secs(self.pursuit_timeout_secs)
    }

    pub fn search_limits(&self) -> SearchLimits {
        self.search.limits()
    }

    pub fn probe_limits(&self) -> SearchLimits {
        self.probe.limits()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
