//! Goal-oriented action planner CLI.
//!
//! Loads a scenario file (start state, action catalog, candidate goals) and
//! reports what the planner and goal selector make of it. Nothing is
//! executed: pursuits need a live action runner and are driven through the
//! library API. `goap init` writes a default agent config to start from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use goap::core::invariants::validate_state_invariants;
use goap::core::selector::{GoalSelector, Selection};
use goap::exit_codes;
use goap::explain::explain_plan;
use goap::io::config::{AgentConfig, load_config, write_config};
use goap::io::scenario::{Scenario, load_scenario};
use goap::logging;

#[derive(Parser)]
#[command(name = "goap", version, about = "Goal-oriented action planner")]
struct Cli {
    /// Agent config (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "goap.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default agent config to the `--config` path.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Load a scenario and check its catalog, goals and start state.
    Validate { scenario: PathBuf },
    /// Plan a goal from the scenario's start state, or report why it cannot be planned.
    Explain {
        scenario: PathBuf,
        /// Goal to plan; defaults to the goal the selector would pick.
        #[arg(long)]
        goal: Option<String>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Score every candidate goal against the start state.
    Rank {
        scenario: PathBuf,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate { scenario } => {
            load_config(&cli.config)?;
            cmd_validate(&scenario)
        }
        Command::Explain {
            scenario,
            goal,
            json,
        } => {
            let cfg = load_config(&cli.config)?;
            cmd_explain(&cfg, &scenario, goal.as_deref(), json)
        }
        Command::Rank { scenario, json } => {
            let cfg = load_config(&cli.config)?;
            cmd_rank(&cfg, &scenario, json)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &AgentConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let scenario = load_scenario(path)?;
    let violations = validate_state_invariants(&scenario.state);
    if !violations.is_empty() {
        bail!("start state invariant violations:\n- {}", violations.join("\n- "));
    }
    println!(
        "ok: {} actions, {} goals, {} state keys",
        scenario.catalog.len(),
        scenario.goals.len(),
        scenario.state.len()
    );
    Ok(exit_codes::OK)
}

fn cmd_explain(cfg: &AgentConfig, path: &Path, goal: Option<&str>, json: bool) -> Result<i32> {
    let scenario = load_scenario(path)?;
    let goal = match goal {
        Some(name) => scenario
            .goal(name)
            .with_context(|| format!("unknown goal '{name}'"))?,
        None => match selector(cfg, &scenario).select(
            &scenario.catalog,
            &scenario.state,
            &scenario.goals,
        )? {
            Selection::Selected { index, .. } => &scenario.goals[index],
            Selection::AllSatisfied => {
                println!("all goals already satisfied");
                return Ok(exit_codes::OK);
            }
            Selection::NoCandidates => return Err(anyhow!("scenario declares no goals")),
        },
    };

    let explanation = explain_plan(
        &scenario.catalog,
        goal,
        &scenario.state,
        cfg.search_limits(),
    );
    if json {
        print_json(&explanation)?;
    } else {
        print!("{}", explanation.render());
    }
    if explanation.is_plan() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::EXHAUSTED)
    }
}

fn cmd_rank(cfg: &AgentConfig, path: &Path, json: bool) -> Result<i32> {
    let scenario = load_scenario(path)?;
    let selection =
        selector(cfg, &scenario).select(&scenario.catalog, &scenario.state, &scenario.goals)?;
    let (selected, scores) = match selection {
        Selection::Selected { index, scores } => (&scenario.goals[index].name, scores),
        Selection::AllSatisfied => {
            println!("all goals already satisfied");
            return Ok(exit_codes::OK);
        }
        Selection::NoCandidates => return Err(anyhow!("scenario declares no goals")),
    };

    if json {
        print_json(&scores)?;
        return Ok(exit_codes::OK);
    }
    for score in &scores {
        let marker = if &score.goal == selected { "*" } else { " " };
        println!(
            "{marker} {:<24} total={:.3} necessity={:.3} feasibility={:.3} progression={:.3} stability={:.3}",
            score.goal,
            score.total,
            score.necessity,
            score.feasibility,
            score.progression,
            score.stability
        );
    }
    Ok(exit_codes::OK)
}

fn selector(cfg: &AgentConfig, scenario: &Scenario) -> GoalSelector {
    GoalSelector::new(
        cfg.weights,
        cfg.probe_limits(),
        Arc::new(scenario.game_data.clone()),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
