pub mod apply;
pub mod destroy;
pub mod node;
pub mod outputs;
pub mod plan;
pub mod user_data;
pub mod validate;

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use modgraph::{Plan, PlannedInput};
use std::path::PathBuf;

use crate::Context;
use crate::config::{Secrets, StackConfig};
use crate::modules::{self, StackGraph};
use crate::state::ApplyState;
use crate::ui;

/// A configured stack with its recorded apply state restored
pub struct Loaded {
    pub config: StackConfig,
    pub state_dir: PathBuf,
    pub stack: StackGraph,
    pub state: Option<ApplyState>,
}

/// Load and validate the configuration, build the graph and restore state
pub fn load(ctx: &Context, secrets: impl FnOnce(&StackConfig) -> Result<Secrets>) -> Result<Loaded> {
    let config = StackConfig::load_valid(&ctx.config_path)?;
    let secrets = secrets(&config)?;
    let mut stack = modules::build_graph(&config, &secrets)?;
    let state_dir = config.state_dir()?;

    let state = ApplyState::load(&state_dir)?;
    if let Some(state) = &state {
        if state.project != config.project {
            bail!(
                "State in {} belongs to project '{}', not '{}'",
                state_dir.display(),
                state.project,
                config.project
            );
        }
        stack
            .graph
            .restore(state.graph.clone())
            .context("Failed to restore apply state")?;
        log::debug!("Restored {} applied modules", state.graph.order.len());
    }

    Ok(Loaded {
        config,
        state_dir,
        stack,
        state,
    })
}

/// Print the steps of a plan; with `-v`, where every input comes from
pub fn print_plan(plan: &Plan, verbose: u8) {
    ui::header(&format!("Plan: {}", plan.project()));
    for (i, step) in plan.steps().iter().enumerate() {
        ui::step(i + 1, plan.len(), &format!("{} {}", step.module.bold(), format!("({})", step.kind).dimmed()));
        if !step.dependencies.is_empty() {
            ui::dim(&format!("after {}", step.dependencies.join(", ")));
        }
        if verbose > 0 {
            for input in &step.inputs {
                match input {
                    PlannedInput::Literal { input } => ui::kv(input, "literal"),
                    PlannedInput::Output { input, module, output } => ui::kv(input, &format!("{module}.{output}")),
                }
            }
        }
    }
}

/// Warn about credential variables that are not set
pub fn warn_missing_credentials(config: &StackConfig) -> bool {
    let missing = config.credentials.missing();
    for name in &missing {
        ui::warn(&format!("{name} is not set"));
    }
    missing.is_empty()
}
