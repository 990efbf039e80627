use anyhow::{Context as _, Result};

use super::{Loaded, load};
use crate::Context;
use crate::config::Secrets;
use crate::progress::BarProgress;
use crate::provider::Backend;
use crate::state::{self, ApplyState};
use crate::ui;

pub fn run(ctx: &Context, yes: bool) -> Result<()> {
    // Destroy works from recorded resource ids; no template is rendered
    let Loaded {
        config,
        state_dir,
        mut stack,
        state,
    } = load(ctx, |_| Ok(Secrets::placeholder()))?;

    let Some(state) = state.filter(|s| !s.is_empty()) else {
        ui::info("Nothing to destroy");
        return Ok(());
    };

    ui::header(&format!("Destroy: {}", config.project));
    let total = state.graph.order.len();
    for (i, module) in state.graph.order.iter().rev().enumerate() {
        let resources = state.graph.modules.get(module).map_or(0, |m| m.resources.len());
        ui::step(i + 1, total, &format!("{module} ({resources} resources)"));
    }
    println!();

    if !yes && !ui::confirm(&format!("Destroy every resource of {}?", config.project))? {
        ui::info("Cancelled");
        return Ok(());
    }

    let backend = Backend::open(&config, &state_dir)?;
    ui::info(&format!("Provider: {}", backend.describe()));

    let mut progress = BarProgress::new(total, ctx.quiet);
    let result = stack.graph.destroy(backend.provider(), &mut progress);
    progress.finish();
    backend.persist()?;

    match result {
        Ok(report) => {
            ApplyState::remove(&state_dir)?;
            state::remove_key(&state::key_path(&state_dir, &config.project))?;
            ui::success(&format!(
                "Destroyed {} modules ({} resources)",
                report.destroyed.len(),
                report.resources
            ));
            Ok(())
        }
        Err(e) => {
            // Keep what is left so the next destroy resumes from there
            ApplyState::capture(&stack.graph).save(&state_dir)?;
            Err(e).context("Destroy failed; remaining modules are still recorded in state")
        }
    }
}
