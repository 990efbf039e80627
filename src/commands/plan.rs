use anyhow::{Context as _, Result};

use super::{load, print_plan};
use crate::Context;
use crate::config::Secrets;
use crate::ui;

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    // Planning never renders templates, so no credential is needed
    let loaded = load(ctx, |_| Ok(Secrets::placeholder()))?;
    let plan = loaded.stack.graph.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?);
        return Ok(());
    }

    if plan.is_empty() {
        ui::success("Every module is already applied");
        return Ok(());
    }
    print_plan(&plan, ctx.verbose);
    println!();
    ui::info(&format!("{} modules to apply", plan.len()));
    Ok(())
}
