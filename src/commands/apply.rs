use anyhow::{Context as _, Result};
use modgraph::ApplyReport;
use std::path::Path;

use super::{Loaded, load, print_plan};
use crate::Context;
use crate::config::Secrets;
use crate::modules::{COMPUTE, StackGraph};
use crate::progress::BarProgress;
use crate::provider::Backend;
use crate::state::{self, ApplyState};
use crate::ui;

pub fn run(ctx: &Context, yes: bool, dry_run: bool) -> Result<()> {
    let Loaded {
        config,
        state_dir,
        mut stack,
        ..
    } = load(ctx, |config| {
        if dry_run {
            Ok(Secrets::placeholder())
        } else {
            Secrets::from_env(&config.credentials)
        }
    })?;

    let plan = stack.graph.plan()?;
    if plan.is_empty() {
        ui::success("Nothing to apply, every module is already applied");
        return Ok(());
    }

    print_plan(&plan, ctx.verbose);
    println!();

    if dry_run {
        ui::info("Dry run, nothing was created");
        return Ok(());
    }

    if !yes && !ui::confirm(&format!("Apply {} modules to {}?", plan.len(), config.project))? {
        ui::info("Cancelled");
        return Ok(());
    }

    let backend = Backend::open(&config, &state_dir)?;
    ui::info(&format!("Provider: {}", backend.describe()));

    let mut progress = BarProgress::new(plan.len(), ctx.quiet);
    let result = plan.execute(&mut stack.graph, backend.provider(), &mut progress);
    progress.finish();

    // Partial applies are recorded too, so destroy can clean them up
    ApplyState::capture(&stack.graph).save(&state_dir)?;
    backend.persist()?;

    let report = result.context("Apply failed; modules applied before the failure are recorded in state")?;
    if report.applied.iter().any(|m| m == COMPUTE) {
        save_private_key(&stack, &state_dir, &config.project)?;
    }

    print_summary(&stack, &report);
    Ok(())
}

fn save_private_key(stack: &StackGraph, state_dir: &Path, project: &str) -> Result<()> {
    let pem = stack
        .graph
        .outputs(stack.compute)
        .and_then(|outputs| outputs.get("private_key_pem"))
        .and_then(|output| output.value.as_str());
    let Some(pem) = pem else {
        log::warn!("compute produced no private key");
        return Ok(());
    };

    let path = state::key_path(state_dir, project);
    if state::write_key_once(&path, pem)? {
        ui::success(&format!("SSH key written to {}", path.display()));
    } else {
        ui::dim(&format!("Keeping existing SSH key {}", path.display()));
    }
    Ok(())
}

fn print_summary(stack: &StackGraph, report: &ApplyReport) {
    println!();
    ui::success(&format!(
        "Applied {} modules ({} resources)",
        report.applied.len(),
        report.resources
    ));

    ui::section("Stack");
    if let Ok(vpc) = stack.graph.output::<String>(stack.networking, "vpc_id") {
        ui::kv("vpc", &vpc);
    }
    if let Ok(group) = stack.graph.output::<String>(stack.security, "public_sg_id") {
        ui::kv("public group", &group);
    }
    if let Ok(dns) = stack.graph.output::<String>(stack.load_balancer, "dns_name") {
        ui::kv("load balancer", &dns);
    }
    if let Ok(address) = stack.graph.output::<String>(stack.compute, "bastion_address") {
        ui::kv("bastion", &address);
    }
    if let Ok(endpoint) = stack.graph.output::<String>(stack.database, "endpoint") {
        ui::kv("database", &endpoint);
    }
}
