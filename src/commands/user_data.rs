use anyhow::{Context as _, Result};
use modgraph::{Inputs, Value};
use nodeboot::{BootstrapPayload, render_user_data};
use std::collections::BTreeMap;

use crate::Context;
use crate::config::{Secrets, StackConfig};
use crate::modules::{self, COMPUTE, DATABASE, compute};
use crate::state::ApplyState;

/// Print the startup script app nodes boot with, secrets masked
pub fn run(ctx: &Context) -> Result<()> {
    let config = StackConfig::load_valid(&ctx.config_path)?;
    let secrets = Secrets::from_env(&config.credentials)?;
    let state = ApplyState::load(&config.state_dir()?)?
        .filter(|s| s.graph.modules.contains_key(DATABASE))
        .context("The database module has not been applied yet; run `tierstack apply` first")?;

    let payload = payload_from_state(&config, &secrets, &state)?;
    let script = render_user_data(&payload, &config.user_data_options())?;
    println!("{}", payload.redact(&script));
    Ok(())
}

/// The payload Compute would embed, with the database outputs from state
fn payload_from_state(config: &StackConfig, secrets: &Secrets, state: &ApplyState) -> Result<BootstrapPayload> {
    let database = &state.graph.modules[DATABASE].outputs;
    let mut values: BTreeMap<String, Value> = modules::compute_literals(config, secrets)
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    for (input, output) in [("db_host", "host"), ("db_port", "port"), ("database_name", "database_name")] {
        let value = database
            .get(output)
            .with_context(|| format!("State has no database output '{output}'"))?;
        values.insert(input.to_string(), value.value.clone());
    }

    compute::bootstrap_payload(&Inputs::new(COMPUTE, values)).context("Failed to assemble bootstrap payload")
}
