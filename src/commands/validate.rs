use anyhow::Result;
use netpolicy::Tier;

use super::warn_missing_credentials;
use crate::Context;
use crate::config::StackConfig;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let config = StackConfig::load_valid(&ctx.config_path)?;
    let plan = config.network.subnet_plan()?;
    let topology = config.security.topology(config.database.port);

    ui::header(&format!("{} ({})", config.project, config.environment));
    ui::kv("region", &config.region);
    ui::kv("vpc", &plan.vpc().to_string());

    ui::section("Subnets");
    for tier in Tier::SUBNET_TIERS {
        let blocks: Vec<String> = plan.tier(tier).map(|a| format!("{} ({})", a.cidr, a.zone)).collect();
        ui::kv(tier.as_str(), &blocks.join(", "));
    }

    ui::section("Security");
    for edge in topology.edges() {
        ui::dim(&edge.to_string());
    }
    for tier in Tier::ALL {
        ui::kv(&format!("{tier} egress"), &format!("{:?}", topology.egress(tier)));
    }

    println!();
    if warn_missing_credentials(&config) {
        ui::success("Configuration is valid");
    } else {
        ui::success("Configuration is valid; set the variables above before applying");
    }
    Ok(())
}
