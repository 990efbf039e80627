//! VPC, gateways, route tables and per-tier subnets

use modgraph::{
    Attr, Error, Inputs, OutputExpr, Rendered, ResourceDeclaration, ResourceKind, Result, Template,
};
use netpolicy::{Cidr, SubnetPlan, Tier};

/// The Networking module
#[derive(Debug)]
pub struct Networking;

impl Networking {
    pub const INPUTS: &'static [&'static str] = &["vpc_cidr", "zones", "public_cidrs", "app_cidrs", "db_cidrs"];
}

fn cidrs(inputs: &Inputs, name: &str) -> Result<Vec<Cidr>> {
    let raw: Vec<String> = inputs.get(name)?;
    raw.iter()
        .map(|s| s.parse().map_err(|e: netpolicy::Error| Error::template(inputs.module(), e.to_string())))
        .collect()
}

/// Logical resource name of the n-th subnet of a tier
pub fn subnet_name(tier: Tier, index: usize) -> String {
    format!("{tier}-subnet-{index}")
}

impl Template for Networking {
    fn kind(&self) -> &'static str {
        "networking"
    }

    fn inputs(&self) -> &'static [&'static str] {
        Self::INPUTS
    }

    fn render(&self, inputs: &Inputs) -> Result<Rendered> {
        let module = inputs.module();
        let vpc: String = inputs.get("vpc_cidr")?;
        let vpc: Cidr = vpc.parse().map_err(|e: netpolicy::Error| Error::template(module, e.to_string()))?;
        let zones: Vec<String> = inputs.get("zones")?;

        let plan = SubnetPlan::allocate(
            vpc,
            &zones,
            &cidrs(inputs, "public_cidrs")?,
            &cidrs(inputs, "app_cidrs")?,
            &cidrs(inputs, "db_cidrs")?,
        )
        .map_err(|e| Error::template(module, e.to_string()))?;

        let mut rendered = Rendered::new()
            .resource(
                ResourceDeclaration::new(ResourceKind::Network, "vpc")
                    .attr("cidr_block", vpc.to_string())
                    .attr("enable_dns_hostnames", true),
            )
            .resource(ResourceDeclaration::new(ResourceKind::InternetGateway, "igw").reference("vpc_id", "vpc", "id"));

        for tier in Tier::SUBNET_TIERS {
            for (index, allocation) in plan.tier(tier).enumerate() {
                rendered = rendered.resource(
                    ResourceDeclaration::new(ResourceKind::Subnet, subnet_name(tier, index))
                        .reference("vpc_id", "vpc", "id")
                        .attr("cidr_block", allocation.cidr.to_string())
                        .attr("availability_zone", allocation.zone.as_str())
                        .attr("map_public_ip_on_launch", tier == Tier::Public)
                        .tag("Tier", tier.as_str()),
                );
            }
        }

        let subnet_refs = |tier: Tier| -> Vec<OutputExpr> {
            (0..plan.tier(tier).count())
                .map(|i| OutputExpr::attr(subnet_name(tier, i), "id"))
                .collect()
        };
        let subnet_attrs = |tiers: &[Tier]| -> Attr {
            Attr::List(
                tiers
                    .iter()
                    .flat_map(|&tier| (0..plan.tier(tier).count()).map(move |i| Attr::reference(subnet_name(tier, i), "id")))
                    .collect(),
            )
        };

        let first_public = subnet_name(Tier::Public, 0);
        rendered = rendered
            .resource(
                ResourceDeclaration::new(ResourceKind::RouteTable, "public-routes")
                    .reference("vpc_id", "vpc", "id")
                    .attr("destination_cidr_block", Cidr::ANY.to_string())
                    .reference("gateway_id", "igw", "id")
                    .attr("subnet_ids", subnet_attrs(&[Tier::Public])),
            )
            .resource(ResourceDeclaration::new(ResourceKind::NatGateway, "nat").reference("subnet_id", &first_public, "id"))
            .resource(
                ResourceDeclaration::new(ResourceKind::RouteTable, "private-routes")
                    .reference("vpc_id", "vpc", "id")
                    .attr("destination_cidr_block", Cidr::ANY.to_string())
                    .reference("nat_gateway_id", "nat", "id")
                    .attr("subnet_ids", subnet_attrs(&[Tier::App, Tier::Db])),
            );

        Ok(rendered
            .output("vpc_id", OutputExpr::attr("vpc", "id"))
            .output("public_subnet_ids", OutputExpr::List(subnet_refs(Tier::Public)))
            .output("app_subnet_ids", OutputExpr::List(subnet_refs(Tier::App)))
            .output("db_subnet_ids", OutputExpr::List(subnet_refs(Tier::Db)))
            .output("nat_gateway_id", OutputExpr::attr("nat", "id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgraph::Value;
    use std::collections::BTreeMap;

    fn strings(items: &[&str]) -> Value {
        Value::from(items.to_vec())
    }

    fn inputs(db: &[&str]) -> Inputs {
        let values = BTreeMap::from([
            ("vpc_cidr".to_string(), Value::from("10.0.0.0/16")),
            ("zones".to_string(), strings(&["eu-west-1a", "eu-west-1b"])),
            ("public_cidrs".to_string(), strings(&["10.0.1.0/24", "10.0.2.0/24"])),
            ("app_cidrs".to_string(), strings(&["10.0.3.0/24", "10.0.4.0/24"])),
            ("db_cidrs".to_string(), strings(db)),
        ]);
        Inputs::new("networking", values)
    }

    #[test]
    fn test_renders_subnets_per_tier() {
        let rendered = Networking.render(&inputs(&["10.0.5.0/24", "10.0.6.0/24"])).unwrap();

        let subnets: Vec<&ResourceDeclaration> =
            rendered.resources.iter().filter(|r| r.kind == ResourceKind::Subnet).collect();
        assert_eq!(subnets.len(), 6);
        assert_eq!(subnets[0].name, "public-subnet-0");
        assert_eq!(subnets[1].attributes["availability_zone"], Attr::from("eu-west-1b"));
        assert_eq!(subnets[5].attributes["cidr_block"], Attr::from("10.0.6.0/24"));

        let names: Vec<&str> = rendered.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["vpc_id", "public_subnet_ids", "app_subnet_ids", "db_subnet_ids", "nat_gateway_id"]
        );
    }

    #[test]
    fn test_nat_gateway_sits_in_first_public_subnet() {
        let rendered = Networking.render(&inputs(&["10.0.5.0/24", "10.0.6.0/24"])).unwrap();
        let nat = rendered.resources.iter().find(|r| r.name == "nat").unwrap();
        assert_eq!(nat.attributes["subnet_id"], Attr::reference("public-subnet-0", "id"));
    }

    #[test]
    fn test_single_db_subnet_is_template_error() {
        let err = Networking.render(&inputs(&["10.0.5.0/24"])).unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
        assert!(err.to_string().contains("db tier"));
    }
}
