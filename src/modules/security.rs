//! The four security groups and every allow-rule between them.
//!
//! Rules reference groups, never addresses, except for ingress from outside
//! the topology. The whole rule set is created in this module's single apply.

use modgraph::{Error, Inputs, OutputExpr, Rendered, ResourceDeclaration, ResourceKind, Result, Template};
use netpolicy::{Cidr, EgressPolicy, SecurityEdge, SecurityTopology, Source, Tier};

/// The Security module
#[derive(Debug)]
pub struct Security;

impl Security {
    pub const INPUTS: &'static [&'static str] = &["vpc_id", "app_port", "db_port", "admin_cidrs", "db_egress"];
}

fn group_name(tier: Tier) -> String {
    format!("{tier}-sg")
}

/// The topology described by the module inputs, validated
pub fn topology(inputs: &Inputs) -> Result<SecurityTopology> {
    let module = inputs.module();
    let invalid = |e: netpolicy::Error| Error::template(module, e.to_string());

    let admin: Vec<String> = inputs.get("admin_cidrs")?;
    let admin: Vec<Cidr> = admin
        .iter()
        .map(|s| s.parse())
        .collect::<netpolicy::Result<_>>()
        .map_err(invalid)?;
    let db_egress = match inputs.get::<String>("db_egress")?.as_str() {
        "allow-all" => EgressPolicy::AllowAll,
        "deny-all" => EgressPolicy::DenyAll,
        other => return Err(Error::template(module, format!("unknown egress policy '{other}'"))),
    };

    let mut topology = SecurityTopology::three_tier(inputs.get("app_port")?, inputs.get("db_port")?, &admin);
    topology.set_egress(Tier::Db, db_egress);
    topology.validate().map_err(invalid)?;
    Ok(topology)
}

fn rule(index: usize, edge: &SecurityEdge) -> ResourceDeclaration {
    let decl = ResourceDeclaration::new(
        ResourceKind::SecurityGroupRule,
        format!("{}-ingress-{index}", edge.destination),
    )
    .attr("type", "ingress")
    .reference("security_group_id", group_name(edge.destination), "id")
    .attr("protocol", edge.protocol.as_str())
    .attr("from_port", edge.ports.from())
    .attr("to_port", edge.ports.to())
    .attr("description", edge.to_string());

    match edge.source {
        Source::Group(tier) => decl.reference("source_security_group_id", group_name(tier), "id"),
        Source::Cidr(cidr) => decl.attr("cidr_blocks", vec![cidr.to_string()]),
    }
}

impl Template for Security {
    fn kind(&self) -> &'static str {
        "security"
    }

    fn inputs(&self) -> &'static [&'static str] {
        Self::INPUTS
    }

    fn render(&self, inputs: &Inputs) -> Result<Rendered> {
        let topology = topology(inputs)?;
        let vpc_id: String = inputs.get("vpc_id")?;

        let mut rendered = Rendered::new();
        for tier in Tier::ALL {
            rendered = rendered.resource(
                ResourceDeclaration::new(ResourceKind::SecurityGroup, group_name(tier))
                    .attr("vpc_id", vpc_id.as_str())
                    .attr("description", format!("{tier} tier"))
                    .tag("Tier", tier.as_str()),
            );
        }

        for (index, edge) in topology.edges().iter().enumerate() {
            rendered = rendered.resource(rule(index, edge));
        }

        for tier in Tier::ALL {
            if topology.egress(tier) == EgressPolicy::AllowAll {
                rendered = rendered.resource(
                    ResourceDeclaration::new(ResourceKind::SecurityGroupRule, format!("{tier}-egress"))
                        .attr("type", "egress")
                        .reference("security_group_id", group_name(tier), "id")
                        .attr("protocol", "-1")
                        .attr("from_port", 0u16)
                        .attr("to_port", 0u16)
                        .attr("cidr_blocks", vec![Cidr::ANY.to_string()]),
                );
            }
        }

        for tier in Tier::ALL {
            rendered = rendered.output(format!("{tier}_sg_id"), OutputExpr::attr(group_name(tier), "id"));
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgraph::{Attr, Value};
    use std::collections::BTreeMap;

    fn inputs(db_egress: &str) -> Inputs {
        let values = BTreeMap::from([
            ("vpc_id".to_string(), Value::from("vpc-1")),
            ("app_port".to_string(), Value::Int(80)),
            ("db_port".to_string(), Value::Int(5432)),
            ("admin_cidrs".to_string(), Value::from(vec!["203.0.113.0/24"])),
            ("db_egress".to_string(), Value::from(db_egress)),
        ]);
        Inputs::new("security", values)
    }

    fn names(rendered: &Rendered, kind: ResourceKind) -> Vec<String> {
        rendered
            .resources
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.name.clone())
            .collect()
    }

    #[test]
    fn test_four_groups_and_outputs() {
        let rendered = Security.render(&inputs("deny-all")).unwrap();
        assert_eq!(
            names(&rendered, ResourceKind::SecurityGroup),
            vec!["public-sg", "admin-sg", "app-sg", "db-sg"]
        );
        let outputs: Vec<&str> = rendered.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(outputs, vec!["public_sg_id", "admin_sg_id", "app_sg_id", "db_sg_id"]);
    }

    #[test]
    fn test_db_only_reachable_from_app_group() {
        let rendered = Security.render(&inputs("deny-all")).unwrap();
        let db_rules: Vec<&ResourceDeclaration> = rendered
            .resources
            .iter()
            .filter(|r| r.name.starts_with("db-ingress"))
            .collect();

        assert_eq!(db_rules.len(), 1);
        assert_eq!(
            db_rules[0].attributes["source_security_group_id"],
            Attr::reference("app-sg", "id")
        );
        assert_eq!(db_rules[0].attributes["from_port"], Attr::from(5432u16));
    }

    #[test]
    fn test_db_egress_policy() {
        let denied = Security.render(&inputs("deny-all")).unwrap();
        assert!(!names(&denied, ResourceKind::SecurityGroupRule).contains(&"db-egress".to_string()));
        assert!(names(&denied, ResourceKind::SecurityGroupRule).contains(&"app-egress".to_string()));

        let allowed = Security.render(&inputs("allow-all")).unwrap();
        assert!(names(&allowed, ResourceKind::SecurityGroupRule).contains(&"db-egress".to_string()));
    }

    #[test]
    fn test_unknown_egress_policy() {
        let err = Security.render(&inputs("sometimes")).unwrap_err();
        assert!(err.to_string().contains("sometimes"));
    }
}
