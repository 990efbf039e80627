//! Public load balancer, target group and listener

use modgraph::{Inputs, OutputExpr, Rendered, ResourceDeclaration, ResourceKind, Result, Template};

/// The LoadBalancer module
#[derive(Debug)]
pub struct LoadBalancer;

impl LoadBalancer {
    pub const INPUTS: &'static [&'static str] = &[
        "vpc_id",
        "public_subnet_ids",
        "public_sg_id",
        "listener_port",
        "target_port",
        "health_check_path",
    ];
}

impl Template for LoadBalancer {
    fn kind(&self) -> &'static str {
        "load-balancer"
    }

    fn inputs(&self) -> &'static [&'static str] {
        Self::INPUTS
    }

    fn render(&self, inputs: &Inputs) -> Result<Rendered> {
        let subnets: Vec<String> = inputs.get("public_subnet_ids")?;
        let group: String = inputs.get("public_sg_id")?;

        Ok(Rendered::new()
            .resource(
                ResourceDeclaration::new(ResourceKind::LoadBalancer, "alb")
                    .attr("load_balancer_type", "application")
                    .attr("internal", false)
                    .attr("subnets", subnets)
                    .attr("security_groups", vec![group]),
            )
            .resource(
                ResourceDeclaration::new(ResourceKind::TargetGroup, "targets")
                    .attr("vpc_id", inputs.get::<String>("vpc_id")?)
                    .attr("protocol", "HTTP")
                    .attr("port", inputs.get::<u16>("target_port")?)
                    .attr("health_check_path", inputs.get::<String>("health_check_path")?),
            )
            .resource(
                ResourceDeclaration::new(ResourceKind::Listener, "http")
                    .reference("load_balancer_arn", "alb", "arn")
                    .attr("protocol", "HTTP")
                    .attr("port", inputs.get::<u16>("listener_port")?)
                    .reference("default_target_group_arn", "targets", "arn"),
            )
            .output("dns_name", OutputExpr::attr("alb", "dns_name"))
            .output("target_group_arn", OutputExpr::attr("targets", "arn")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgraph::{Attr, Value};
    use std::collections::BTreeMap;

    #[test]
    fn test_listener_forwards_to_target_group() {
        let values = BTreeMap::from([
            ("vpc_id".to_string(), Value::from("vpc-1")),
            ("public_subnet_ids".to_string(), Value::from(vec!["subnet-1", "subnet-2"])),
            ("public_sg_id".to_string(), Value::from("sg-public")),
            ("listener_port".to_string(), Value::Int(80)),
            ("target_port".to_string(), Value::Int(8080)),
            ("health_check_path".to_string(), Value::from("/health")),
        ]);
        let rendered = LoadBalancer.render(&Inputs::new("load-balancer", values)).unwrap();

        let listener = rendered.resources.iter().find(|r| r.kind == ResourceKind::Listener).unwrap();
        assert_eq!(
            listener.attributes["default_target_group_arn"],
            Attr::reference("targets", "arn")
        );
        let alb = &rendered.resources[0];
        assert_eq!(alb.attributes["subnets"], Attr::from(vec!["subnet-1", "subnet-2"]));
    }
}
