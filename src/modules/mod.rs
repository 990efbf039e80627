//! Module library and the stack graph.
//!
//! Five modules make up a stack: networking, security, database,
//! load-balancer and compute. [`build_graph`] registers them in that order,
//! binds the literal inputs from the configuration and wires every
//! cross-module input through a typed output handle.

pub mod compute;
pub mod database;
pub mod load_balancer;
pub mod networking;
pub mod security;

use crate::config::{Secrets, StackConfig};
use anyhow::{Context, Result};
use modgraph::{ModuleGraph, ModuleId, Value};
use netpolicy::{EgressPolicy, Tier};

pub const NETWORKING: &str = "networking";
pub const SECURITY: &str = "security";
pub const DATABASE: &str = "database";
pub const LOAD_BALANCER: &str = "load-balancer";
pub const COMPUTE: &str = "compute";

/// The registered stack and the ids of its modules
#[derive(Debug)]
pub struct StackGraph {
    pub graph: ModuleGraph,
    pub networking: ModuleId,
    pub security: ModuleId,
    pub database: ModuleId,
    pub load_balancer: ModuleId,
    pub compute: ModuleId,
}

fn cidr_strings(cidrs: impl IntoIterator<Item = netpolicy::Cidr>) -> Value {
    Value::from(cidrs.into_iter().map(|c| c.to_string()).collect::<Vec<_>>())
}

/// Literal Compute inputs: everything except the upstream outputs
pub fn compute_literals(config: &StackConfig, secrets: &Secrets) -> Vec<(&'static str, Value)> {
    let node = &config.compute;
    vec![
        ("project", Value::from(config.project.as_str())),
        ("db_username", Value::from(config.database.username.as_str())),
        ("db_password", Value::from(secrets.db_password.expose())),
        ("image", Value::from(node.image.as_str())),
        ("registry_server", Value::from(node.registry_server.as_str())),
        ("registry_username", Value::from(node.registry_username.as_str())),
        ("registry_token", Value::from(secrets.registry_token.expose())),
        ("auth_secret_key", Value::from(secrets.auth_secret_key.expose())),
        ("auth_public_key", Value::from(secrets.auth_public_key.expose())),
        ("payment_secret_key", Value::from(secrets.payment_secret_key.expose())),
        ("payment_public_key", Value::from(secrets.payment_public_key.expose())),
        ("app_port", Value::from(config.security.app_port)),
        ("container_port", Value::from(node.container_port)),
        ("machine_image", Value::from(node.machine_image.as_str())),
        ("instance_type", Value::from(node.instance_type.as_str())),
        ("bastion_instance_type", Value::from(node.bastion_instance_type.as_str())),
        ("min_size", Value::from(node.min_size)),
        ("desired_capacity", Value::from(node.desired_capacity)),
        ("max_size", Value::from(node.max_size)),
        ("agent_path", Value::from(node.agent_path.as_str())),
    ]
}

/// Register and wire every module of the stack
pub fn build_graph(config: &StackConfig, secrets: &Secrets) -> Result<StackGraph> {
    build(config, secrets).with_context(|| format!("Failed to build module graph for '{}'", config.project))
}

fn build(config: &StackConfig, secrets: &Secrets) -> modgraph::Result<StackGraph> {
    let mut graph = ModuleGraph::new(config.project.as_str()).with_tag("Environment", config.environment.as_str());

    let net = graph.register(NETWORKING, networking::Networking, &[])?;
    let sec = graph.register(SECURITY, security::Security, &[NETWORKING])?;
    let db = graph.register(DATABASE, database::Database, &[NETWORKING, SECURITY])?;
    let lb = graph.register(LOAD_BALANCER, load_balancer::LoadBalancer, &[NETWORKING, SECURITY])?;
    let compute = graph.register(
        COMPUTE,
        compute::Compute,
        &[NETWORKING, SECURITY, DATABASE, LOAD_BALANCER],
    )?;

    // Networking: subnet blocks come from the validated plan, so carved and
    // explicit layouts look the same to the template.
    let plan = config
        .network
        .subnet_plan()
        .map_err(|e| modgraph::Error::template(NETWORKING, e.to_string()))?;
    graph.bind_value(net, "vpc_cidr", plan.vpc().to_string())?;
    graph.bind_value(net, "zones", config.network.zones.clone())?;
    graph.bind_value(net, "public_cidrs", cidr_strings(plan.tier(Tier::Public).map(|a| a.cidr)))?;
    graph.bind_value(net, "app_cidrs", cidr_strings(plan.tier(Tier::App).map(|a| a.cidr)))?;
    graph.bind_value(net, "db_cidrs", cidr_strings(plan.tier(Tier::Db).map(|a| a.cidr)))?;

    // Security
    graph.bind(sec, "vpc_id", net.output::<String>("vpc_id"))?;
    graph.bind_value(sec, "app_port", config.security.app_port)?;
    graph.bind_value(sec, "db_port", config.database.port)?;
    graph.bind_value(sec, "admin_cidrs", cidr_strings(config.security.admin_cidrs.iter().copied()))?;
    let egress = match config.security.db_egress {
        EgressPolicy::AllowAll => "allow-all",
        EgressPolicy::DenyAll => "deny-all",
    };
    graph.bind_value(sec, "db_egress", egress)?;

    // Database
    let database = &config.database;
    graph.bind(db, "db_subnet_ids", net.output::<Vec<String>>("db_subnet_ids"))?;
    graph.bind(db, "db_sg_id", sec.output::<String>("db_sg_id"))?;
    graph.bind_value(db, "engine", database.engine.as_str())?;
    graph.bind_value(db, "engine_version", database.engine_version.as_str())?;
    graph.bind_value(db, "instance_class", database.instance_class.as_str())?;
    graph.bind_value(db, "allocated_storage", database.allocated_storage)?;
    graph.bind_value(db, "port", database.port)?;
    graph.bind_value(db, "database_name", database.name.as_str())?;
    graph.bind_value(db, "username", database.username.as_str())?;
    graph.bind_value(db, "password", secrets.db_password.expose())?;

    // Load balancer
    graph.bind(lb, "vpc_id", net.output::<String>("vpc_id"))?;
    graph.bind(lb, "public_subnet_ids", net.output::<Vec<String>>("public_subnet_ids"))?;
    graph.bind(lb, "public_sg_id", sec.output::<String>("public_sg_id"))?;
    graph.bind_value(lb, "listener_port", config.load_balancer.listener_port)?;
    graph.bind_value(lb, "target_port", config.security.app_port)?;
    graph.bind_value(lb, "health_check_path", config.load_balancer.health_check_path.as_str())?;

    // Compute
    graph.bind(compute, "app_subnet_ids", net.output::<Vec<String>>("app_subnet_ids"))?;
    graph.bind(compute, "public_subnet_ids", net.output::<Vec<String>>("public_subnet_ids"))?;
    graph.bind(compute, "app_sg_id", sec.output::<String>("app_sg_id"))?;
    graph.bind(compute, "admin_sg_id", sec.output::<String>("admin_sg_id"))?;
    graph.bind(compute, "target_group_arn", lb.output::<String>("target_group_arn"))?;
    graph.bind(compute, "db_host", db.output::<String>("host"))?;
    graph.bind(compute, "db_port", db.output::<u16>("port"))?;
    graph.bind(compute, "database_name", db.output::<String>("database_name"))?;

    for (input, value) in compute_literals(config, secrets) {
        graph.bind_value(compute, input, value)?;
    }

    Ok(StackGraph {
        graph,
        networking: net,
        security: sec,
        database: db,
        load_balancer: lb,
        compute,
    })
}
