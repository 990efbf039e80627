//! Managed database instance confined to the db subnets and db group

use modgraph::{Inputs, OutputExpr, Rendered, ResourceDeclaration, ResourceKind, Result, Template};

/// The Database module
#[derive(Debug)]
pub struct Database;

impl Database {
    pub const INPUTS: &'static [&'static str] = &[
        "db_subnet_ids",
        "db_sg_id",
        "engine",
        "engine_version",
        "instance_class",
        "allocated_storage",
        "port",
        "database_name",
        "username",
        "password",
    ];
}

impl Template for Database {
    fn kind(&self) -> &'static str {
        "database"
    }

    fn inputs(&self) -> &'static [&'static str] {
        Self::INPUTS
    }

    fn render(&self, inputs: &Inputs) -> Result<Rendered> {
        let subnets: Vec<String> = inputs.get("db_subnet_ids")?;
        let group: String = inputs.get("db_sg_id")?;
        let port: u16 = inputs.get("port")?;
        let database_name: String = inputs.get("database_name")?;

        Ok(Rendered::new()
            .resource(ResourceDeclaration::new(ResourceKind::DbSubnetGroup, "subnet-group").attr("subnet_ids", subnets))
            .resource(
                ResourceDeclaration::new(ResourceKind::DatabaseInstance, "instance")
                    .attr("engine", inputs.get::<String>("engine")?)
                    .attr("engine_version", inputs.get::<String>("engine_version")?)
                    .attr("instance_class", inputs.get::<String>("instance_class")?)
                    .attr("allocated_storage", inputs.get::<u32>("allocated_storage")?)
                    .attr("port", port)
                    .attr("db_name", database_name.as_str())
                    .attr("username", inputs.get::<String>("username")?)
                    .attr("master_password", inputs.get::<String>("password")?)
                    .reference("db_subnet_group_name", "subnet-group", "id")
                    .attr("vpc_security_group_ids", vec![group])
                    .attr("publicly_accessible", false)
                    .attr("storage_encrypted", true),
            )
            .output("host", OutputExpr::attr("instance", "address"))
            .output("port", OutputExpr::attr("instance", "port"))
            .output("endpoint", OutputExpr::attr("instance", "endpoint"))
            .output("database_name", OutputExpr::value(database_name)))
    }
}
