//! Core types for resource declarations and apply results

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag carrying the project identifier on every managed resource
pub const PROJECT_TAG: &str = "Project";
/// Tag carrying the owning module name
pub const MODULE_TAG: &str = "Module";
/// Tag carrying the logical resource name (used for create de-duplication)
pub const NAME_TAG: &str = "Name";

/// Kind of a managed cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    InternetGateway,
    NatGateway,
    RouteTable,
    SecurityGroup,
    SecurityGroupRule,
    DbSubnetGroup,
    DatabaseInstance,
    LoadBalancer,
    TargetGroup,
    Listener,
    KeyPair,
    Instance,
    LaunchTemplate,
    AutoscalingGroup,
}

impl ResourceKind {
    /// Stable kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::InternetGateway => "internet-gateway",
            Self::NatGateway => "nat-gateway",
            Self::RouteTable => "route-table",
            Self::SecurityGroup => "security-group",
            Self::SecurityGroupRule => "security-group-rule",
            Self::DbSubnetGroup => "db-subnet-group",
            Self::DatabaseInstance => "database-instance",
            Self::LoadBalancer => "load-balancer",
            Self::TargetGroup => "target-group",
            Self::Listener => "listener",
            Self::KeyPair => "key-pair",
            Self::Instance => "instance",
            Self::LaunchTemplate => "launch-template",
            Self::AutoscalingGroup => "autoscaling-group",
        }
    }

    /// Short prefix used for generated identifiers
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Network => "vpc",
            Self::Subnet => "subnet",
            Self::InternetGateway => "igw",
            Self::NatGateway => "nat",
            Self::RouteTable => "rtb",
            Self::SecurityGroup => "sg",
            Self::SecurityGroupRule => "sgr",
            Self::DbSubnetGroup => "dbsg",
            Self::DatabaseInstance => "db",
            Self::LoadBalancer => "lb",
            Self::TargetGroup => "tg",
            Self::Listener => "lsn",
            Self::KeyPair => "key",
            Self::Instance => "i",
            Self::LaunchTemplate => "lt",
            Self::AutoscalingGroup => "asg",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource attribute as declared by a template
///
/// Attributes are either literal values or references to a generated
/// attribute of a resource declared earlier in the same module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attr {
    /// Literal value
    Value(Value),
    /// Generated attribute of an earlier sibling resource
    Resource { resource: String, attribute: String },
    /// List of attributes, resolved element-wise
    List(Vec<Attr>),
}

impl Attr {
    /// Reference a sibling resource's generated attribute
    pub fn reference(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Resource {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }
}

impl From<Value> for Attr {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

macro_rules! attr_from_literal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Attr {
                fn from(v: $ty) -> Self {
                    Self::Value(Value::from(v))
                }
            }
        )*
    };
}

attr_from_literal!(bool, i64, u16, u32, &str, String, &String, Vec<String>, Vec<&str>);

/// A resource the template wants to exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Logical name, unique within the module
    pub name: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Declared attributes
    pub attributes: BTreeMap<String, Attr>,
    /// Template-specific tags (project tags are added at apply time)
    pub tags: BTreeMap<String, String>,
}

impl ResourceDeclaration {
    /// Start a declaration
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Set an attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Attr>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set an attribute to a sibling resource's generated attribute
    pub fn reference(
        mut self,
        key: impl Into<String>,
        resource: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        self.attributes
            .insert(key.into(), Attr::reference(resource, attribute));
        self
    }

    /// Add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// A declaration with every attribute resolved, as handed to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub name: String,
    pub kind: ResourceKind,
    pub attributes: BTreeMap<String, Value>,
    pub tags: BTreeMap<String, String>,
}

/// A resource as reported by the provider after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    /// Provider-assigned identifier
    pub id: String,
    pub kind: ResourceKind,
    /// Logical name from the declaration
    pub name: String,
    /// Declared attributes merged with generated ones
    pub attributes: BTreeMap<String, Value>,
    pub tags: BTreeMap<String, String>,
}

impl CreatedResource {
    /// Look up an attribute; `id` is always available
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if name == "id" {
            return Some(Value::String(self.id.clone()));
        }
        self.attributes.get(name).cloned()
    }
}

/// A module output value as recorded after apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(default)]
    pub sensitive: bool,
}

impl OutputValue {
    /// Value for display, with sensitive outputs masked
    pub fn display(&self) -> String {
        if self.sensitive {
            "(sensitive)".to_string()
        } else {
            self.value.to_string()
        }
    }
}

/// Everything a module produced during its single apply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedModule {
    /// Output record
    pub outputs: BTreeMap<String, OutputValue>,
    /// Created resources, in creation order
    pub resources: Vec<CreatedResource>,
}

/// Summary of a plan execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Modules applied, in order
    pub applied: Vec<String>,
    /// Number of resources created (or adopted by de-duplication)
    pub resources: usize,
}

/// Summary of a destroy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestroyReport {
    /// Modules destroyed, in order
    pub destroyed: Vec<String>,
    /// Number of resources deleted
    pub resources: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_builder() {
        let decl = ResourceDeclaration::new(ResourceKind::Subnet, "public-0")
            .attr("cidr_block", "10.0.1.0/24")
            .reference("vpc_id", "vpc", "id")
            .tag("Tier", "public");

        assert_eq!(
            decl.attributes.get("cidr_block"),
            Some(&Attr::Value(Value::from("10.0.1.0/24")))
        );
        assert_eq!(
            decl.attributes.get("vpc_id"),
            Some(&Attr::reference("vpc", "id"))
        );
        assert_eq!(decl.tags.get("Tier").map(String::as_str), Some("public"));
    }

    #[test]
    fn test_created_resource_id_attribute() {
        let created = CreatedResource {
            id: "vpc-1".to_string(),
            kind: ResourceKind::Network,
            name: "vpc".to_string(),
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        assert_eq!(created.attribute("id"), Some(Value::from("vpc-1")));
        assert_eq!(created.attribute("missing"), None);
    }

    #[test]
    fn test_sensitive_output_display() {
        let out = OutputValue {
            value: Value::from("secret"),
            sensitive: true,
        };
        assert_eq!(out.display(), "(sensitive)");
    }

    #[test]
    fn test_kind_serde_name() {
        let json = serde_json::to_string(&ResourceKind::AutoscalingGroup).unwrap();
        assert_eq!(json, "\"autoscaling-group\"");
    }
}
