//! Template trait for provisioning modules
//!
//! A template is a pure function from resolved inputs to a set of resource
//! declarations plus output expressions. Outputs that depend on
//! provider-generated attributes are expressed as references and evaluated
//! once the resources exist.

use crate::error::{Error, Result};
use crate::types::ResourceDeclaration;
use crate::value::{FromValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Core trait for provisioning module templates
///
/// # Example
///
/// ```
/// use modgraph::{Inputs, OutputExpr, Rendered, ResourceDeclaration, ResourceKind, Result, Template};
///
/// #[derive(Debug)]
/// struct Vpc;
///
/// impl Template for Vpc {
///     fn kind(&self) -> &'static str {
///         "vpc"
///     }
///
///     fn inputs(&self) -> &'static [&'static str] {
///         &["cidr"]
///     }
///
///     fn render(&self, inputs: &Inputs) -> Result<Rendered> {
///         let cidr: String = inputs.get("cidr")?;
///         Ok(Rendered::new()
///             .resource(ResourceDeclaration::new(ResourceKind::Network, "vpc").attr("cidr_block", cidr))
///             .output("vpc_id", OutputExpr::attr("vpc", "id")))
///     }
/// }
/// ```
pub trait Template: fmt::Debug {
    /// Template category, e.g. "networking"
    fn kind(&self) -> &'static str;

    /// Names of the inputs this template consumes
    fn inputs(&self) -> &'static [&'static str];

    /// Render resource declarations and output expressions
    fn render(&self, inputs: &Inputs) -> Result<Rendered>;
}

/// Resolved input values handed to [`Template::render`]
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    module: String,
    values: BTreeMap<String, Value>,
}

impl Inputs {
    /// Create an input set for a module
    pub fn new(module: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            module: module.into(),
            values,
        }
    }

    /// Name of the module being rendered
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Get a typed input
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.values.get(name).ok_or_else(|| Error::UnresolvedInput {
            module: self.module.clone(),
            input: name.to_string(),
        })?;

        T::from_value(value).ok_or_else(|| Error::TypeMismatch {
            module: self.module.clone(),
            input: name.to_string(),
            expected: T::TYPE_NAME,
            found: value.type_name().to_string(),
        })
    }

    /// Get a typed input, or `None` if it was not bound
    pub fn get_opt<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        if self.values.contains_key(name) {
            self.get(name).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Expression for a module output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputExpr {
    /// Literal value known at render time
    Value(Value),
    /// Generated attribute of a resource in this module
    Attribute { resource: String, attribute: String },
    /// List of expressions
    List(Vec<OutputExpr>),
}

impl OutputExpr {
    /// Reference a resource attribute
    pub fn attr(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Attribute {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// Literal value
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

/// A named output declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDecl {
    pub name: String,
    pub expr: OutputExpr,
    pub sensitive: bool,
}

/// Output of [`Template::render`]
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    /// Resources in creation order
    pub resources: Vec<ResourceDeclaration>,
    /// Output declarations
    pub outputs: Vec<OutputDecl>,
}

impl Rendered {
    /// Empty render result
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource declaration
    pub fn resource(mut self, declaration: ResourceDeclaration) -> Self {
        self.resources.push(declaration);
        self
    }

    /// Append several resource declarations
    pub fn resources(mut self, declarations: impl IntoIterator<Item = ResourceDeclaration>) -> Self {
        self.resources.extend(declarations);
        self
    }

    /// Declare an output
    pub fn output(mut self, name: impl Into<String>, expr: OutputExpr) -> Self {
        self.outputs.push(OutputDecl {
            name: name.into(),
            expr,
            sensitive: false,
        });
        self
    }

    /// Declare an output that must not be displayed or persisted in clear
    pub fn sensitive_output(mut self, name: impl Into<String>, expr: OutputExpr) -> Self {
        self.outputs.push(OutputDecl {
            name: name.into(),
            expr,
            sensitive: true,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Inputs {
        let mut values = BTreeMap::new();
        values.insert("port".to_string(), Value::Int(5432));
        values.insert("host".to_string(), Value::from("db.internal"));
        Inputs::new("database", values)
    }

    #[test]
    fn test_get_typed_input() {
        let inputs = inputs();
        assert_eq!(inputs.get::<u16>("port").unwrap(), 5432);
        assert_eq!(inputs.get::<String>("host").unwrap(), "db.internal");
    }

    #[test]
    fn test_missing_input_is_unresolved() {
        let err = inputs().get::<String>("user").unwrap_err();
        assert!(matches!(err, Error::UnresolvedInput { ref input, .. } if input == "user"));
    }

    #[test]
    fn test_wrong_type_is_mismatch() {
        let err = inputs().get::<String>("port").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: "string", .. }));
    }

    #[test]
    fn test_optional_input() {
        let inputs = inputs();
        assert_eq!(inputs.get_opt::<String>("user").unwrap(), None);
        assert_eq!(inputs.get_opt::<u16>("port").unwrap(), Some(5432));
    }

    #[test]
    fn test_sensitive_output_flag() {
        let rendered = Rendered::new()
            .output("host", OutputExpr::value("h"))
            .sensitive_output("password", OutputExpr::value("p"));
        assert!(!rendered.outputs[0].sensitive);
        assert!(rendered.outputs[1].sensitive);
    }
}
