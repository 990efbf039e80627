//! # Modgraph
//!
//! A module graph evaluator for infrastructure provisioning.
//!
//! Modules are registered with a template and the names of the modules they
//! depend on. Inputs are bound either to literal values or to typed handles
//! on upstream outputs. The graph resolves a deterministic apply order,
//! applies each module exactly once through a [`Provider`], and destroys in
//! the reverse of the order it applied.
//!
//! ## Core Concepts
//!
//! - **Template**: Pure function from inputs to resource declarations and outputs
//! - **ModuleGraph**: Arena of modules addressed by [`ModuleId`]
//! - **OutputRef**: Typed handle to an output that does not exist yet
//! - **Plan**: Frozen apply order, consumed by execution
//! - **Provider**: Boundary that creates, queries and deletes tagged resources
//!
//! ## Example
//!
//! ```
//! use modgraph::{
//!     Inputs, MemoryProvider, ModuleGraph, NoProgress, OutputExpr, Rendered,
//!     ResourceDeclaration, ResourceKind, Result, Template,
//! };
//!
//! #[derive(Debug)]
//! struct Vpc;
//!
//! impl Template for Vpc {
//!     fn kind(&self) -> &'static str { "networking" }
//!     fn inputs(&self) -> &'static [&'static str] { &["cidr"] }
//!     fn render(&self, inputs: &Inputs) -> Result<Rendered> {
//!         let cidr: String = inputs.get("cidr")?;
//!         Ok(Rendered::new()
//!             .resource(ResourceDeclaration::new(ResourceKind::Network, "vpc").attr("cidr_block", cidr))
//!             .output("vpc_id", OutputExpr::attr("vpc", "id")))
//!     }
//! }
//!
//! let mut graph = ModuleGraph::new("shop");
//! let net = graph.register("networking", Vpc, &[])?;
//! graph.bind_value(net, "cidr", "10.0.0.0/16")?;
//!
//! let provider = MemoryProvider::new();
//! let report = graph.plan()?.execute(&mut graph, &provider, &mut NoProgress)?;
//! assert_eq!(report.applied, vec!["networking"]);
//!
//! let vpc_id: String = graph.output(net, "vpc_id")?;
//! assert!(vpc_id.starts_with("vpc-"));
//! # Ok::<(), modgraph::Error>(())
//! ```

pub mod context;
pub mod error;
mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use context::{NoProgress, ProgressCallback};
pub use error::{Error, ErrorCategory, Result};
pub use graph::{Binding, GraphSnapshot, Module, ModuleGraph, ModuleId, ModuleState, OutputRef};
pub use planner::{Plan, PlanStep, PlannedInput};
pub use provider::{MemoryProvider, MemorySnapshot, Provider, TagFilter};
pub use resource::{Inputs, OutputDecl, OutputExpr, Rendered, Template};
pub use types::{
    AppliedModule, ApplyReport, Attr, CreatedResource, DestroyReport, MODULE_TAG, NAME_TAG,
    OutputValue, PROJECT_TAG, ResolvedResource, ResourceDeclaration, ResourceKind,
};
pub use value::{FromValue, Value};
