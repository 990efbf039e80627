//! Execution planner - freezes an apply order before anything is created

use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::graph::{Binding, ModuleGraph, ModuleId};
use crate::provider::Provider;
use crate::types::ApplyReport;
use serde::Serialize;

/// Where a planned module input comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PlannedInput {
    /// Literal value
    Literal { input: String },
    /// Output of an upstream module
    Output {
        input: String,
        module: String,
        output: String,
    },
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    #[serde(skip)]
    pub id: ModuleId,
    pub module: String,
    pub kind: String,
    pub dependencies: Vec<String>,
    pub inputs: Vec<PlannedInput>,
}

/// An ordered, validated apply plan
///
/// A plan is produced by [`Plan::build`] and consumed by [`Plan::execute`],
/// so the same plan cannot be executed twice.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    project: String,
    steps: Vec<PlanStep>,
}

impl Plan {
    /// Resolve the order and check every input is bound.
    ///
    /// Modules that are already applied are left out of the plan.
    pub fn build(graph: &ModuleGraph) -> Result<Self> {
        let order = graph.resolve_order()?;
        let mut steps = Vec::with_capacity(order.len());

        for id in order {
            let module = graph.module(id);
            if module.applied().is_some() {
                continue;
            }
            graph.check_bindings(id)?;

            let inputs = module
                .bindings()
                .iter()
                .map(|(input, binding)| match binding {
                    Binding::Value(_) => PlannedInput::Literal {
                        input: input.clone(),
                    },
                    Binding::Output { module, output, .. } => PlannedInput::Output {
                        input: input.clone(),
                        module: graph.module(*module).name().to_string(),
                        output: output.clone(),
                    },
                })
                .collect();

            steps.push(PlanStep {
                id,
                module: module.name().to_string(),
                kind: module.kind().to_string(),
                dependencies: module.dependencies().to_vec(),
                inputs,
            });
        }

        Ok(Self {
            project: graph.project().to_string(),
            steps,
        })
    }

    /// Project the plan was built for
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Steps in apply order
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Module names in apply order
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.module.as_str()).collect()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of modules to apply
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Apply every step in order, stopping at the first failure
    pub fn execute(
        self,
        graph: &mut ModuleGraph,
        provider: &dyn Provider,
        progress: &mut dyn ProgressCallback,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        for step in self.steps {
            if graph.module_id(&step.module) != Some(step.id) {
                return Err(Error::UnknownModule {
                    module: self.project.clone(),
                    dependency: step.module,
                });
            }

            graph.apply(step.id, provider, progress)?;
            if let Some(applied) = graph.module(step.id).applied() {
                report.resources += applied.resources.len();
            }
            report.applied.push(step.module);
        }

        Ok(report)
    }
}

impl ModuleGraph {
    /// Build an apply plan for the modules not yet applied
    pub fn plan(&self) -> Result<Plan> {
        Plan::build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::provider::MemoryProvider;
    use crate::resource::{Inputs, OutputExpr, Rendered, Template};
    use crate::types::{ResourceDeclaration, ResourceKind};

    #[derive(Debug)]
    struct Single(&'static [&'static str]);

    impl Template for Single {
        fn kind(&self) -> &'static str {
            "single"
        }

        fn inputs(&self) -> &'static [&'static str] {
            self.0
        }

        fn render(&self, _inputs: &Inputs) -> Result<Rendered> {
            Ok(Rendered::new()
                .resource(ResourceDeclaration::new(ResourceKind::Network, "net"))
                .output("id", OutputExpr::attr("net", "id")))
        }
    }

    fn graph() -> ModuleGraph {
        let mut graph = ModuleGraph::new("shop");
        let net = graph.register("networking", Single(&[]), &[]).unwrap();
        let db = graph.register("database", Single(&["vpc_id", "name"]), &["networking"]).unwrap();
        graph.bind(db, "vpc_id", net.output::<String>("id")).unwrap();
        graph.bind_value(db, "name", "orders").unwrap();
        graph
    }

    #[test]
    fn test_plan_lists_inputs() {
        let plan = graph().plan().unwrap();
        assert_eq!(plan.order(), vec!["networking", "database"]);
        assert_eq!(
            plan.steps()[1].inputs,
            vec![
                PlannedInput::Literal {
                    input: "name".to_string()
                },
                PlannedInput::Output {
                    input: "vpc_id".to_string(),
                    module: "networking".to_string(),
                    output: "id".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_plan_rejects_unbound_input() {
        let mut graph = ModuleGraph::new("shop");
        graph.register("database", Single(&["vpc_id"]), &[]).unwrap();
        assert!(matches!(
            graph.plan().unwrap_err(),
            Error::UnresolvedInput { .. }
        ));
    }

    #[test]
    fn test_execute_applies_in_order() {
        let mut graph = graph();
        let provider = MemoryProvider::new();
        let plan = graph.plan().unwrap();
        let report = plan.execute(&mut graph, &provider, &mut NoProgress).unwrap();

        assert_eq!(report.applied, vec!["networking", "database"]);
        assert_eq!(report.resources, 2);
        assert!(graph.plan().unwrap().is_empty());
    }

    #[test]
    fn test_stale_plan_hits_already_applied() {
        let mut graph = graph();
        let provider = MemoryProvider::new();
        let first = graph.plan().unwrap();
        let second = first.clone();
        first.execute(&mut graph, &provider, &mut NoProgress).unwrap();

        let err = second.execute(&mut graph, &provider, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::AlreadyApplied { .. }));
    }
}
