//! Module arena with typed output handles
//!
//! Modules live in an arena indexed by [`ModuleId`]. Downstream modules hold
//! [`OutputRef`] handles to upstream outputs rather than values; the handles
//! are resolved when the consumer is applied. Dependencies are declared by
//! name and resolved lazily, so a cycle is expressible and is reported by
//! [`ModuleGraph::resolve_order`] instead of being impossible to build.

use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::executor;
use crate::provider::Provider;
use crate::resource::{Inputs, Template};
use crate::types::{AppliedModule, DestroyReport, OutputValue};
use crate::value::{FromValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;

/// Opaque handle to a registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(usize);

impl ModuleId {
    /// Typed handle to one of this module's outputs
    pub fn output<T: FromValue>(self, name: impl Into<String>) -> OutputRef<T> {
        OutputRef {
            module: self,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Position in declaration order
    pub fn index(self) -> usize {
        self.0
    }
}

/// Typed reference to a module output that does not exist yet
pub struct OutputRef<T> {
    module: ModuleId,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OutputRef<T> {
    /// Producer module
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Output name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for OutputRef<T> {
    fn clone(&self) -> Self {
        Self {
            module: self.module,
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for OutputRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRef")
            .field("module", &self.module)
            .field("name", &self.name)
            .finish()
    }
}

/// How a module input gets its value
#[derive(Clone)]
pub enum Binding {
    /// Literal supplied from outside the graph
    Value(Value),
    /// Output of another module, type-checked on resolution
    Output {
        module: ModuleId,
        output: String,
        expected: &'static str,
        check: fn(&Value) -> bool,
    },
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Output {
                module,
                output,
                expected,
                ..
            } => f
                .debug_struct("Output")
                .field("module", module)
                .field("output", output)
                .field("expected", expected)
                .finish(),
        }
    }
}

fn type_check<T: FromValue>(value: &Value) -> bool {
    T::from_value(value).is_some()
}

/// Lifecycle of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    /// Registered, not yet applied
    Declared,
    /// Applied exactly once; outputs are immutable
    Applied(AppliedModule),
    /// Resources deleted
    Destroyed,
}

/// A registered module
#[derive(Debug)]
pub struct Module {
    name: String,
    template: Box<dyn Template>,
    dependencies: Vec<String>,
    bindings: BTreeMap<String, Binding>,
    state: ModuleState,
}

impl Module {
    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template category
    pub fn kind(&self) -> &'static str {
        self.template.kind()
    }

    /// Declared input names
    pub fn inputs(&self) -> &'static [&'static str] {
        self.template.inputs()
    }

    /// Declared dependency names
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Input bindings
    pub fn bindings(&self) -> &BTreeMap<String, Binding> {
        &self.bindings
    }

    /// Lifecycle state
    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    /// Applied record, if applied
    pub fn applied(&self) -> Option<&AppliedModule> {
        match &self.state {
            ModuleState::Applied(applied) => Some(applied),
            _ => None,
        }
    }
}

/// Persistable record of an applied graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Module names in the order they were applied
    pub order: Vec<String>,
    /// Applied records by module name
    pub modules: BTreeMap<String, AppliedModule>,
}

/// The module graph evaluator
#[derive(Debug)]
pub struct ModuleGraph {
    project: String,
    tags: BTreeMap<String, String>,
    modules: Vec<Module>,
    index: HashMap<String, ModuleId>,
    applied_order: Vec<ModuleId>,
}

impl ModuleGraph {
    /// Create an empty graph for a project
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            tags: BTreeMap::new(),
            modules: Vec::new(),
            index: HashMap::new(),
            applied_order: Vec::new(),
        }
    }

    /// Add a tag applied to every resource in the graph
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Project identifier
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Graph-wide tags
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Register a module. Input names come from the template.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        template: impl Template + 'static,
        dependencies: &[&str],
    ) -> Result<ModuleId> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateModule { module: name });
        }

        let id = ModuleId(self.modules.len());
        log::debug!("registered module {name} ({})", template.kind());
        self.modules.push(Module {
            name: name.clone(),
            template: Box::new(template),
            dependencies: dependencies.iter().map(|d| (*d).to_string()).collect(),
            bindings: BTreeMap::new(),
            state: ModuleState::Declared,
        });
        self.index.insert(name, id);
        Ok(id)
    }

    /// Bind an input to another module's output.
    ///
    /// The producer must be a declared dependency of the consumer.
    pub fn bind<T: FromValue>(
        &mut self,
        consumer: ModuleId,
        input: &str,
        source: OutputRef<T>,
    ) -> Result<()> {
        self.check_input(consumer, input)?;

        let producer = self.module(source.module).name.clone();
        let module = &self.modules[consumer.0];
        if !module.dependencies.iter().any(|d| *d == producer) {
            return Err(Error::UndeclaredDependency {
                module: module.name.clone(),
                input: input.to_string(),
                source_module: producer,
            });
        }

        self.modules[consumer.0].bindings.insert(
            input.to_string(),
            Binding::Output {
                module: source.module,
                output: source.name,
                expected: T::TYPE_NAME,
                check: type_check::<T>,
            },
        );
        Ok(())
    }

    /// Bind an input to a literal value
    pub fn bind_value(&mut self, consumer: ModuleId, input: &str, value: impl Into<Value>) -> Result<()> {
        self.check_input(consumer, input)?;
        self.modules[consumer.0]
            .bindings
            .insert(input.to_string(), Binding::Value(value.into()));
        Ok(())
    }

    fn check_input(&self, consumer: ModuleId, input: &str) -> Result<()> {
        let module = self.module(consumer);
        if !module.inputs().contains(&input) {
            return Err(Error::UnknownInput {
                module: module.name.clone(),
                input: input.to_string(),
            });
        }
        Ok(())
    }

    /// Look up a module id by name
    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.index.get(name).copied()
    }

    /// Borrow a module
    ///
    /// Ids are only minted by [`ModuleGraph::register`], so they always index
    /// into this graph's arena.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    /// All modules in declaration order
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate().map(|(i, m)| (ModuleId(i), m))
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are registered
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Outputs of an applied module
    pub fn outputs(&self, id: ModuleId) -> Option<&BTreeMap<String, OutputValue>> {
        self.module(id).applied().map(|a| &a.outputs)
    }

    /// Typed output of an applied module
    pub fn output<T: FromValue>(&self, id: ModuleId, name: &str) -> Result<T> {
        let module = self.module(id);
        let applied = module.applied().ok_or_else(|| Error::NotApplied {
            module: module.name.clone(),
        })?;
        let out = applied.outputs.get(name).ok_or_else(|| Error::MissingOutput {
            module: module.name.clone(),
            output: name.to_string(),
        })?;
        T::from_value(&out.value).ok_or_else(|| Error::TypeMismatch {
            module: module.name.clone(),
            input: name.to_string(),
            expected: T::TYPE_NAME,
            found: out.value.type_name().to_string(),
        })
    }

    /// Modules in the order of the last successful applies
    pub fn applied_order(&self) -> &[ModuleId] {
        &self.applied_order
    }

    /// Direct predecessors of each module (dependencies plus binding sources)
    fn predecessors(&self) -> Result<Vec<BTreeSet<usize>>> {
        let mut preds = vec![BTreeSet::new(); self.modules.len()];
        for (i, module) in self.modules.iter().enumerate() {
            for dep in &module.dependencies {
                let dep_id = self.index.get(dep).ok_or_else(|| Error::UnknownModule {
                    module: module.name.clone(),
                    dependency: dep.clone(),
                })?;
                preds[i].insert(dep_id.0);
            }
            for binding in module.bindings.values() {
                if let Binding::Output { module: source, .. } = binding {
                    preds[i].insert(source.0);
                }
            }
        }
        Ok(preds)
    }

    /// Resolve a deterministic apply order (Kahn's algorithm).
    ///
    /// Among modules whose dependencies are all satisfied, the one declared
    /// first goes first.
    pub fn resolve_order(&self) -> Result<Vec<ModuleId>> {
        let preds = self.predecessors()?;
        let mut in_degree: Vec<usize> = preds.iter().map(BTreeSet::len).collect();
        let mut successors = vec![Vec::new(); self.modules.len()];
        for (i, p) in preds.iter().enumerate() {
            for &from in p {
                successors[from].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, d)| *d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.modules.len());

        while let Some(next) = ready.pop_first() {
            order.push(ModuleId(next));
            for &succ in &successors[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        if order.len() < self.modules.len() {
            let modules = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, d)| *d > 0)
                .map(|(i, _)| self.modules[i].name.clone())
                .collect();
            return Err(Error::CyclicDependency { modules });
        }

        Ok(order)
    }

    /// Resolve every declared input of a module to a value
    fn resolve_inputs(&self, id: ModuleId) -> Result<Inputs> {
        let module = self.module(id);
        let mut values = BTreeMap::new();

        for &input in module.inputs() {
            let unresolved = || Error::UnresolvedInput {
                module: module.name.clone(),
                input: input.to_string(),
            };

            let value = match module.bindings.get(input).ok_or_else(unresolved)? {
                Binding::Value(v) => v.clone(),
                Binding::Output {
                    module: source,
                    output,
                    expected,
                    check,
                } => {
                    let producer = self.module(*source);
                    let out = producer
                        .applied()
                        .and_then(|a| a.outputs.get(output))
                        .ok_or_else(unresolved)?;
                    if !check(&out.value) {
                        return Err(Error::TypeMismatch {
                            module: module.name.clone(),
                            input: input.to_string(),
                            expected,
                            found: out.value.type_name().to_string(),
                        });
                    }
                    out.value.clone()
                }
            };
            values.insert(input.to_string(), value);
        }

        Ok(Inputs::new(module.name.clone(), values))
    }

    /// Check that every declared input has a binding, without resolving values
    pub(crate) fn check_bindings(&self, id: ModuleId) -> Result<()> {
        let module = self.module(id);
        for &input in module.inputs() {
            if !module.bindings.contains_key(input) {
                return Err(Error::UnresolvedInput {
                    module: module.name.clone(),
                    input: input.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Apply one module: resolve inputs, render, create resources, record outputs.
    ///
    /// A module's outputs are written exactly once; a second apply is rejected.
    pub fn apply(
        &mut self,
        id: ModuleId,
        provider: &dyn Provider,
        progress: &mut dyn ProgressCallback,
    ) -> Result<()> {
        let module = self.module(id);
        if matches!(module.state, ModuleState::Applied(_)) {
            return Err(Error::AlreadyApplied {
                module: module.name.clone(),
            });
        }

        let inputs = self.resolve_inputs(id)?;
        let rendered = module.template.render(&inputs)?;
        let applied = executor::apply_module(
            &self.project,
            &self.tags,
            &module.name,
            module.kind(),
            rendered,
            provider,
            progress,
        )?;

        self.modules[id.0].state = ModuleState::Applied(applied);
        self.applied_order.push(id);
        Ok(())
    }

    /// Destroy every applied module in the exact reverse of the apply order
    pub fn destroy(
        &mut self,
        provider: &dyn Provider,
        progress: &mut dyn ProgressCallback,
    ) -> Result<DestroyReport> {
        let mut report = DestroyReport::default();

        while let Some(&id) = self.applied_order.last() {
            let module = &self.modules[id.0];
            if let ModuleState::Applied(applied) = &module.state {
                report.resources += executor::destroy_module(&module.name, applied, provider, progress)?;
            }
            report.destroyed.push(module.name.clone());
            self.modules[id.0].state = ModuleState::Destroyed;
            self.applied_order.pop();
        }

        Ok(report)
    }

    /// Capture the applied state of the graph
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut snapshot = GraphSnapshot::default();
        for &id in &self.applied_order {
            let module = self.module(id);
            if let Some(applied) = module.applied() {
                snapshot.order.push(module.name.clone());
                snapshot.modules.insert(module.name.clone(), applied.clone());
            }
        }
        snapshot
    }

    /// Restore applied state captured by [`ModuleGraph::snapshot`]
    pub fn restore(&mut self, snapshot: GraphSnapshot) -> Result<()> {
        let GraphSnapshot { order, mut modules } = snapshot;
        for name in order {
            let id = self.module_id(&name).ok_or_else(|| Error::UnknownModule {
                module: self.project.clone(),
                dependency: name.clone(),
            })?;
            let applied = modules.remove(&name).ok_or_else(|| Error::NotApplied {
                module: name.clone(),
            })?;
            if matches!(self.modules[id.0].state, ModuleState::Applied(_)) {
                return Err(Error::AlreadyApplied { module: name });
            }
            self.modules[id.0].state = ModuleState::Applied(applied);
            self.applied_order.push(id);
        }
        Ok(())
    }
}
