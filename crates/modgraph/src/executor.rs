//! Execution engine - creates a module's resources and evaluates its outputs
//!
//! Resources are created sequentially in declaration order. Attribute
//! references may only point at resources declared earlier in the same
//! module; outputs are evaluated after every resource exists.

use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::resource::{OutputExpr, Rendered};
use crate::types::{
    AppliedModule, Attr, CreatedResource, MODULE_TAG, NAME_TAG, OutputValue, PROJECT_TAG,
    ResolvedResource,
};
use crate::value::Value;
use std::collections::BTreeMap;

/// Create every resource of a rendered module and record its outputs
pub(crate) fn apply_module(
    project: &str,
    graph_tags: &BTreeMap<String, String>,
    module: &str,
    kind: &str,
    rendered: Rendered,
    provider: &dyn Provider,
    progress: &mut dyn ProgressCallback,
) -> Result<AppliedModule> {
    progress.on_module_start(module, kind, rendered.resources.len());

    let mut created: Vec<CreatedResource> = Vec::with_capacity(rendered.resources.len());
    for declaration in rendered.resources {
        let mut attributes = BTreeMap::new();
        for (key, attr) in declaration.attributes {
            let value = resolve_attr(module, &created, &attr)?;
            attributes.insert(key, value);
        }

        let mut tags = graph_tags.clone();
        tags.extend(declaration.tags);
        tags.insert(PROJECT_TAG.to_string(), project.to_string());
        tags.insert(MODULE_TAG.to_string(), module.to_string());
        tags.insert(
            NAME_TAG.to_string(),
            format!("{project}-{module}-{}", declaration.name),
        );

        let resolved = ResolvedResource {
            name: declaration.name,
            kind: declaration.kind,
            attributes,
            tags,
        };

        let resource = provider.create(&resolved).inspect_err(|e| {
            log::warn!(
                "{module}: creating {} {} failed after {} resources: {e}",
                resolved.kind,
                resolved.name,
                created.len()
            );
        })?;
        progress.on_resource(module, &resource);
        created.push(resource);
    }

    let mut outputs = BTreeMap::new();
    for decl in rendered.outputs {
        let value = eval_output(module, &created, &decl.expr)?;
        outputs.insert(
            decl.name,
            OutputValue {
                value,
                sensitive: decl.sensitive,
            },
        );
    }

    progress.on_module_complete(module);
    Ok(AppliedModule {
        outputs,
        resources: created,
    })
}

/// Delete a module's resources in reverse creation order
pub(crate) fn destroy_module(
    module: &str,
    applied: &AppliedModule,
    provider: &dyn Provider,
    progress: &mut dyn ProgressCallback,
) -> Result<usize> {
    for resource in applied.resources.iter().rev() {
        provider.delete(&resource.id)?;
        progress.on_resource_deleted(module, resource);
    }
    progress.on_module_complete(module);
    Ok(applied.resources.len())
}

fn lookup(module: &str, created: &[CreatedResource], resource: &str, attribute: &str) -> Result<Value> {
    created
        .iter()
        .find(|r| r.name == resource)
        .and_then(|r| r.attribute(attribute))
        .ok_or_else(|| Error::UnknownResourceReference {
            module: module.to_string(),
            resource: resource.to_string(),
            attribute: attribute.to_string(),
        })
}

fn resolve_attr(module: &str, created: &[CreatedResource], attr: &Attr) -> Result<Value> {
    match attr {
        Attr::Value(v) => Ok(v.clone()),
        Attr::Resource {
            resource,
            attribute,
        } => lookup(module, created, resource, attribute),
        Attr::List(items) => items
            .iter()
            .map(|item| resolve_attr(module, created, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
    }
}

fn eval_output(module: &str, created: &[CreatedResource], expr: &OutputExpr) -> Result<Value> {
    match expr {
        OutputExpr::Value(v) => Ok(v.clone()),
        OutputExpr::Attribute {
            resource,
            attribute,
        } => lookup(module, created, resource, attribute),
        OutputExpr::List(items) => items
            .iter()
            .map(|item| eval_output(module, created, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
    }
}
