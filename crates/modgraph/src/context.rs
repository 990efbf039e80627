//! Progress reporting during apply and destroy
//!
//! The graph reports through this trait so it can be used without a hard
//! dependency on any particular terminal UI.

use crate::types::CreatedResource;

/// Progress callback for graph execution
pub trait ProgressCallback {
    /// Called before a module starts applying
    fn on_module_start(&mut self, module: &str, kind: &str, resources: usize);

    /// Called after each resource is created (or adopted)
    fn on_resource(&mut self, module: &str, resource: &CreatedResource);

    /// Called after each resource is deleted
    fn on_resource_deleted(&mut self, module: &str, resource: &CreatedResource);

    /// Called when a module finishes applying or destroying
    fn on_module_complete(&mut self, module: &str);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_module_start(&mut self, _module: &str, _kind: &str, _resources: usize) {}
    fn on_resource(&mut self, _module: &str, _resource: &CreatedResource) {}
    fn on_resource_deleted(&mut self, _module: &str, _resource: &CreatedResource) {}
    fn on_module_complete(&mut self, _module: &str) {}
}
