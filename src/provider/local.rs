//! In-process provider persisted to `provider.json`.
//!
//! Useful for rehearsing a stack without a provisioning API: resources get
//! generated ids and attributes, and survive between runs.

use anyhow::{Context, Result};
use modgraph::{CreatedResource, MemoryProvider, MemorySnapshot, Provider, ResolvedResource, TagFilter};
use std::fs;
use std::path::{Path, PathBuf};

pub const PROVIDER_FILE: &str = "provider.json";

#[derive(Debug)]
pub struct LocalProvider {
    inner: MemoryProvider,
    path: PathBuf,
}

impl LocalProvider {
    /// Open the provider stored in `state_dir`, or start empty
    pub fn open(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(PROVIDER_FILE);
        let inner = if path.exists() {
            let content =
                fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let snapshot: MemorySnapshot = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            log::debug!("Loaded {} local resources from {}", snapshot.resources.len(), path.display());
            MemoryProvider::from_snapshot(snapshot)
        } else {
            MemoryProvider::new()
        };
        Ok(Self { inner, path })
    }

    /// Write the current resources back to disk
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.inner.snapshot())?;
        crate::state::write_private(&self.path, &content)?;
        log::debug!("Saved local provider to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Provider for LocalProvider {
    fn create(&self, resource: &ResolvedResource) -> modgraph::Result<CreatedResource> {
        self.inner.create(resource)
    }

    fn query(&self, filter: &TagFilter) -> modgraph::Result<Vec<CreatedResource>> {
        self.inner.query(filter)
    }

    fn delete(&self, id: &str) -> modgraph::Result<()> {
        self.inner.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgraph::{NAME_TAG, ResourceKind};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn vpc() -> ResolvedResource {
        ResolvedResource {
            name: "vpc".to_string(),
            kind: ResourceKind::Network,
            attributes: BTreeMap::new(),
            tags: BTreeMap::from([(NAME_TAG.to_string(), "shop-networking-vpc".to_string())]),
        }
    }

    #[test]
    fn test_resources_survive_reopen() {
        let dir = TempDir::new().unwrap();

        let provider = LocalProvider::open(dir.path()).unwrap();
        let created = provider.create(&vpc()).unwrap();
        provider.save().unwrap();

        let reopened = LocalProvider::open(dir.path()).unwrap();
        let again = reopened.create(&vpc()).unwrap();
        assert_eq!(created.id, again.id);
        assert_eq!(reopened.query(&TagFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_open_empty_dir() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::open(&dir.path().join("missing")).unwrap();
        assert!(provider.query(&TagFilter::default()).unwrap().is_empty());
        assert!(provider.path().ends_with(PROVIDER_FILE));
    }
}
