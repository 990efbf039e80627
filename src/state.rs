//! Persisted apply state.
//!
//! `state.toml` records the apply order, every created resource id and the
//! module outputs, so `destroy` and `outputs` work without re-rendering.
//! Sensitive outputs and secret-bearing attributes never reach the file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use modgraph::{GraphSnapshot, ModuleGraph, Value};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "state.toml";

/// Placeholder stored instead of a sensitive output value
pub const REDACTED: &str = "(redacted)";

/// Resource attributes that carry secrets and are dropped before saving
const SECRET_ATTRIBUTES: &[&str] = &["master_password", "user_data", "private_key_pem"];

/// Apply state for one project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyState {
    pub project: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub graph: GraphSnapshot,
}

impl ApplyState {
    /// Capture the applied part of a graph, with secrets removed
    pub fn capture(graph: &ModuleGraph) -> Self {
        let mut snapshot = graph.snapshot();
        for applied in snapshot.modules.values_mut() {
            for output in applied.outputs.values_mut() {
                if output.sensitive {
                    output.value = Value::from(REDACTED);
                }
            }
            for resource in &mut applied.resources {
                resource.attributes.retain(|key, _| !SECRET_ATTRIBUTES.contains(&key.as_str()));
            }
        }
        Self {
            project: graph.project().to_string(),
            last_updated: Utc::now(),
            graph: snapshot,
        }
    }

    fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(STATE_FILE)
    }

    /// Load state from `state_dir`, or `None` when nothing was applied yet
    pub fn load(state_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(state_dir);

        if !path.exists() {
            log::debug!("State file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(Some(state))
    }

    /// Save state to `state_dir`
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create state directory: {}", state_dir.display()))?;

        let path = Self::path(state_dir);
        let content = toml::to_string_pretty(self).context("Failed to serialize state to TOML")?;
        write_private(&path, &content)?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Delete the state file; returns whether one existed
    pub fn remove(state_dir: &Path) -> Result<bool> {
        let path = Self::path(state_dir);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to remove state file: {}", path.display()))?;
        Ok(true)
    }

    /// Whether no module is recorded as applied
    pub fn is_empty(&self) -> bool {
        self.graph.order.is_empty()
    }
}

/// Where the SSH private key for `project` is written
pub fn key_path(state_dir: &Path, project: &str) -> PathBuf {
    state_dir.join(format!("{project}-key.pem"))
}

/// Write `content` readable by the owner only, replacing any previous file
pub fn write_private(path: &Path, content: &str) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write the private key with mode 0400 unless a key file already exists.
///
/// Returns `false` when the file was already there; it is never rewritten.
pub fn write_key_once(path: &Path, pem: &str) -> Result<bool> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o400);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            log::debug!("Key file already present: {}", path.display());
            return Ok(false);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to create key file: {}", path.display())),
    };
    file.write_all(pem.as_bytes())
        .with_context(|| format!("Failed to write key file: {}", path.display()))?;
    Ok(true)
}

/// Remove the key file if present
pub fn remove_key(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove key file: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::example;
    use crate::config::{CredentialsConfig, Secrets};
    use crate::modules::{self, COMPUTE, DATABASE};
    use modgraph::{MemoryProvider, NoProgress};
    use tempfile::TempDir;

    fn applied_graph() -> modules::StackGraph {
        let secrets = Secrets::from_lookup(&CredentialsConfig::default(), |name| {
            Some(format!("hunter2-{}", name.to_lowercase()))
        })
        .unwrap();
        let mut stack = modules::build_graph(&example(), &secrets).unwrap();
        let provider = MemoryProvider::new();
        stack
            .graph
            .plan()
            .unwrap()
            .execute(&mut stack.graph, &provider, &mut NoProgress)
            .unwrap();
        stack
    }

    #[test]
    fn test_load_missing_state() {
        let dir = TempDir::new().unwrap();
        assert!(ApplyState::load(dir.path()).unwrap().is_none());
        assert!(!ApplyState::remove(dir.path()).unwrap());
    }

    #[test]
    fn test_saved_state_has_no_secrets() {
        let dir = TempDir::new().unwrap();
        let stack = applied_graph();
        let state = ApplyState::capture(&stack.graph);
        state.save(dir.path()).unwrap();

        let content = fs::read_to_string(dir.path().join(STATE_FILE)).unwrap();
        assert!(!content.contains("hunter2"), "secret leaked into state");
        assert!(!content.contains("PRIVATE KEY"));

        let loaded = ApplyState::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.project, "shop");
        assert_eq!(loaded.graph.order.len(), 5);
        let key = &loaded.graph.modules[COMPUTE].outputs["private_key_pem"];
        assert!(key.sensitive);
        assert_eq!(key.value, Value::from(REDACTED));
    }

    #[test]
    fn test_restored_state_keeps_database_outputs() {
        let dir = TempDir::new().unwrap();
        let stack = applied_graph();
        let host: String = stack.graph.output(stack.database, "host").unwrap();
        ApplyState::capture(&stack.graph).save(dir.path()).unwrap();

        let loaded = ApplyState::load(dir.path()).unwrap().unwrap();
        let outputs = &loaded.graph.modules[DATABASE].outputs;
        assert_eq!(outputs["host"].value, Value::from(host));
        assert!(!outputs["host"].sensitive);
    }

    #[test]
    fn test_remove_state() {
        let dir = TempDir::new().unwrap();
        let stack = applied_graph();
        ApplyState::capture(&stack.graph).save(dir.path()).unwrap();
        assert!(ApplyState::remove(dir.path()).unwrap());
        assert!(ApplyState::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_key_written_once() {
        let dir = TempDir::new().unwrap();
        let path = key_path(dir.path(), "shop");
        assert!(path.ends_with("shop-key.pem"));

        assert!(write_key_once(&path, "first").unwrap());
        assert!(!write_key_once(&path, "second").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o400);
        }

        remove_key(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_write_private_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provider.json");
        write_private(&path, "{\"a\":1}").unwrap();
        write_private(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }
}
