//! Container runtime abstraction.
//!
//! The [`ContainerRuntime`] trait defines what the reconciler needs from a
//! node, allowing for different implementations (docker CLI, mock for
//! testing).
//!
//! # Testing
//!
//! Use [`MockRuntime`] to drive the reconciler without a real node:
//!
//! ```
//! use nodeboot::backend::{ContainerRuntime, MockFailure, MockRuntime, RuntimeOp};
//!
//! let runtime = MockRuntime::new();
//! runtime.fail_times(RuntimeOp::Pull, 2, MockFailure::Transient);
//!
//! assert!(runtime.pull("ghcr.io/acme/api:1").is_err());
//! assert!(runtime.pull("ghcr.io/acme/api:1").is_err());
//! assert!(runtime.pull("ghcr.io/acme/api:1").is_ok());
//! ```

pub mod docker;

use crate::error::{Error, Result};
use crate::payload::{BootstrapPayload, RegistryCredentials};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operations a node performs against its container runtime.
pub trait ContainerRuntime: Send + Sync {
    /// Whether the runtime is installed and answering.
    fn is_installed(&self) -> Result<bool>;

    /// Install and start the runtime.
    fn install(&self) -> Result<()>;

    /// Log in to the registry. The token goes over stdin, never argv.
    fn login(&self, credentials: &RegistryCredentials) -> Result<()>;

    /// Pull an image.
    fn pull(&self, image: &str) -> Result<()>;

    /// Remove a container by name. Returns whether one existed.
    fn remove_container(&self, name: &str) -> Result<bool>;

    /// Start the payload's container. Returns the container id.
    fn run_container(&self, payload: &BootstrapPayload) -> Result<String>;
}

/// Runtime operation, for scripting mock failures and inspecting calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    Install,
    Login,
    Pull,
    Remove,
    Run,
}

impl fmt::Display for RuntimeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "install",
            Self::Login => "login",
            Self::Pull => "pull",
            Self::Remove => "remove",
            Self::Run => "run",
        })
    }
}

/// Kind of scripted failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Network error, retryable
    Transient,
    /// Registry rejects the login
    Auth,
    /// Runtime error, not retryable
    Fatal,
}

impl MockFailure {
    fn into_error(self, op: RuntimeOp) -> Error {
        match self {
            Self::Transient => Error::Network {
                step: op.to_string(),
                message: "connection timed out".to_string(),
            },
            Self::Auth => Error::Auth {
                message: "unauthorized".to_string(),
            },
            Self::Fatal => Error::Runtime {
                step: op.to_string(),
                stderr: "scripted failure".to_string(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    installed: bool,
    /// Running containers: name -> (id, image)
    containers: BTreeMap<String, (String, String)>,
    failures: VecDeque<(RuntimeOp, MockFailure)>,
    calls: Vec<RuntimeOp>,
    run_count: u32,
    last_environment: Vec<String>,
}

/// Mock runtime for testing without a container engine.
///
/// Clones share state, so a test can keep a handle while the reconciler
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    /// Fresh node: nothing installed, no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Node with the runtime already installed.
    #[must_use]
    pub fn installed() -> Self {
        let mock = Self::new();
        mock.lock().installed = true;
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_times(&self, op: RuntimeOp, times: usize, failure: MockFailure) {
        let mut state = self.lock();
        for _ in 0..times {
            state.failures.push_back((op, failure));
        }
    }

    /// Every operation called, in order.
    pub fn calls(&self) -> Vec<RuntimeOp> {
        self.lock().calls.clone()
    }

    /// How many times `op` was called.
    pub fn count(&self, op: RuntimeOp) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Running container names.
    pub fn containers(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    /// Environment keys passed to the last run.
    pub fn last_environment(&self) -> Vec<String> {
        self.lock().last_environment.clone()
    }

    fn begin(&self, op: RuntimeOp) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.calls.push(op);
        let scripted = state.failures.iter().position(|(o, _)| *o == op);
        if let Some((_, failure)) = scripted.and_then(|pos| state.failures.remove(pos)) {
            return Err(failure.into_error(op));
        }
        Ok(state)
    }
}

impl ContainerRuntime for MockRuntime {
    fn is_installed(&self) -> Result<bool> {
        Ok(self.lock().installed)
    }

    fn install(&self) -> Result<()> {
        self.begin(RuntimeOp::Install)?.installed = true;
        Ok(())
    }

    fn login(&self, credentials: &RegistryCredentials) -> Result<()> {
        let state = self.begin(RuntimeOp::Login)?;
        if !state.installed {
            return Err(Error::Runtime {
                step: RuntimeOp::Login.to_string(),
                stderr: "docker: command not found".to_string(),
            });
        }
        if credentials.token.is_empty() {
            return Err(Error::Auth {
                message: "empty token".to_string(),
            });
        }
        Ok(())
    }

    fn pull(&self, _image: &str) -> Result<()> {
        self.begin(RuntimeOp::Pull)?;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<bool> {
        Ok(self.begin(RuntimeOp::Remove)?.containers.remove(name).is_some())
    }

    fn run_container(&self, payload: &BootstrapPayload) -> Result<String> {
        let mut state = self.begin(RuntimeOp::Run)?;
        if state.containers.contains_key(&payload.container_name) {
            return Err(Error::Runtime {
                step: RuntimeOp::Run.to_string(),
                stderr: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    payload.container_name
                ),
            });
        }
        state.run_count += 1;
        let id = format!("{:012x}", state.run_count);
        state.last_environment = payload.environment.keys().cloned().collect();
        state
            .containers
            .insert(payload.container_name.clone(), (id.clone(), payload.image.clone()));
        Ok(id)
    }
}
