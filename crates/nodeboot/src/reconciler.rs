//! Node bootstrap state machine
//!
//! ```text
//! Init -> RuntimeInstalling -> RuntimeReady -> Authenticating -> ImagePulling -> ContainerRunning
//!                 \________________________________\___________________\________> Failed
//! ```
//!
//! Installation and image pulls are retried under the [`RetryPolicy`];
//! every other step gets one attempt. The first unrecoverable error ends the
//! run in `Failed` and nothing else is attempted. Recovering a failed node is
//! the job of whatever replaces it.

use crate::backend::ContainerRuntime;
use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::payload::BootstrapPayload;
use crate::retry::{RetryCallback, RetryPolicy, with_retry_if};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

/// Bootstrap progress of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeState {
    Init,
    RuntimeInstalling,
    RuntimeReady,
    Authenticating,
    ImagePulling,
    ContainerRunning,
    Failed,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::RuntimeInstalling => "runtime-installing",
            Self::RuntimeReady => "runtime-ready",
            Self::Authenticating => "authenticating",
            Self::ImagePulling => "image-pulling",
            Self::ContainerRunning => "container-running",
            Self::Failed => "failed",
        }
    }

    /// Whether the reconciler stops in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ContainerRunning | Self::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Terminal state
    pub state: NodeState,
    /// Every state entered, in order
    pub history: Vec<NodeState>,
    /// Id of the started container
    pub container_id: Option<String>,
    /// Redacted cause of failure
    pub error: Option<String>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.state == NodeState::ContainerRunning
    }

    /// Process exit code: 0 when the container runs, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }
}

/// Writes retry notices to the journal, with secrets masked
struct JournalRetry<'a> {
    journal: RefCell<&'a mut Journal>,
    state: NodeState,
    payload: &'a BootstrapPayload,
}

impl RetryCallback for JournalRetry<'_> {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn fmt::Display, delay: Duration) {
        let message = format!(
            "attempt {attempt}/{max_attempts} failed: {}; retrying in {}s",
            self.payload.redact(&error.to_string()),
            delay.as_secs()
        );
        if let Err(e) = self.journal.borrow_mut().record(self.state.as_str(), &message) {
            log::error!("journal write failed: {e}");
        }
    }
}

/// Drives a node from boot to a running container
pub struct Reconciler<R> {
    runtime: R,
    policy: RetryPolicy,
    journal: Journal,
}

impl<R: ContainerRuntime> Reconciler<R> {
    /// Reconciler with the default retry policy
    pub fn new(runtime: R, journal: Journal) -> Self {
        Self {
            runtime,
            policy: RetryPolicy::default(),
            journal,
        }
    }

    /// Override the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The runtime being driven
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Run the state machine once to a terminal state
    pub fn run(&mut self, payload: &BootstrapPayload) -> Outcome {
        let mut history = vec![NodeState::Init];

        match self.reconcile(payload, &mut history) {
            Ok(container_id) => Outcome {
                state: NodeState::ContainerRunning,
                history,
                container_id: Some(container_id),
                error: None,
            },
            Err(e) => {
                let failed_in = history.last().copied().unwrap_or(NodeState::Init);
                let message = payload.redact(&e.to_string());
                history.push(NodeState::Failed);
                let line = format!("{failed_in} failed ({}): {message}", e.category().description());
                if let Err(journal_err) = self.journal.record(NodeState::Failed.as_str(), &line) {
                    log::error!("journal write failed: {journal_err}");
                }
                log::error!("{}", e.category().advice());
                Outcome {
                    state: NodeState::Failed,
                    history,
                    container_id: None,
                    error: Some(message),
                }
            }
        }
    }

    fn enter(&mut self, history: &mut Vec<NodeState>, state: NodeState, message: &str) -> Result<()> {
        history.push(state);
        self.journal.record(state.as_str(), message)
    }

    fn retrying<T>(
        &mut self,
        state: NodeState,
        payload: &BootstrapPayload,
        retryable: fn(&Error) -> bool,
        mut operation: impl FnMut(&R) -> Result<T>,
    ) -> Result<T> {
        let Self {
            runtime,
            policy,
            journal,
        } = self;
        let callback = JournalRetry {
            journal: RefCell::new(journal),
            state,
            payload,
        };
        with_retry_if(policy, Some(&callback), retryable, || operation(&*runtime))
    }

    fn reconcile(&mut self, payload: &BootstrapPayload, history: &mut Vec<NodeState>) -> Result<String> {
        self.journal.record(
            NodeState::Init.as_str(),
            &format!("bootstrapping container {} from {}", payload.container_name, payload.image),
        )?;
        payload.validate()?;

        self.enter(history, NodeState::RuntimeInstalling, "checking container runtime")?;
        if self.runtime.is_installed()? {
            self.journal
                .record(NodeState::RuntimeInstalling.as_str(), "runtime already installed")?;
        } else {
            self.retrying(
                NodeState::RuntimeInstalling,
                payload,
                Error::is_retryable_during_install,
                R::install,
            )?;
        }
        self.enter(history, NodeState::RuntimeReady, "container runtime ready")?;

        let registry = &payload.registry;
        self.enter(
            history,
            NodeState::Authenticating,
            &format!("logging in to {} as {}", registry.server, registry.username),
        )?;
        self.runtime.login(registry)?;

        self.enter(history, NodeState::ImagePulling, &format!("pulling {}", payload.image))?;
        self.retrying(NodeState::ImagePulling, payload, Error::is_retryable, |runtime| {
            runtime.pull(&payload.image)
        })?;

        if self.runtime.remove_container(&payload.container_name)? {
            self.journal.record(
                NodeState::ImagePulling.as_str(),
                &format!("removed existing container {}", payload.container_name),
            )?;
        }
        let container_id = self.runtime.run_container(payload)?;
        self.enter(
            history,
            NodeState::ContainerRunning,
            &format!(
                "container {} running as {container_id} with {} environment entries",
                payload.container_name,
                payload.environment.len()
            ),
        )?;
        Ok(container_id)
    }
}
