//! # nodeboot
//!
//! Node bootstrap reconciler: bring a freshly launched machine to a running,
//! authenticated container.
//!
//! This crate provides functionality for:
//! - Describing what a node should run ([`BootstrapPayload`]) and rendering
//!   the startup script that delivers it
//! - Installing a container runtime, logging in, pulling and running, with
//!   bounded retry for the network-bound steps
//! - Recording every step in an append-only node journal
//!
//! ## Example
//!
//! ```no_run
//! use nodeboot::{BootstrapPayload, Journal, Reconciler};
//! use nodeboot::backend::docker::DockerRuntime;
//! use std::path::Path;
//!
//! let payload = BootstrapPayload::load(Path::new("/etc/tierstack/payload.json")).unwrap();
//! let journal = Journal::open(Path::new("/var/log/tierstack-bootstrap.log")).unwrap();
//!
//! let outcome = Reconciler::new(DockerRuntime::new(), journal).run(&payload);
//! std::process::exit(outcome.exit_code());
//! ```
//!
//! ## Retry Logic
//!
//! Runtime installation and image pulls are retried on network errors,
//! five attempts with a fixed 15 second pause by default. Configure it with
//! [`RetryPolicy`].

pub mod backend;
pub mod error;
pub mod journal;
pub mod payload;
pub mod reconciler;
pub mod retry;

pub use error::{Error, ErrorCategory, Result};
pub use journal::Journal;
pub use payload::{BootstrapPayload, EnvValue, PortMapping, RegistryCredentials, Secret, UserDataOptions, render_user_data};
pub use reconciler::{NodeState, Outcome, Reconciler};
pub use retry::{RetryPolicy, Retryable, with_retry, with_retry_if};
