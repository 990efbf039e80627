//! Provider adapters selected by the `[provider]` section

pub mod http;
pub mod local;

use crate::config::{ProviderKind, StackConfig};
use anyhow::Result;
use modgraph::Provider;
use std::path::Path;

/// The configured provider
#[derive(Debug)]
pub enum Backend {
    Local(local::LocalProvider),
    Http(http::HttpProvider),
}

impl Backend {
    pub fn open(config: &StackConfig, state_dir: &Path) -> Result<Self> {
        match config.provider.kind {
            ProviderKind::Local => Ok(Self::Local(local::LocalProvider::open(state_dir)?)),
            ProviderKind::Http => Ok(Self::Http(http::HttpProvider::from_config(&config.provider)?)),
        }
    }

    pub fn provider(&self) -> &dyn Provider {
        match self {
            Self::Local(p) => p,
            Self::Http(p) => p,
        }
    }

    /// Persist provider-side state, if the backend keeps any
    pub fn persist(&self) -> Result<()> {
        match self {
            Self::Local(p) => p.save(),
            Self::Http(_) => Ok(()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Local(p) => format!("local ({})", p.path().display()),
            Self::Http(p) => format!("http ({})", p.endpoint()),
        }
    }
}
