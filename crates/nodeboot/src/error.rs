//! Error types for node bootstrap.
//!
//! Errors are categorized so the reconciler can tell a transient failure
//! (worth another attempt) from a fatal one (the node is marked failed).

use thiserror::Error;

/// Categories of bootstrap errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Registry rejected the credentials
    Auth,
    /// Image or package does not exist
    NotFound,
    /// Container runtime failed in some other way
    Runtime,
    /// Payload or environment is unusable
    Config,
    /// Local I/O failure
    Io,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Whether runtime installation should try again after this category.
    ///
    /// Missing packages and failed service starts are retried along with
    /// network errors; only payload and local I/O problems stop the loop.
    pub fn is_retryable_during_install(&self) -> bool {
        !matches!(self, Self::Config | Self::Io)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Registry authentication failed",
            Self::NotFound => "Image or package not found",
            Self::Runtime => "Container runtime failure",
            Self::Config => "Invalid bootstrap configuration",
            Self::Io => "Local I/O failure",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the node's route to the registry and package mirrors",
            Self::Auth => "Rotate the registry token and re-apply the compute module",
            Self::NotFound => "Verify the container image reference",
            Self::Runtime => "Inspect the container runtime service on the node",
            Self::Config => "Check the bootstrap payload rendered at apply time",
            Self::Io => "Check disk space and permissions on the node",
            Self::Other => "Check the node journal for more information",
        }
    }
}

/// Errors that can occur while bootstrapping a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error during {step}: {message}")]
    Network { step: String, message: String },

    /// Registry login rejected
    #[error("registry authentication failed: {message}")]
    Auth { message: String },

    /// Image or package not found
    #[error("not found during {step}: {message}")]
    NotFound { step: String, message: String },

    /// Runtime command failed
    #[error("{step} failed: {stderr}")]
    Runtime { step: String, stderr: String },

    /// Payload or environment problem
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network { .. } => ErrorCategory::Network,
            Self::Auth { .. } => ErrorCategory::Auth,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Runtime { .. } => ErrorCategory::Runtime,
            Self::Config(_) | Self::Json(_) => ErrorCategory::Config,
            Self::Io(_) => ErrorCategory::Io,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether a failed runtime installation is worth another attempt.
    pub fn is_retryable_during_install(&self) -> bool {
        self.category().is_retryable_during_install()
    }

    /// Create an error from container runtime or package manager output.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_command_output(stderr: &str, step: &str) -> Self {
        let stderr_lower = stderr.to_lowercase();
        let message = stderr.trim().to_string();
        let step = step.to_string();

        // Auth first: registries answer bad credentials over a working network
        if stderr_lower.contains("unauthorized")
            || stderr_lower.contains("authentication required")
            || stderr_lower.contains("incorrect username or password")
            || stderr_lower.contains("denied: requested access")
        {
            return Self::Auth { message };
        }

        // Network errors
        if stderr_lower.contains("could not resolve")
            || stderr_lower.contains("temporary failure in name resolution")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("connection reset")
            || stderr_lower.contains("timed out")
            || stderr_lower.contains("timeout")
            || stderr_lower.contains("tls handshake")
            || stderr_lower.contains("network is unreachable")
            || stderr_lower.contains("unexpected eof")
            || stderr_lower.contains("toomanyrequests")
            || stderr_lower.contains("could not get lock")
            || stderr_lower.contains("failed to fetch")
        {
            return Self::Network { step, message };
        }

        // Not found errors
        if stderr_lower.contains("manifest unknown")
            || stderr_lower.contains("not found")
            || stderr_lower.contains("no matching manifest")
            || stderr_lower.contains("unable to locate package")
        {
            return Self::NotFound { step, message };
        }

        Self::Runtime {
            step,
            stderr: message,
        }
    }
}

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Runtime.is_retryable());
    }

    #[test]
    fn test_from_output_network() {
        let err = Error::from_command_output(
            "Error response from daemon: Get \"https://registry/v2/\": dial tcp: lookup registry: Temporary failure in name resolution",
            "pull",
        );
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_output_auth() {
        let err = Error::from_command_output(
            "Error response from daemon: Get https://ghcr.io/v2/: unauthorized",
            "login",
        );
        assert_eq!(err.category(), ErrorCategory::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_output_not_found() {
        let err = Error::from_command_output(
            "Error response from daemon: manifest for shop/api:9.9 not found: manifest unknown",
            "pull",
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_output_apt_lock_is_transient() {
        let err = Error::from_command_output(
            "E: Could not get lock /var/lib/dpkg/lock-frontend",
            "install",
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_degraded_mirror_install_is_retried() {
        let err = Error::from_command_output(
            "W: Some index files failed to download. They have been ignored, or old ones used instead.\nE: Unable to locate package docker.io",
            "install",
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(!err.is_retryable());
        assert!(err.is_retryable_during_install());

        let err = Error::from_command_output(
            "Job for docker.service failed because the control process exited with error code.",
            "install",
        );
        assert_eq!(err.category(), ErrorCategory::Runtime);
        assert!(err.is_retryable_during_install());
    }

    #[test]
    fn test_config_and_io_stop_install() {
        assert!(!Error::Config("bad payload".to_string()).is_retryable_during_install());
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        assert!(!io.is_retryable_during_install());
    }

    #[test]
    fn test_from_output_default_runtime() {
        let err = Error::from_command_output("docker: invalid reference format.", "run");
        assert_eq!(err.category(), ErrorCategory::Runtime);
        assert_eq!(err.to_string(), "run failed: docker: invalid reference format.");
    }
}
