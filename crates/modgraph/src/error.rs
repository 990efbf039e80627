//! Error types for module graph evaluation.
//!
//! Configuration-time errors (unresolved inputs, cycles, re-apply, undeclared
//! dependencies) are raised before any provider call. Provider errors are
//! split into transient and permanent so the adapter boundary can decide
//! whether a retry is worthwhile.

use thiserror::Error;

/// Categories of graph errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Graph shape or binding problem detected before apply
    Configuration,
    /// Provider failure that may succeed on retry
    Transient,
    /// Provider failure that will not succeed on retry
    Permanent,
    /// Template rendering or output evaluation problem
    Template,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Errors raised while building, planning, applying or destroying a graph.
#[derive(Debug, Error)]
pub enum Error {
    /// A declared input has no bound value at apply time
    #[error("module '{module}' input '{input}' is unresolved")]
    UnresolvedInput {
        /// Consuming module
        module: String,
        /// Input without a value
        input: String,
    },

    /// The dependency graph contains a cycle
    #[error("cyclic dependency between modules: {}", modules.join(", "))]
    CyclicDependency {
        /// Modules that could not be ordered
        modules: Vec<String>,
    },

    /// The module has already been applied
    #[error("module '{module}' has already been applied")]
    AlreadyApplied {
        /// Module name
        module: String,
    },

    /// The module was never applied (or was destroyed)
    #[error("module '{module}' has not been applied")]
    NotApplied {
        /// Module name
        module: String,
    },

    /// A dependency names a module that is not registered
    #[error("module '{module}' depends on unknown module '{dependency}'")]
    UnknownModule {
        /// Module declaring the dependency
        module: String,
        /// Missing module name
        dependency: String,
    },

    /// A module with this name is already registered
    #[error("module '{module}' is already registered")]
    DuplicateModule {
        /// Module name
        module: String,
    },

    /// An input is bound to a module that is not a declared dependency
    #[error("module '{module}' binds '{input}' to '{source_module}', which is not a declared dependency")]
    UndeclaredDependency {
        /// Consuming module
        module: String,
        /// Input being bound
        input: String,
        /// Producer module
        source_module: String,
    },

    /// The template does not declare this input
    #[error("module '{module}' has no input named '{input}'")]
    UnknownInput {
        /// Module name
        module: String,
        /// Input name
        input: String,
    },

    /// A bound value does not have the type the handle expects
    #[error("module '{module}' input '{input}' expected {expected}, got {found}")]
    TypeMismatch {
        /// Module name
        module: String,
        /// Input or output name
        input: String,
        /// Expected type name
        expected: &'static str,
        /// Rendered value that did not match
        found: String,
    },

    /// A producer module finished applying without the named output
    #[error("module '{module}' produced no output named '{output}'")]
    MissingOutput {
        /// Producer module
        module: String,
        /// Output name
        output: String,
    },

    /// A resource attribute or output refers to a resource that does not exist
    #[error("module '{module}' references unknown attribute '{resource}.{attribute}'")]
    UnknownResourceReference {
        /// Module name
        module: String,
        /// Logical resource name
        resource: String,
        /// Attribute name
        attribute: String,
    },

    /// A template could not render its resources
    #[error("module '{module}' template failed: {message}")]
    Template {
        /// Module name
        module: String,
        /// Description of the failure
        message: String,
    },

    /// Provider failure worth retrying
    #[error("provider transient error: {message}")]
    ProviderTransient {
        /// Message from the provider
        message: String,
    },

    /// Provider failure that aborts the run
    #[error("provider error: {message}")]
    ProviderPermanent {
        /// Message from the provider
        message: String,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderTransient { .. } => ErrorCategory::Transient,
            Self::ProviderPermanent { .. } => ErrorCategory::Permanent,
            Self::Template { .. }
            | Self::MissingOutput { .. }
            | Self::UnknownResourceReference { .. } => ErrorCategory::Template,
            _ => ErrorCategory::Configuration,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Shorthand for a template failure.
    pub fn template(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
