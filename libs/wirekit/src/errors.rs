//! Structured errors for the container bootstrap pipeline.
//!
//! The bootstrap performs no automatic recovery: the first fatal error aborts
//! the run and is propagated to the caller, with partial store mutations left
//! intact. Callers are expected to discard the whole container on failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    /// Only raised under `DuplicatePolicy::Reject`; the default policy
    /// silently overwrites.
    #[error("definition '{0}' is already registered")]
    DuplicateName(String),

    /// Unknown name at build time. Also raised when a name disappears from
    /// the store between query and build, which indicates an extension
    /// unregistered a definition in flight.
    #[error("no definition named '{0}'")]
    NoSuchDefinition(String),

    /// The built instance does not expose the capability its definition
    /// declared, or a typed resolve asked for the wrong concrete type.
    #[error("component '{name}' cannot be used as '{expected}'")]
    TypeMismatch { name: String, expected: &'static str },

    /// Wraps any error an extension raised. Never retried.
    #[error("extension '{extension}' failed")]
    ExtensionInvocation {
        extension: String,
        #[source]
        source: anyhow::Error,
    },

    /// The core never constructs instances reflectively; a definition that is
    /// asked to build must carry a supplier closure.
    #[error("definition '{0}' has no instance supplier")]
    MissingSupplier(String),

    #[error("circular dependency while building '{0}'")]
    CircularDependency(String),

    #[error("failed to build component '{name}'")]
    Build {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Orchestration runs are non-reentrant over one container.
    #[error("an orchestration run is already in progress")]
    AlreadyRunning,
}
