//! Error types for storage provisioning verification
//!
//! Setup failures (class resolution, node enumeration, cluster access) are
//! errors and stop a run. Per-node failures are not errors: they are recorded
//! as outcome statuses in the report.

use thiserror::Error;

/// Main error type for fcprobe operations
#[derive(Debug, Error)]
pub enum Error {
    /// Explicitly requested StorageClass does not exist
    #[error("storage class not found: {name}")]
    ClassNotFound {
        /// Requested class name
        name: String,
        /// Classes the cluster does have
        available: Vec<String>,
    },

    /// No class was requested and none is annotated as default
    #[error("no default storage class is set and none was specified")]
    NoDefaultClass,

    /// Several default classes exist and the policy forbids guessing
    #[error("multiple default storage classes: {}", candidates.join(", "))]
    AmbiguousDefaultClass {
        /// Default-annotated class names in API order
        candidates: Vec<String>,
    },

    /// Every node is cordoned, or the selector matched nothing schedulable
    #[error("no schedulable nodes found")]
    NoSchedulableNodes,

    /// The API server could not be reached with the current credentials
    #[error("cluster unreachable (are you logged in?): {message}")]
    ClusterUnreachable {
        /// Underlying failure
        message: String,
    },

    /// A cluster API request failed
    #[error("cluster query failed [{context}]: {message}")]
    ClusterQuery {
        /// Operation being attempted
        context: String,
        /// Underlying failure
        message: String,
    },

    /// An external command could not be run
    #[error("command '{program}' failed: {message}")]
    Command {
        /// Program that was executed
        program: String,
        /// What went wrong
        message: String,
    },

    /// A node name cannot be used to derive resource names
    #[error("invalid verification target '{node}': {message}")]
    InvalidTarget {
        /// Offending node name
        node: String,
        /// Why it was rejected
        message: String,
    },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violated
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a cluster query error with the operation that failed
    pub fn cluster_query(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClusterQuery {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a command execution error
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Self::cluster_query("kube", err.to_string())
    }
}
