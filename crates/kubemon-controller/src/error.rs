//! Error types for the kubemon-controller crate.

use kubemon_rules::RuleError;
use kubemon_sync::SyncError;
use thiserror::Error;

/// Errors raised while reconciling cluster objects.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The changed object is no longer in the watch cache.
    #[error("{kind} {key} not found in cache")]
    ObjectNotFound {
        /// The object kind.
        kind: &'static str,
        /// The object key.
        key: String,
    },

    /// The namespace of a changed object is not in the watch cache.
    #[error("namespace {namespace} not found in cache")]
    NamespaceNotFound {
        /// The missing namespace.
        namespace: String,
    },

    /// The watch cache did not sync in time.
    #[error("timed out waiting for {kind} cache to sync")]
    CacheSyncTimeout {
        /// The object kind.
        kind: &'static str,
    },

    /// Configuration is invalid.
    #[error("invalid configuration: {reason}")]
    Config {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// The Kubernetes client failed.
    #[error("kubernetes error: {reason}")]
    Kube {
        /// The client failure.
        reason: String,
    },

    /// Rule loading failed.
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// The monitor store failed.
    #[error("monitor store error: {0}")]
    Sync(#[from] SyncError),
}

impl From<kube::Error> for ControllerError {
    fn from(err: kube::Error) -> Self {
        Self::Kube {
            reason: err.to_string(),
        }
    }
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
