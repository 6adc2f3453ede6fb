//! Controller-specific error types.
//!
//! Library errors (`WatchError`, handler faults) are handled inside the watch
//! loop; only failures that stop the controller surface here.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can stop the ConfigMap Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Installing signal handlers failed
    #[error("Signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}
