//! Watch core errors

use crate::event::EventKind;
use crate::snapshot::ResourceIdentity;
use thiserror::Error;

/// Errors surfaced by watch sources and the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// The list/watch endpoint could not be reached or the watch broke.
    ///
    /// Recoverable: the caller decides whether to resync.
    #[error("Watch source unavailable: {0}")]
    SourceUnavailable(String),

    /// A notification could not be decoded or has no usable identity.
    ///
    /// The notification is dropped and the stream continues.
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    /// The informer task panicked or was aborted. Not recoverable by resync.
    #[error("Informer task failed: {0}")]
    TaskFailed(String),
}

impl WatchError {
    /// Whether the caller has to re-list before watching again.
    #[must_use]
    pub fn requires_resync(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}

/// A handler returned an error or panicked while processing an event.
///
/// Faults are logged and recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Handler #{handler} failed on {kind} {identity}: {message}")]
pub struct HandlerFault {
    /// Event kind being delivered
    pub kind: EventKind,
    /// Resource the event was about
    pub identity: ResourceIdentity,
    /// Registration index of the handler within its kind
    pub handler: usize,
    /// Error message or panic payload
    pub message: String,
}
