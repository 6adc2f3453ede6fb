//! Watch source trait
//!
//! Abstracts the list/watch capability so the informer can run against the
//! Kubernetes API or a scripted source in tests.

use crate::error::WatchError;
use crate::event::RawNotification;
use futures::stream::BoxStream;

/// Full state of a collection at one resource version.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<K> {
    /// Every object currently in scope
    pub items: Vec<K>,
    /// Collection resource version to start watching from
    pub resource_version: String,
}

/// Lazy, unbounded sequence of raw notifications.
///
/// `MalformedNotification` items are skipped by consumers; `SourceUnavailable`
/// items end the watch.
pub type NotificationStream<K> = BoxStream<'static, Result<RawNotification<K>, WatchError>>;

/// List and watch capability over one resource collection.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait WatchSource<K: Send + 'static>: Send + Sync {
    /// Lists the current state of the collection.
    async fn list(&self) -> Result<Listing<K>, WatchError>;

    /// Opens a watch starting after `resource_version`.
    async fn watch(&self, resource_version: &str) -> Result<NotificationStream<K>, WatchError>;

    /// Human-readable scope, used in logs.
    fn describe(&self) -> String;
}
