//! Resource Watch Core
//!
//! List/watch notification plumbing for Kubernetes resources: a watch source
//! yields raw change notifications, the dispatcher classifies them against a
//! prior-state cache and hands `Added`/`Modified`/`Deleted` events to the
//! handlers registered for each kind.
//!
//! # Example
//!
//! ```no_run
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use resource_watch::{ApiWatchSource, ChangeEvent, Dispatcher, EventKind, Informer, InformerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let source = ApiWatchSource::<ConfigMap>::namespaced(client, "default");
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.register(EventKind::Modified, |event: &ChangeEvent<ConfigMap>| -> anyhow::Result<()> {
//!     if let Some(diff) = event.diff() {
//!         println!("{} changed: {}", event.identity(), diff);
//!     }
//!     Ok(())
//! });
//!
//! let handle = Informer::new(source, dispatcher, InformerConfig::default()).spawn();
//! tokio::signal::ctrl_c().await?;
//! handle.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Prior-state cache**: last observed snapshot per `(namespace, name)`
//! - **Ordered dispatch**: handlers run in registration order, faults are isolated
//! - **Structural diffs**: JSON Patch edit scripts for modifications
//! - **Resync**: re-list reconciles the cache and emits the missed deltas

pub mod cache;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod informer;
pub mod kube_source;
pub mod snapshot;
pub mod source;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use cache::{CacheReader, PriorStateCache};
pub use diff::{DiffReport, DiffReporter, PatchOperation};
pub use dispatcher::{DispatchOutcome, Dispatcher, EventHandler, ResyncOutcome};
pub use error::{HandlerFault, WatchError};
pub use event::{ChangeEvent, EventKind, RawNotification};
pub use informer::{Informer, InformerConfig, WatchHandle};
pub use kube_source::ApiWatchSource;
pub use snapshot::{ResourceIdentity, ResourceSnapshot};
pub use source::{Listing, NotificationStream, WatchSource};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockWatchSource;

use serde::Serialize;
use std::fmt::Debug;

/// Bounds shared by every resource type the core can watch.
pub trait WatchedResource: kube::Resource<DynamicType: Default> + Clone + Serialize + Debug + Send + Sync + 'static {}

impl<K> WatchedResource for K where
    K: kube::Resource<DynamicType: Default> + Clone + Serialize + Debug + Send + Sync + 'static
{
}
