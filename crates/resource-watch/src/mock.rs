//! Scripted watch source for unit testing
//!
//! `MockWatchSource` serves queued listings and watch sessions from memory so
//! the informer and dispatcher can be exercised without an API server.

use crate::error::WatchError;
use crate::event::RawNotification;
use crate::source::{Listing, NotificationStream, WatchSource};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Item<K> = Result<RawNotification<K>, WatchError>;

/// One scripted watch call.
pub enum WatchSession<K> {
    /// `watch()` fails with this error
    Fail(WatchError),
    /// `watch()` yields these items, then the stream ends
    Items(Vec<Item<K>>),
    /// `watch()` yields whatever is sent on the paired channel
    Live(mpsc::UnboundedReceiver<Item<K>>),
}

struct Script<K> {
    listings: VecDeque<Result<Listing<K>, WatchError>>,
    sessions: VecDeque<WatchSession<K>>,
    list_calls: usize,
    watch_calls: Vec<String>,
}

/// In-memory `WatchSource` replaying queued responses.
///
/// When the listing queue is exhausted `list()` fails with
/// `SourceUnavailable`; when the session queue is exhausted `watch()` returns
/// a stream that never yields.
pub struct MockWatchSource<K> {
    script: Arc<Mutex<Script<K>>>,
}

impl<K> Clone for MockWatchSource<K> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
        }
    }
}

impl<K> fmt::Debug for MockWatchSource<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockWatchSource").finish_non_exhaustive()
    }
}

impl<K> Default for MockWatchSource<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> MockWatchSource<K> {
    /// Create an empty mock source
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                listings: VecDeque::new(),
                sessions: VecDeque::new(),
                list_calls: 0,
                watch_calls: Vec::new(),
            })),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script<K>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a successful listing (for test setup)
    pub fn push_listing(&self, items: Vec<K>, resource_version: impl Into<String>) -> &Self {
        self.script().listings.push_back(Ok(Listing {
            items,
            resource_version: resource_version.into(),
        }));
        self
    }

    /// Queue a failing listing (for test setup)
    pub fn push_list_error(&self, error: WatchError) -> &Self {
        self.script().listings.push_back(Err(error));
        self
    }

    /// Queue a finite watch session (for test setup)
    pub fn push_watch(&self, items: Vec<Item<K>>) -> &Self {
        self.script().sessions.push_back(WatchSession::Items(items));
        self
    }

    /// Queue a failing watch call (for test setup)
    pub fn push_watch_error(&self, error: WatchError) -> &Self {
        self.script().sessions.push_back(WatchSession::Fail(error));
        self
    }

    /// Queue a live watch session and return its sender (for test setup)
    pub fn push_live_watch(&self) -> mpsc::UnboundedSender<Item<K>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script().sessions.push_back(WatchSession::Live(rx));
        tx
    }

    /// Number of `list()` calls so far
    pub fn list_calls(&self) -> usize {
        self.script().list_calls
    }

    /// Resource versions passed to `watch()`, in call order
    pub fn watch_calls(&self) -> Vec<String> {
        self.script().watch_calls.clone()
    }
}

#[async_trait]
impl<K> WatchSource<K> for MockWatchSource<K>
where
    K: Send + Sync + 'static,
{
    async fn list(&self) -> Result<Listing<K>, WatchError> {
        let mut script = self.script();
        script.list_calls += 1;
        script
            .listings
            .pop_front()
            .unwrap_or_else(|| Err(WatchError::SourceUnavailable("no scripted listing".to_string())))
    }

    async fn watch(&self, resource_version: &str) -> Result<NotificationStream<K>, WatchError> {
        let session = {
            let mut script = self.script();
            script.watch_calls.push(resource_version.to_string());
            script.sessions.pop_front()
        };

        match session {
            Some(WatchSession::Fail(error)) => Err(error),
            Some(WatchSession::Items(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(WatchSession::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Helper to create a test ConfigMap in the `default` namespace
pub fn config_map(name: &str, resource_version: Option<&str>, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            resource_version: resource_version.map(str::to_string),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}
