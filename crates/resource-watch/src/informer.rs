//! List/watch loop.
//!
//! One informer drives one collection: list, reconcile the cache through
//! [`Dispatcher::resync`], then watch from the listing's resource version and
//! dispatch every notification in stream order. A stream that ends normally
//! (server-side timeout) is re-opened from the last resource version seen; a
//! source failure ends the session so the caller can resync.

use crate::WatchedResource;
use crate::cache::CacheReader;
use crate::dispatcher::{self, Dispatcher};
use crate::error::WatchError;
use crate::event::RawNotification;
use crate::source::WatchSource;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause before re-opening a watch that closed without delivering anything.
pub const EMPTY_WATCH_PAUSE: Duration = Duration::from_secs(1);

/// Informer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InformerConfig {
    /// Re-list this often even if the watch is healthy; `None` disables.
    pub resync_interval: Option<Duration>,
    /// Pause before re-listing after `SourceUnavailable`; `None` makes a
    /// spawned informer stop and report the error instead.
    pub reconnect_delay: Option<Duration>,
}

/// Drives a watch source into a dispatcher.
pub struct Informer<K, S> {
    source: S,
    dispatcher: Dispatcher<K>,
    config: InformerConfig,
}

impl<K, S> std::fmt::Debug for Informer<K, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Informer")
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum SessionEnd {
    Cancelled,
    ResyncDue,
}

impl<K, S> Informer<K, S>
where
    K: WatchedResource,
    S: WatchSource<K> + 'static,
{
    /// Creates an informer; handlers must already be registered on `dispatcher`.
    pub fn new(source: S, dispatcher: Dispatcher<K>, config: InformerConfig) -> Self {
        Self {
            source,
            dispatcher,
            config,
        }
    }

    /// Read-only handle to the dispatcher's cache.
    pub fn cache(&self) -> CacheReader<K> {
        self.dispatcher.cache()
    }

    /// Runs list/watch sessions until cancelled.
    ///
    /// Periodic resyncs start a new session without returning.
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` when listing or watching fails. The cache
    /// is kept; the next call re-lists and emits whatever was missed.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), WatchError> {
        loop {
            match self.session(cancel).await? {
                SessionEnd::Cancelled => return Ok(()),
                SessionEnd::ResyncDue => info!("Periodic resync of {}", self.source.describe()),
            }
        }
    }

    async fn session(&self, cancel: &CancellationToken) -> Result<SessionEnd, WatchError> {
        let listing = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            listing = self.source.list() => listing?,
        };
        if cancel.is_cancelled() {
            return Ok(SessionEnd::Cancelled);
        }

        let outcome = self.dispatcher.resync_unless(listing.items, || cancel.is_cancelled());
        if cancel.is_cancelled() {
            debug!(
                "Resync of {} cancelled with {} deltas undelivered",
                self.source.describe(),
                outcome.undelivered
            );
            return Ok(SessionEnd::Cancelled);
        }
        info!(
            "Synced {} at resourceVersion {}: {} added, {} modified, {} deleted, {} unchanged",
            self.source.describe(),
            listing.resource_version,
            outcome.added,
            outcome.modified,
            outcome.deleted,
            outcome.unchanged
        );

        let mut resource_version = listing.resource_version;
        let resync_at = self.config.resync_interval.map(|interval| Instant::now() + interval);

        loop {
            let mut stream = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                stream = self.source.watch(&resource_version) => stream?,
            };
            debug!("Watching {} from resourceVersion {}", self.source.describe(), resource_version);
            let mut received = 0usize;
            let mut faults = 0usize;

            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!("Watch of {} cancelled", self.source.describe());
                        return Ok(SessionEnd::Cancelled);
                    }
                    () = resync_due(resync_at) => return Ok(SessionEnd::ResyncDue),
                    next = stream.next() => next,
                };

                if next.is_some() {
                    received += 1;
                }
                match next {
                    None => break,
                    Some(Ok(RawNotification::Bookmark(version))) => resource_version = version,
                    Some(Ok(notification)) => {
                        if let Some(version) = notification.resource_version() {
                            resource_version = version.to_string();
                        }
                        if cancel.is_cancelled() {
                            return Ok(SessionEnd::Cancelled);
                        }
                        match self.dispatcher.dispatch(notification) {
                            Ok(outcome) => faults += outcome.faults.len(),
                            // Already logged with its kind by the dispatcher
                            Err(e) => debug!("Notification dropped: {}", e),
                        }
                    }
                    Some(Err(WatchError::MalformedNotification(msg))) => {
                        warn!("Skipping malformed notification from {}: {}", self.source.describe(), msg);
                    }
                    Some(Err(e)) => return Err(e),
                }
            }

            if received > 0 {
                debug!(
                    "Watch stream of {} ended after {} notifications ({} handler faults), re-watching from resourceVersion {}",
                    self.source.describe(),
                    received,
                    faults,
                    resource_version
                );
                continue;
            }

            warn!(
                "Watch stream of {} closed without events, re-watching from resourceVersion {} in {:?}",
                self.source.describe(),
                resource_version,
                EMPTY_WATCH_PAUSE
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                () = resync_due(resync_at) => return Ok(SessionEnd::ResyncDue),
                () = tokio::time::sleep(EMPTY_WATCH_PAUSE) => {}
            }
        }
    }

    /// Runs the informer on its own task.
    ///
    /// With a `reconnect_delay` configured, `SourceUnavailable` is logged and
    /// the informer re-lists after the delay; otherwise the task ends with the
    /// error.
    pub fn spawn(self) -> WatchHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                let Err(e) = self.run(&token).await else {
                    return Ok(());
                };
                let Some(delay) = self.config.reconnect_delay else {
                    error!("Watch of {} stopped: {}", self.source.describe(), e);
                    return Err(e);
                };

                warn!(
                    "Watch of {} interrupted: {}. Resyncing in {:?}",
                    self.source.describe(),
                    e,
                    delay
                );
                tokio::select! {
                    () = token.cancelled() => return Ok(()),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        });

        WatchHandle { cancel, task }
    }
}

async fn resync_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to a spawned informer.
///
/// Closing cancels the watch, drops the stream (releasing the connection) and
/// waits for the task. Handlers already running finish first.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), WatchError>>,
}

impl WatchHandle {
    /// Token that stops the informer when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the informer task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the informer to end on its own.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the informer.
    pub async fn join(self) -> Result<(), WatchError> {
        flatten(self.task.await)
    }

    /// Stops the informer and waits for it.
    ///
    /// # Errors
    ///
    /// Returns the error if the informer had already stopped on one.
    pub async fn close(self) -> Result<(), WatchError> {
        self.cancel.cancel();
        flatten(self.task.await)
    }
}

fn flatten(joined: Result<Result<(), WatchError>, tokio::task::JoinError>) -> Result<(), WatchError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = format!("panicked: {}", dispatcher::panic_message(payload.as_ref()));
            error!("Informer task {}", message);
            Err(WatchError::TaskFailed(message))
        }
        Err(e) => Err(WatchError::TaskFailed(e.to_string())),
    }
}

