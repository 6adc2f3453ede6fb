//! Event classification and dispatch.
//!
//! The dispatcher is the single writer of the prior-state cache. For every raw
//! notification it updates the cache, builds the matching [`ChangeEvent`] and
//! delivers it synchronously to the handlers registered for that kind, in
//! registration order. Handler errors and panics are caught per handler.

use crate::WatchedResource;
use crate::cache::{self, CacheReader, SharedCache};
use crate::diff::DiffReporter;
use crate::error::{HandlerFault, WatchError};
use crate::event::{ChangeEvent, EventKind, RawNotification};
use crate::snapshot::{ResourceIdentity, ResourceSnapshot};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Callback invoked for change events of the kinds it is registered for.
pub trait EventHandler<K>: Send + Sync {
    /// Handles one event. Errors are logged and do not stop delivery.
    fn handle(&self, event: &ChangeEvent<K>) -> anyhow::Result<()>;
}

impl<K, F> EventHandler<K> for F
where
    F: Fn(&ChangeEvent<K>) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &ChangeEvent<K>) -> anyhow::Result<()> {
        self(event)
    }
}

/// Result of dispatching one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Kind of the event emitted, `None` for bookmarks
    pub kind: Option<EventKind>,
    /// Handlers that completed without error
    pub delivered: usize,
    /// Handlers that failed or panicked
    pub faults: Vec<HandlerFault>,
}

/// Result of reconciling the cache against a full listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncOutcome {
    /// Identities seen for the first time
    pub added: usize,
    /// Identities whose resource version moved
    pub modified: usize,
    /// Cached identities missing from the listing
    pub deleted: usize,
    /// Identities whose resource version is unchanged
    pub unchanged: usize,
    /// Listed objects dropped for lack of an identity
    pub malformed: usize,
    /// Deltas skipped because delivery was cancelled
    pub undelivered: usize,
    /// Handler faults raised while delivering the deltas
    pub faults: Vec<HandlerFault>,
}

/// Routes classified events to registered handlers.
pub struct Dispatcher<K> {
    handlers: HashMap<EventKind, Vec<Box<dyn EventHandler<K>>>>,
    cache: SharedCache<K>,
    diff: DiffReporter,
}

impl<K> fmt::Debug for Dispatcher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: HashMap<EventKind, usize> = self.handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Dispatcher")
            .field("handlers", &handlers)
            .field("diff", &self.diff)
            .finish_non_exhaustive()
    }
}

impl<K: WatchedResource> Default for Dispatcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: WatchedResource> Dispatcher<K> {
    /// Creates a dispatcher with an empty cache and the default diff settings.
    pub fn new() -> Self {
        Self::with_diff_reporter(DiffReporter::default())
    }

    /// Creates a dispatcher using the given diff reporter.
    pub fn with_diff_reporter(diff: DiffReporter) -> Self {
        Self {
            handlers: HashMap::new(),
            cache: Arc::default(),
            diff,
        }
    }

    /// Registers `handler` for events of `kind`, after any already registered.
    pub fn register<H>(&mut self, kind: EventKind, handler: H) -> &mut Self
    where
        H: EventHandler<K> + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Read-only handle to the cache.
    pub fn cache(&self) -> CacheReader<K> {
        CacheReader::new(Arc::clone(&self.cache))
    }

    /// Classifies one notification, updates the cache and delivers the event.
    ///
    /// # Errors
    ///
    /// Returns `MalformedNotification` when the object has no identity. The
    /// notification is logged and dropped; the cache is untouched.
    pub fn dispatch(&self, notification: RawNotification<K>) -> Result<DispatchOutcome, WatchError> {
        let (kind, object) = match notification {
            RawNotification::Created(obj) => (EventKind::Added, obj),
            RawNotification::Updated(obj) => (EventKind::Modified, obj),
            RawNotification::Deleted(obj) => (EventKind::Deleted, obj),
            RawNotification::Bookmark(version) => {
                trace!("Bookmark at resourceVersion {}", version);
                return Ok(DispatchOutcome::default());
            }
        };

        let resource = ResourceSnapshot::capture(object).inspect_err(|e| {
            warn!(kind = %kind, "Dropping notification: {}", e);
        })?;

        let prior = self.classify(kind, &resource);
        let mut faults = Vec::new();
        let delivered = self.emit(kind, resource, prior, &mut faults);

        Ok(DispatchOutcome {
            kind: Some(kind),
            delivered,
            faults,
        })
    }

    /// Reconciles the cache against a full listing and emits the deltas.
    ///
    /// Unseen identities become `Added`, identities whose resource version
    /// moved become `Modified`, and cached identities missing from the listing
    /// become `Deleted` with their last cached snapshot. Afterwards the cache
    /// holds exactly the listed objects.
    pub fn resync(&self, items: Vec<K>) -> ResyncOutcome {
        self.resync_unless(items, || false)
    }

    /// Like [`resync`](Self::resync), but stops delivering deltas once
    /// `cancelled` returns true.
    ///
    /// The cache is reconciled in full either way; deltas not delivered are
    /// counted in `undelivered`.
    pub fn resync_unless(&self, items: Vec<K>, cancelled: impl Fn() -> bool) -> ResyncOutcome {
        let mut outcome = ResyncOutcome::default();
        let mut events = Vec::new();

        {
            let mut cache = cache::write(&self.cache);
            let mut seen = HashSet::with_capacity(items.len());

            for object in items {
                let resource = match ResourceSnapshot::capture(object) {
                    Ok(resource) => resource,
                    Err(e) => {
                        warn!("Dropping listed object: {}", e);
                        outcome.malformed += 1;
                        continue;
                    }
                };
                let identity = resource.identity().clone();
                if !seen.insert(identity.clone()) {
                    warn!(identity = %identity, "Listing contains duplicate identity, keeping the later object");
                }

                match cache.get(&identity).map(|cached| cached.same_version(&resource)) {
                    Some(true) => {
                        outcome.unchanged += 1;
                    }
                    Some(false) => {
                        let prior = cache.put(identity, resource.clone());
                        outcome.modified += 1;
                        events.push((EventKind::Modified, resource, prior));
                    }
                    None => {
                        cache.put(identity, resource.clone());
                        outcome.added += 1;
                        events.push((EventKind::Added, resource, None));
                    }
                }
            }

            let stale: Vec<ResourceIdentity> = cache.identities().filter(|id| !seen.contains(*id)).cloned().collect();
            for identity in stale {
                if let Some(prior) = cache.remove(&identity) {
                    outcome.deleted += 1;
                    events.push((EventKind::Deleted, prior.clone(), Some(prior)));
                }
            }
        }

        debug!(
            added = outcome.added,
            modified = outcome.modified,
            deleted = outcome.deleted,
            unchanged = outcome.unchanged,
            "Resync reconciled cache"
        );

        let total = events.len();
        for (delivered, (kind, resource, prior)) in events.into_iter().enumerate() {
            if cancelled() {
                outcome.undelivered = total - delivered;
                debug!(undelivered = outcome.undelivered, "Resync delivery cancelled");
                break;
            }
            self.emit(kind, resource, prior, &mut outcome.faults);
        }

        outcome
    }

    /// Applies the cache update for `kind` and returns the prior entry.
    fn classify(&self, kind: EventKind, resource: &ResourceSnapshot<K>) -> Option<ResourceSnapshot<K>> {
        let identity = resource.identity().clone();
        let mut cache = cache::write(&self.cache);
        match kind {
            EventKind::Added => {
                if cache.put(identity.clone(), resource.clone()).is_some() {
                    debug!(identity = %identity, "Added notification for an identity already cached");
                }
                None
            }
            EventKind::Modified => cache.put(identity, resource.clone()),
            EventKind::Deleted => cache.remove(&identity),
        }
    }

    /// Builds the event and delivers it. Returns the number of successful handlers.
    fn emit(
        &self,
        kind: EventKind,
        resource: ResourceSnapshot<K>,
        prior: Option<ResourceSnapshot<K>>,
        faults: &mut Vec<HandlerFault>,
    ) -> usize {
        // Diffing serializes both bodies; skip building events nobody receives
        if self.handler_count(kind) == 0 {
            trace!(kind = %kind, identity = %resource.identity(), "No handlers registered");
            return 0;
        }

        let event = match kind {
            EventKind::Added => ChangeEvent::Added { resource },
            EventKind::Modified => {
                let diff = self.diff.report(prior.as_ref().map(ResourceSnapshot::object), resource.object());
                ChangeEvent::Modified { resource, prior, diff }
            }
            EventKind::Deleted => ChangeEvent::Deleted { resource, prior },
        };

        self.deliver(&event, faults)
    }

    fn deliver(&self, event: &ChangeEvent<K>, faults: &mut Vec<HandlerFault>) -> usize {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return 0;
        };

        let mut delivered = 0;
        for (index, handler) in handlers.iter().enumerate() {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            let fault = HandlerFault {
                kind: event.kind(),
                identity: event.identity().clone(),
                handler: index,
                message,
            };
            error!(
                kind = %fault.kind,
                identity = %fault.identity,
                handler = index,
                "Handler failed: {}",
                fault.message
            );
            faults.push(fault);
        }

        delivered
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

