//! Raw notifications and classified change events.

use crate::diff::DiffReport;
use crate::snapshot::{ResourceIdentity, ResourceSnapshot};
use kube::Resource;
use std::fmt;

/// Kind of change a handler can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Resource appeared
    Added,
    /// Resource changed
    Modified,
    /// Resource disappeared
    Deleted,
}

impl EventKind {
    /// All kinds, in delivery-table order.
    pub const ALL: [EventKind; 3] = [EventKind::Added, EventKind::Modified, EventKind::Deleted];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Added => "Added",
            EventKind::Modified => "Modified",
            EventKind::Deleted => "Deleted",
        };
        f.write_str(name)
    }
}

/// Notification as delivered by a watch source, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawNotification<K> {
    /// Object was created
    Created(K),
    /// Object was updated
    Updated(K),
    /// Object was deleted (body is the last state)
    Deleted(K),
    /// Progress marker carrying only a resource version
    Bookmark(String),
}

impl<K: Resource> RawNotification<K> {
    /// Resource version the watch has progressed to, if the notification carries one.
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            RawNotification::Created(obj) | RawNotification::Updated(obj) | RawNotification::Deleted(obj) => {
                obj.meta().resource_version.as_deref()
            }
            RawNotification::Bookmark(version) => Some(version),
        }
    }
}

/// Classified change handed to registered handlers.
#[derive(Debug, Clone)]
pub enum ChangeEvent<K> {
    /// First observation of an identity.
    Added {
        /// Snapshot now cached
        resource: ResourceSnapshot<K>,
    },
    /// Update of an identity.
    Modified {
        /// Snapshot now cached
        resource: ResourceSnapshot<K>,
        /// Snapshot cached immediately before this update, absent if the
        /// identity was never observed
        prior: Option<ResourceSnapshot<K>>,
        /// Structural delta from `prior` to `resource`
        diff: DiffReport,
    },
    /// Removal of an identity.
    Deleted {
        /// Last state reported by the source
        resource: ResourceSnapshot<K>,
        /// Snapshot evicted from the cache, if any
        prior: Option<ResourceSnapshot<K>>,
    },
}

impl<K> ChangeEvent<K> {
    /// Kind used to route this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Added { .. } => EventKind::Added,
            ChangeEvent::Modified { .. } => EventKind::Modified,
            ChangeEvent::Deleted { .. } => EventKind::Deleted,
        }
    }

    /// The resource the event is about.
    pub fn resource(&self) -> &ResourceSnapshot<K> {
        match self {
            ChangeEvent::Added { resource }
            | ChangeEvent::Modified { resource, .. }
            | ChangeEvent::Deleted { resource, .. } => resource,
        }
    }

    /// Identity of the resource.
    pub fn identity(&self) -> &ResourceIdentity {
        self.resource().identity()
    }

    /// Previously cached snapshot, for `Modified` and `Deleted`.
    pub fn prior(&self) -> Option<&ResourceSnapshot<K>> {
        match self {
            ChangeEvent::Added { .. } => None,
            ChangeEvent::Modified { prior, .. } | ChangeEvent::Deleted { prior, .. } => prior.as_ref(),
        }
    }

    /// Diff report, for `Modified` only.
    pub fn diff(&self) -> Option<&DiffReport> {
        match self {
            ChangeEvent::Modified { diff, .. } => Some(diff),
            _ => None,
        }
    }
}
