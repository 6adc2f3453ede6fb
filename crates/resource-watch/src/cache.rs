//! Prior-state cache
//!
//! Last observed snapshot per resource identity. The dispatcher owns the only
//! writable handle; everything else reads through [`CacheReader`], which takes
//! the same lock.

use crate::snapshot::{ResourceIdentity, ResourceSnapshot};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identity → snapshot map. Not synchronized on its own.
pub struct PriorStateCache<K> {
    entries: HashMap<ResourceIdentity, ResourceSnapshot<K>>,
}

impl<K> Default for PriorStateCache<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K> fmt::Debug for PriorStateCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorStateCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<K> PriorStateCache<K> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot cached for `identity`.
    pub fn get(&self, identity: &ResourceIdentity) -> Option<&ResourceSnapshot<K>> {
        self.entries.get(identity)
    }

    /// Unconditionally stores `snapshot`, returning the entry it replaced.
    pub fn put(&mut self, identity: ResourceIdentity, snapshot: ResourceSnapshot<K>) -> Option<ResourceSnapshot<K>> {
        self.entries.insert(identity, snapshot)
    }

    /// Evicts and returns the entry for `identity`.
    pub fn remove(&mut self, identity: &ResourceIdentity) -> Option<ResourceSnapshot<K>> {
        self.entries.remove(identity)
    }

    /// Whether `identity` is cached.
    pub fn contains(&self, identity: &ResourceIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Number of cached identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached identities, in no particular order.
    pub fn identities(&self) -> impl Iterator<Item = &ResourceIdentity> {
        self.entries.keys()
    }

    /// Cached snapshots, in no particular order.
    pub fn snapshots(&self) -> impl Iterator<Item = &ResourceSnapshot<K>> {
        self.entries.values()
    }
}

pub(crate) type SharedCache<K> = Arc<RwLock<PriorStateCache<K>>>;

// A handler that panicked never held the cache lock, but a poisoned lock
// would otherwise wedge the watch loop for good.
pub(crate) fn write<K>(cache: &SharedCache<K>) -> RwLockWriteGuard<'_, PriorStateCache<K>> {
    cache.write().unwrap_or_else(PoisonError::into_inner)
}

fn read<K>(cache: &SharedCache<K>) -> RwLockReadGuard<'_, PriorStateCache<K>> {
    cache.read().unwrap_or_else(PoisonError::into_inner)
}

/// Read-only view of a dispatcher's cache.
pub struct CacheReader<K> {
    inner: SharedCache<K>,
}

impl<K> CacheReader<K> {
    pub(crate) fn new(inner: SharedCache<K>) -> Self {
        Self { inner }
    }

    /// Snapshot cached for `identity`.
    pub fn get(&self, identity: &ResourceIdentity) -> Option<ResourceSnapshot<K>> {
        read(&self.inner).get(identity).cloned()
    }

    /// Whether `identity` is cached.
    pub fn contains(&self, identity: &ResourceIdentity) -> bool {
        read(&self.inner).contains(identity)
    }

    /// Number of cached identities.
    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }

    /// Copies of all cached snapshots, sorted by identity.
    pub fn snapshots(&self) -> Vec<ResourceSnapshot<K>> {
        let mut all: Vec<_> = read(&self.inner).snapshots().cloned().collect();
        all.sort_by(|a, b| a.identity().cmp(b.identity()));
        all
    }
}

impl<K> Clone for CacheReader<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> fmt::Debug for CacheReader<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheReader").field("entries", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn snapshot(name: &str, version: &str) -> ResourceSnapshot<ConfigMap> {
        ResourceSnapshot::capture(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .expect("capture")
    }

    #[test]
    fn test_put_returns_previous_entry() {
        let mut cache = PriorStateCache::new();
        let id = ResourceIdentity::new("default", "cfg1");

        assert!(cache.put(id.clone(), snapshot("cfg1", "1")).is_none());
        let previous = cache.put(id.clone(), snapshot("cfg1", "2")).expect("previous entry");
        assert_eq!(previous.resource_version(), Some("1"));
        assert_eq!(cache.get(&id).and_then(|s| s.resource_version()), Some("2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_evicts() {
        let mut cache = PriorStateCache::new();
        let id = ResourceIdentity::new("default", "cfg1");
        cache.put(id.clone(), snapshot("cfg1", "1"));

        assert!(cache.remove(&id).is_some());
        assert!(cache.remove(&id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reader_sees_writes_and_sorts() {
        let shared: SharedCache<ConfigMap> = Arc::default();
        let reader = CacheReader::new(Arc::clone(&shared));
        {
            let mut cache = write(&shared);
            cache.put(ResourceIdentity::new("default", "b"), snapshot("b", "1"));
            cache.put(ResourceIdentity::new("default", "a"), snapshot("a", "1"));
        }

        assert_eq!(reader.len(), 2);
        assert!(reader.contains(&ResourceIdentity::new("default", "a")));
        let names: Vec<_> = reader.snapshots().iter().map(|s| s.identity().name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
