//! Resource identity and immutable snapshots.

use crate::error::WatchError;
use chrono::{DateTime, Utc};
use kube::Resource;
use std::fmt;
use std::sync::Arc;

/// Cache key for a watched resource: `(namespace, name)`.
///
/// The namespace is empty for cluster-scoped resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    namespace: String,
    name: String,
}

impl ResourceIdentity {
    /// Creates an identity from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Derives the identity from object metadata.
    ///
    /// # Errors
    ///
    /// Returns `MalformedNotification` when the object has no name.
    pub fn of<K: Resource>(object: &K) -> Result<Self, WatchError>
    where
        K::DynamicType: Default,
    {
        let meta = object.meta();
        let name = meta
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                WatchError::MalformedNotification(format!(
                    "{} without metadata.name (namespace: {})",
                    K::kind(&K::DynamicType::default()),
                    meta.namespace.as_deref().unwrap_or("<none>")
                ))
            })?;

        Ok(Self::new(meta.namespace.clone().unwrap_or_default(), name))
    }

    /// Namespace, empty when cluster-scoped.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Immutable capture of a resource as it was observed.
///
/// The body is shared behind an `Arc`, so clones are cheap. Snapshots are
/// replaced wholesale in the cache and never mutated.
#[derive(Debug)]
pub struct ResourceSnapshot<K> {
    identity: ResourceIdentity,
    resource_version: Option<String>,
    observed_at: DateTime<Utc>,
    object: Arc<K>,
}

impl<K: Resource> ResourceSnapshot<K>
where
    K::DynamicType: Default,
{
    /// Captures an object, stamping it with the current time.
    ///
    /// # Errors
    ///
    /// Returns `MalformedNotification` when no identity can be derived.
    pub fn capture(object: K) -> Result<Self, WatchError> {
        let identity = ResourceIdentity::of(&object)?;
        let resource_version = object.meta().resource_version.clone();
        Ok(Self {
            identity,
            resource_version,
            observed_at: Utc::now(),
            object: Arc::new(object),
        })
    }
}

impl<K> ResourceSnapshot<K> {
    /// Cache key of the captured resource.
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// `metadata.resourceVersion` at capture time, if the server set one.
    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }

    /// When the snapshot was taken.
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// The captured body.
    pub fn object(&self) -> &K {
        &self.object
    }

    /// Shared handle to the captured body.
    pub fn shared(&self) -> Arc<K> {
        Arc::clone(&self.object)
    }

    /// Whether both snapshots describe the same observed state.
    ///
    /// Two snapshots without a resource version are never considered the same.
    pub fn same_version(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.resource_version.is_some()
            && self.resource_version == other.resource_version
    }
}

impl<K> Clone for ResourceSnapshot<K> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            resource_version: self.resource_version.clone(),
            observed_at: self.observed_at,
            object: Arc::clone(&self.object),
        }
    }
}

/// Equality ignores `observed_at`: two captures of the same body are equal.
impl<K: PartialEq> PartialEq for ResourceSnapshot<K> {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.resource_version == other.resource_version
            && self.object == other.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(namespace: Option<&str>, name: Option<&str>, version: Option<&str>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: name.map(str::to_string),
                namespace: namespace.map(str::to_string),
                resource_version: version.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_from_metadata() {
        let cm = config_map(Some("default"), Some("cfg1"), None);
        let identity = ResourceIdentity::of(&cm).expect("identity");
        assert_eq!(identity, ResourceIdentity::new("default", "cfg1"));
        assert_eq!(identity.to_string(), "default/cfg1");
    }

    #[test]
    fn test_identity_cluster_scoped_display() {
        let cm = config_map(None, Some("cfg1"), None);
        let identity = ResourceIdentity::of(&cm).expect("identity");
        assert_eq!(identity.namespace(), "");
        assert_eq!(identity.to_string(), "cfg1");
    }

    #[test]
    fn test_identity_requires_name() {
        let missing = config_map(Some("default"), None, None);
        let empty = config_map(Some("default"), Some(""), None);
        for cm in [missing, empty] {
            match ResourceIdentity::of(&cm) {
                Err(WatchError::MalformedNotification(msg)) => assert!(msg.contains("ConfigMap")),
                other => panic!("expected malformed notification, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_snapshot_capture_and_clone_share_body() {
        let snapshot = ResourceSnapshot::capture(config_map(Some("default"), Some("cfg1"), Some("7")))
            .expect("capture");
        let clone = snapshot.clone();
        assert!(Arc::ptr_eq(&snapshot.shared(), &clone.shared()));
        assert_eq!(snapshot.resource_version(), Some("7"));
        assert_eq!(snapshot, clone);
    }

    #[test]
    fn test_same_version_needs_a_version() {
        let a = ResourceSnapshot::capture(config_map(Some("default"), Some("cfg1"), None)).expect("capture");
        let b = ResourceSnapshot::capture(config_map(Some("default"), Some("cfg1"), None)).expect("capture");
        assert!(!a.same_version(&b));

        let c = ResourceSnapshot::capture(config_map(Some("default"), Some("cfg1"), Some("3"))).expect("capture");
        let d = ResourceSnapshot::capture(config_map(Some("default"), Some("cfg1"), Some("3"))).expect("capture");
        assert!(c.same_version(&d));
    }
}
