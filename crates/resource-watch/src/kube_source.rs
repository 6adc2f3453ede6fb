//! Kubernetes API watch source.
//!
//! `ApiWatchSource` lists and watches one collection through `kube::Api`.
//! Listing is paginated with continue tokens; watching requests bookmarks and
//! relies on the server-side timeout to end long-lived streams, after which
//! the informer re-watches from the last resource version it saw.

use crate::error::WatchError;
use crate::event::RawNotification;
use crate::source::{Listing, NotificationStream, WatchSource};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Default number of objects requested per list page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Default server-side watch timeout in seconds (the API server caps it below 295).
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;

/// Selection and paging settings for one watched collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchScope {
    /// Namespace, `None` for all namespaces
    pub namespace: Option<String>,
    /// Label selector applied to list and watch
    pub label_selector: Option<String>,
    /// Field selector applied to list and watch
    pub field_selector: Option<String>,
    /// Objects per list page
    pub page_size: u32,
    /// Server-side watch timeout in seconds
    pub watch_timeout: u32,
}

impl Default for WatchScope {
    fn default() -> Self {
        Self {
            namespace: None,
            label_selector: None,
            field_selector: None,
            page_size: DEFAULT_PAGE_SIZE,
            watch_timeout: DEFAULT_WATCH_TIMEOUT_SECS,
        }
    }
}

impl WatchScope {
    /// Parameters for one list page.
    pub fn list_params(&self, continue_token: Option<&str>) -> ListParams {
        let mut params = ListParams::default().limit(self.page_size);
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        if let Some(token) = continue_token {
            params = params.continue_token(token);
        }
        params
    }

    /// Parameters for a watch request.
    pub fn watch_params(&self) -> WatchParams {
        let mut params = WatchParams::default().timeout(self.watch_timeout);
        params.bookmarks = true;
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        params
    }

    fn describe(&self, kind: &str) -> String {
        let mut scope = match &self.namespace {
            Some(ns) => format!("{kind} in namespace {ns}"),
            None => format!("{kind} in all namespaces"),
        };
        if let Some(labels) = &self.label_selector {
            scope.push_str(&format!(" (labels: {labels})"));
        }
        if let Some(fields) = &self.field_selector {
            scope.push_str(&format!(" (fields: {fields})"));
        }
        scope
    }
}

/// `WatchSource` backed by the Kubernetes API.
#[derive(Clone)]
pub struct ApiWatchSource<K> {
    api: Api<K>,
    scope: WatchScope,
}

impl<K> Debug for ApiWatchSource<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiWatchSource").field("scope", &self.scope).finish_non_exhaustive()
    }
}

impl<K> ApiWatchSource<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    /// Watches `K` in `namespace` (e.g. ConfigMaps in "default").
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self::new(
            Api::namespaced(client, namespace),
            WatchScope {
                namespace: Some(namespace.to_string()),
                ..WatchScope::default()
            },
        )
    }
}

impl<K> ApiWatchSource<K> {
    /// Wraps an existing API handle; `scope` supplies selectors and paging.
    pub fn new(api: Api<K>, scope: WatchScope) -> Self {
        Self { api, scope }
    }

    /// Restricts list and watch to objects matching `selector`.
    #[must_use]
    pub fn with_label_selector(mut self, selector: impl Into<String>) -> Self {
        self.scope.label_selector = Some(selector.into());
        self
    }

    /// Restricts list and watch to objects matching `selector`.
    #[must_use]
    pub fn with_field_selector(mut self, selector: impl Into<String>) -> Self {
        self.scope.field_selector = Some(selector.into());
        self
    }

    /// Sets the list page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.scope.page_size = page_size;
        self
    }

    /// Sets the server-side watch timeout in seconds.
    #[must_use]
    pub fn with_watch_timeout(mut self, seconds: u32) -> Self {
        self.scope.watch_timeout = seconds;
        self
    }

    /// Selection and paging settings.
    pub fn scope(&self) -> &WatchScope {
        &self.scope
    }
}

#[async_trait::async_trait]
impl<K> WatchSource<K> for ApiWatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    async fn list(&self) -> Result<Listing<K>, WatchError> {
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let params = self.scope.list_params(continue_token.as_deref());
            let page = self
                .api
                .list(&params)
                .await
                .map_err(|e| WatchError::SourceUnavailable(format!("list {}: {e}", self.describe())))?;

            debug!("Listed {} objects from {}", page.items.len(), self.describe());
            items.extend(page.items);

            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => {
                    return Ok(Listing {
                        items,
                        resource_version: page.metadata.resource_version.unwrap_or_default(),
                    });
                }
            }
        }
    }

    async fn watch(&self, resource_version: &str) -> Result<NotificationStream<K>, WatchError> {
        let stream = self
            .api
            .watch(&self.scope.watch_params(), resource_version)
            .await
            .map_err(|e| WatchError::SourceUnavailable(format!("watch {}: {e}", self.describe())))?;

        Ok(stream.map(translate).boxed())
    }

    fn describe(&self) -> String {
        self.scope.describe(&K::kind(&K::DynamicType::default()))
    }
}

/// Maps a wire-level watch event onto the core's notification taxonomy.
pub fn translate<K>(event: kube::Result<WatchEvent<K>>) -> Result<RawNotification<K>, WatchError> {
    match event {
        Ok(WatchEvent::Added(obj)) => Ok(RawNotification::Created(obj)),
        Ok(WatchEvent::Modified(obj)) => Ok(RawNotification::Updated(obj)),
        Ok(WatchEvent::Deleted(obj)) => Ok(RawNotification::Deleted(obj)),
        Ok(WatchEvent::Bookmark(bookmark)) => Ok(RawNotification::Bookmark(bookmark.metadata.resource_version)),
        // 410 Gone lands here too: the resource version fell out of the watch window
        Ok(WatchEvent::Error(status)) => Err(WatchError::SourceUnavailable(format!(
            "watch error {}: {}",
            status.code, status.message
        ))),
        Err(kube::Error::SerdeError(e)) => Err(WatchError::MalformedNotification(e.to_string())),
        Err(e) => Err(WatchError::SourceUnavailable(e.to_string())),
    }
}
