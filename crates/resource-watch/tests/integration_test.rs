//! Integration tests for the watch core
//!
//! The scripted tests run everywhere. The cluster test needs a reachable
//! Kubernetes API (KUBECONFIG or in-cluster) and permission to manage
//! ConfigMaps in TEST_NAMESPACE (default: "default").

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use resource_watch::mock::config_map;
use resource_watch::{
    ApiWatchSource, ChangeEvent, DiffReport, Dispatcher, EventKind, Informer, InformerConfig, MockWatchSource,
    RawNotification, WatchError,
};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(30);

/// Helper to create a dispatcher that forwards a summary of each event
fn forwarding_dispatcher() -> (Dispatcher<ConfigMap>, mpsc::UnboundedReceiver<(EventKind, String, String)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::<ConfigMap>::new();
    for kind in EventKind::ALL {
        let tx = tx.clone();
        dispatcher.register(kind, move |event: &ChangeEvent<ConfigMap>| -> anyhow::Result<()> {
            let diff = event.diff().map(ToString::to_string).unwrap_or_default();
            tx.send((event.kind(), event.identity().name().to_string(), diff))?;
            Ok(())
        });
    }
    (dispatcher, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<(EventKind, String, String)>) -> (EventKind, String, String) {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event within timeout")
        .expect("dispatcher alive")
}

#[tokio::test]
async fn test_scripted_lifecycle() {
    let source = MockWatchSource::new();
    source.push_listing(vec![config_map("cfg1", Some("1"), &[("k", "v1")])], "1");
    source.push_watch(vec![
        Ok(RawNotification::Updated(config_map("cfg1", Some("2"), &[("k", "v2")]))),
        Ok(RawNotification::Deleted(config_map("cfg1", Some("3"), &[("k", "v2")]))),
        Err(WatchError::SourceUnavailable("watch error 410: Expired".to_string())),
    ]);
    source.push_listing(vec![config_map("cfg2", Some("5"), &[])], "5");

    let (dispatcher, mut rx) = forwarding_dispatcher();
    let config = InformerConfig {
        reconnect_delay: Some(Duration::from_millis(10)),
        ..InformerConfig::default()
    };
    let informer = Informer::new(source.clone(), dispatcher, config);
    let cache = informer.cache();
    let handle = informer.spawn();

    assert_eq!(next(&mut rx).await, (EventKind::Added, "cfg1".to_string(), String::new()));

    let (kind, name, diff) = next(&mut rx).await;
    assert_eq!((kind, name.as_str()), (EventKind::Modified, "cfg1"));
    assert_eq!(diff, r#"[{"op":"replace","path":"/data/k","value":"v2"}]"#);

    assert_eq!(next(&mut rx).await.0, EventKind::Deleted);
    assert_eq!(next(&mut rx).await, (EventKind::Added, "cfg2".to_string(), String::new()));

    assert_eq!(source.list_calls(), 2);
    let names: Vec<String> = cache
        .snapshots()
        .iter()
        .map(|s| s.identity().name().to_string())
        .collect();
    assert_eq!(names, vec!["cfg2"]);

    handle.close().await.expect("clean shutdown");
}

#[tokio::test]
#[ignore] // Requires a Kubernetes cluster
async fn test_configmap_lifecycle_against_cluster() {
    let namespace = std::env::var("TEST_NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let name = format!("resource-watch-it-{}", std::process::id());

    let client = Client::try_default().await.expect("Failed to create client");
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);

    let source = ApiWatchSource::<ConfigMap>::namespaced(client, &namespace)
        .with_field_selector(format!("metadata.name={name}"));
    let (dispatcher, mut rx) = forwarding_dispatcher();
    let handle = Informer::new(source, dispatcher, InformerConfig::default()).spawn();

    let mut created = config_map(&name, None, &[("k", "v1")]);
    created.metadata.namespace = Some(namespace.clone());
    api.create(&PostParams::default(), &created)
        .await
        .expect("Failed to create ConfigMap");
    assert_eq!(next(&mut rx).await.0, EventKind::Added);

    api.patch(&name, &PatchParams::default(), &Patch::Merge(json!({"data": {"k": "v2"}})))
        .await
        .expect("Failed to patch ConfigMap");
    let (kind, _, diff) = next(&mut rx).await;
    assert_eq!(kind, EventKind::Modified);
    assert!(diff.contains("/data/k"), "unexpected diff: {diff}");
    assert_ne!(diff, DiffReport::PriorUnknown.to_string());

    api.delete(&name, &DeleteParams::default())
        .await
        .expect("Failed to delete ConfigMap");
    assert_eq!(next(&mut rx).await.0, EventKind::Deleted);

    handle.close().await.expect("clean shutdown");
}
