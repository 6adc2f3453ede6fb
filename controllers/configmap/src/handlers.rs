//! Logging handlers for ConfigMap events.
//!
//! Every change is logged with the full ConfigMap body; modifications also
//! carry the prior body and the JSON Patch from prior to current.

use k8s_openapi::api::core::v1::ConfigMap;
use resource_watch::{ChangeEvent, DiffReport, Dispatcher, EventKind};
use tracing::info;

/// Registers the logging handlers for all three event kinds.
pub fn register(dispatcher: &mut Dispatcher<ConfigMap>) {
    dispatcher
        .register(EventKind::Added, on_added)
        .register(EventKind::Modified, on_modified)
        .register(EventKind::Deleted, on_deleted);
}

fn on_added(event: &ChangeEvent<ConfigMap>) -> anyhow::Result<()> {
    let message = added_message(event.resource().object())?;
    info!(identity = %event.identity(), "{}", message);
    Ok(())
}

fn on_modified(event: &ChangeEvent<ConfigMap>) -> anyhow::Result<()> {
    let prior = event.prior().map(|p| p.object());
    let diff = event.diff().unwrap_or(&DiffReport::PriorUnknown);
    let message = modified_message(event.resource().object(), prior, diff)?;
    info!(identity = %event.identity(), "{}", message);
    Ok(())
}

fn on_deleted(event: &ChangeEvent<ConfigMap>) -> anyhow::Result<()> {
    let message = deleted_message(event.resource().object())?;
    info!(identity = %event.identity(), "{}", message);
    Ok(())
}

/// Log line for an added ConfigMap.
pub fn added_message(config_map: &ConfigMap) -> serde_json::Result<String> {
    Ok(format!("ConfigMap added.\n{}", render(config_map)?))
}

/// Log line for a modified ConfigMap. Without a prior the old body is `(unknown)`
/// and no diff is printed.
pub fn modified_message(
    current: &ConfigMap,
    prior: Option<&ConfigMap>,
    diff: &DiffReport,
) -> serde_json::Result<String> {
    let new = render(current)?;
    match prior {
        Some(prior) => Ok(format!(
            "ConfigMap modified.\n  Old ConfigMap:\n{}\n  New ConfigMap:\n{}\n  Diff:\n{}\n",
            render(prior)?,
            new,
            diff
        )),
        None => Ok(format!(
            "ConfigMap modified.\n  Old ConfigMap:\n(unknown)\n  New ConfigMap:\n{new}\n"
        )),
    }
}

/// Log line for a deleted ConfigMap.
pub fn deleted_message(config_map: &ConfigMap) -> serde_json::Result<String> {
    Ok(format!("ConfigMap deleted.\n{}", render(config_map)?))
}

fn render(config_map: &ConfigMap) -> serde_json::Result<String> {
    serde_json::to_string_pretty(config_map)
}
