//! ConfigMap Controller
//!
//! Watches ConfigMaps in one namespace and logs every addition, modification
//! and deletion. Modifications are logged with the prior ConfigMap and a
//! JSON Patch describing what changed.

mod config;
mod controller;
mod error;
mod handlers;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // kube's rustls stack needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting ConfigMap Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Label selector: {}", config.label_selector.as_deref().unwrap_or("(none)"));
    info!("  Field selector: {}", config.field_selector.as_deref().unwrap_or("(none)"));
    match config.resync_interval {
        Some(interval) => info!("  Resync interval: {:?}", interval),
        None => info!("  Resync interval: disabled"),
    }
    info!("  Reconnect delay: {:?}", config.reconnect_delay);
    info!("  Watch timeout: {}s", config.watch_timeout);
    info!("  Diff ignores: {:?}", config.diff_reporter().ignored_paths());

    let controller = Controller::new(&config).await?;
    controller.run().await?;

    Ok(())
}
