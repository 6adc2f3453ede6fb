//! Main controller implementation.
//!
//! Wires the Kubernetes watch source, the dispatcher with the logging
//! handlers, and the informer task, then waits for a shutdown signal.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::handlers;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use resource_watch::{ApiWatchSource, Dispatcher, Informer, WatchHandle};
use tracing::info;

/// ConfigMap watch controller.
pub struct Controller {
    watch: WatchHandle,
}

impl Controller {
    /// Creates the controller and starts watching.
    pub async fn new(config: &ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing ConfigMap Controller");

        let client = Client::try_default().await?;

        let mut source =
            ApiWatchSource::<ConfigMap>::namespaced(client, &config.namespace).with_watch_timeout(config.watch_timeout);
        if let Some(selector) = &config.label_selector {
            source = source.with_label_selector(selector.clone());
        }
        if let Some(selector) = &config.field_selector {
            source = source.with_field_selector(selector.clone());
        }

        let mut dispatcher = Dispatcher::with_diff_reporter(config.diff_reporter());
        handlers::register(&mut dispatcher);

        let watch = Informer::new(source, dispatcher, config.informer_config()).spawn();

        Ok(Self { watch })
    }

    /// Runs the controller until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("ConfigMap Controller running");

        let cancel = self.watch.cancellation_token();
        let watch = self.watch.join();
        tokio::pin!(watch);

        let result = tokio::select! {
            result = &mut watch => result,
            signal = shutdown_signal() => {
                signal?;
                info!("Shutdown signal received, stopping watch");
                cancel.cancel();
                watch.await
            }
        };
        result.map_err(|e| ControllerError::Watch(e.to_string()))?;

        info!("ConfigMap Controller stopped");
        Ok(())
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
