//! Main controller implementation.
//!
//! This module contains the `Controller` struct that builds the store client,
//! the reconciler and the watcher, and runs them next to the probe server
//! until one of them exits or the process is asked to stop.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::server;
use crate::watcher::{self, Context, WatcherSettings};
use kube::Client;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use store_client::KubeObjectStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Main controller for Webserver resources.
pub struct Controller {
    webserver_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Connect to the cluster and start the watcher and probe server.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        let kube_client = Client::try_default().await?;
        info!("Connected to Kubernetes API");

        let metrics = Arc::new(
            Metrics::new().map_err(|e| ControllerError::InvalidConfig(format!("metrics registry: {}", e)))?,
        );
        let store = KubeObjectStore::new(kube_client.clone()).with_field_manager(config.manager_name.clone());
        let reconciler = Reconciler::new(
            Box::new(store),
            ReconcilerSettings {
                manager_name: config.manager_name.clone(),
                requeue_after: config.requeue_after,
            },
        )
        .with_metrics(metrics.clone());

        let shutdown = CancellationToken::new();
        let ctx = Arc::new(Context::new(
            reconciler,
            metrics.clone(),
            WatcherSettings {
                debounce: config.debounce,
                concurrency: config.concurrency,
                reconcile_timeout: config.reconcile_timeout,
                backoff_base: config.backoff_base,
                backoff_max: config.backoff_max,
            },
            shutdown.clone(),
        ));

        let ready = Arc::new(AtomicBool::new(false));
        let probe_server = tokio::spawn(server::run_server(
            config.probe_addr,
            metrics,
            ready.clone(),
            shutdown.clone(),
        ));

        let webserver_watcher = {
            let namespace = config.namespace.clone();
            tokio::spawn(async move { watcher::watch_webservers(kube_client, namespace, ctx, ready).await })
        };

        Ok(Self {
            webserver_watcher,
            probe_server,
            shutdown,
        })
    }

    /// Run until a task exits or a shutdown signal arrives.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Webserver Controller running");

        let result = tokio::select! {
            result = &mut self.webserver_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Webserver watcher panicked: {}", e)))
                    .and_then(|r| r.map_err(|e| ControllerError::Watch(format!("Webserver watcher error: {}", e))))
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Server(format!("probe server panicked: {}", e)))
                    .and_then(|r| r)
            }
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
                }
                Ok(())
            }
        };

        self.shutdown.cancel();
        if let Err(e) = &result {
            warn!("Webserver Controller stopping: {}", e);
        }
        info!("Webserver Controller stopped");
        result
    }
}
