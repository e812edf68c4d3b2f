//! Webserver Controller
//!
//! Reconciles Webserver resources: for each one it keeps a Deployment, a
//! Service and a ConfigMap with generated HTML in the declared shape, and
//! reports readiness back through the Webserver status.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod server;
mod test_utils;
mod watcher;

use anyhow::Context as _;
use config::Config;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls stack needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting Webserver Controller");

    let config = Config::from_env().context("loading configuration")?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Manager: {}", config.manager_name);
    info!("  Requeue after: {}s", config.requeue_after.as_secs());
    info!("  Probe address: {}", config.probe_addr);

    let controller = Controller::new(config).await.context("starting controller")?;
    controller.run().await.context("controller exited with an error")?;

    Ok(())
}
