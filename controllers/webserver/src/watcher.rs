//! Kubernetes resource watcher.
//!
//! Wires the reconcile core into kube_runtime::Controller, which plays the
//! scheduler: it delivers Webserver identities on changes to the Webserver or
//! to any Deployment, Service or ConfigMap it owns, debounces duplicates and
//! keeps at most one reconcile in flight per object.

use crate::backoff::ExponentialBackoff;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, ResourceIdentity};
use crds::Webserver;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Api, ResourceExt};
use kube_runtime::{Controller, controller::{Action, Config as ControllerConfig}, watcher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: ExponentialBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(base, max),
            error_count: 0,
        }
    }
}

/// Scheduling parameters for the watcher.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub debounce: Duration,
    pub concurrency: u16,
    pub reconcile_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Shared state handed to every reconcile and error-policy call.
pub struct Context {
    reconciler: Reconciler,
    metrics: Arc<Metrics>,
    settings: WatcherSettings,
    shutdown: CancellationToken,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl Context {
    pub fn new(
        reconciler: Reconciler,
        metrics: Arc<Metrics>,
        settings: WatcherSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            metrics,
            settings,
            shutdown,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Next retry delay for `key`; advances its backoff.
    fn next_backoff(&self, key: &str) -> (Duration, u32) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffState::new(self.settings.backoff_base, self.settings.backoff_max));
        state.error_count += 1;
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Forget the error history of `key` after a successful pass.
    fn reset_backoff(&self, key: &str) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = states.remove(key) {
            debug!("Resetting backoff for {} after {} errors", key, state.error_count);
        }
    }

    #[cfg(test)]
    fn tracked_backoffs(&self) -> usize {
        self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds the readiness flag up while the watch loop runs.
struct ReadyGuard {
    ready: Arc<AtomicBool>,
}

impl ReadyGuard {
    fn mark(ready: Arc<AtomicBool>) -> Self {
        ready.store(true, Ordering::Relaxed);
        Self { ready }
    }
}

impl Drop for ReadyGuard {
    fn drop(&mut self) {
        self.ready.store(false, Ordering::Relaxed);
    }
}

fn identity_of(webserver: &Webserver) -> ResourceIdentity {
    ResourceIdentity::new(webserver.namespace().unwrap_or_default(), webserver.name_any())
}

/// Reconcile entry point called by kube_runtime.
///
/// Each pass gets a child of the shutdown token that also fires when the
/// reconcile timeout elapses.
async fn reconcile(webserver: Arc<Webserver>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let identity = identity_of(&webserver);
    debug!("Reconciling Webserver {}", identity);

    let cancel = ctx.shutdown.child_token();
    let deadline = {
        let cancel = cancel.clone();
        let timeout = ctx.settings.reconcile_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        })
    };

    let started = Instant::now();
    let result = ctx.reconciler.reconcile(&identity, &cancel).await;
    deadline.abort();

    match result {
        Ok(report) => {
            debug!(
                "Webserver {}: {} dependents checked, status written: {}",
                identity,
                report.outcomes.len(),
                report.status_written
            );
            ctx.metrics.record_reconcile("success", started.elapsed());
            ctx.reset_backoff(&identity.to_string());
            Ok(report.requeue_after.map_or_else(Action::await_change, Action::requeue))
        }
        Err(e) => {
            ctx.metrics.record_reconcile(e.metric_label(), started.elapsed());
            Err(e)
        }
    }
}

/// Retry policy for failed passes.
fn error_policy(webserver: Arc<Webserver>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let identity = identity_of(&webserver);
    if error.requeue_immediately() {
        warn!("Conflict reconciling Webserver {}, retrying now: {}", identity, error);
        return Action::requeue(Duration::ZERO);
    }
    if !error.is_retryable() {
        warn!("Webserver {} needs a spec change: {}", identity, error);
        return Action::await_change();
    }
    let (delay, attempt) = ctx.next_backoff(&identity.to_string());
    error!(
        "Reconciliation error for Webserver {} (attempt {}), retrying in {}s: {}",
        identity,
        attempt,
        delay.as_secs(),
        error
    );
    Action::requeue(delay)
}

/// Watch Webserver resources and everything they own until the stream ends
/// or `shutdown` fires.
/// `ready` is raised once the controller stream is built and lowered when the
/// loop exits.
pub async fn watch_webservers(
    client: kube::Client,
    namespace: Option<String>,
    ctx: Arc<Context>,
    ready: Arc<AtomicBool>,
) -> Result<(), ControllerError> {
    let (webservers, deployments, services, config_maps) = match namespace.as_deref() {
        Some(ns) => (
            Api::<Webserver>::namespaced(client.clone(), ns),
            Api::<Deployment>::namespaced(client.clone(), ns),
            Api::<Service>::namespaced(client.clone(), ns),
            Api::<ConfigMap>::namespaced(client, ns),
        ),
        None => (
            Api::<Webserver>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
            Api::<Service>::all(client.clone()),
            Api::<ConfigMap>::all(client),
        ),
    };

    info!("Starting Webserver watcher");
    let controller_config = ControllerConfig::default()
        .debounce(ctx.settings.debounce)
        .concurrency(ctx.settings.concurrency);
    let shutdown = ctx.shutdown.clone();

    let controller = Controller::new(webservers, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .owns(config_maps, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => debug!(
                    "Reconciled {}/{}",
                    object.namespace.as_deref().unwrap_or_default(),
                    object.name
                ),
                Err(e) => warn!("Controller error for Webserver: {}", e),
            }
        });

    let _ready = ReadyGuard::mark(ready);
    // In-flight passes see the same token through their child tokens.
    tokio::select! {
        _ = controller => {}
        _ = shutdown.cancelled() => {}
    }

    info!("Webserver watcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::ReconcilerSettings;
    use store_client::MockObjectStore;

    fn test_context() -> Context {
        let store = MockObjectStore::new();
        let reconciler = Reconciler::new(
            Box::new(store),
            ReconcilerSettings {
                manager_name: "webserver-operator".to_string(),
                requeue_after: Duration::from_secs(300),
            },
        );
        Context::new(
            reconciler,
            Arc::new(Metrics::new().unwrap()),
            WatcherSettings {
                debounce: Duration::from_secs(5),
                concurrency: 3,
                reconcile_timeout: Duration::from_secs(30),
                backoff_base: Duration::from_secs(5),
                backoff_max: Duration::from_secs(300),
            },
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_backoff_per_resource_and_reset() {
        let ctx = test_context();
        assert_eq!(ctx.next_backoff("default/a"), (Duration::from_secs(5), 1));
        assert_eq!(ctx.next_backoff("default/a"), (Duration::from_secs(10), 2));
        // Independent per identity
        assert_eq!(ctx.next_backoff("default/b"), (Duration::from_secs(5), 1));

        ctx.reset_backoff("default/a");
        assert_eq!(ctx.next_backoff("default/a"), (Duration::from_secs(5), 1));
    }

    #[test]
    fn test_success_drops_backoff_entry() {
        let ctx = test_context();
        ctx.next_backoff("default/a");
        ctx.next_backoff("default/b");
        assert_eq!(ctx.tracked_backoffs(), 2);

        ctx.reset_backoff("default/a");
        ctx.reset_backoff("default/gone");
        assert_eq!(ctx.tracked_backoffs(), 1);
    }

    #[test]
    fn test_ready_guard_tracks_watch_loop() {
        let ready = Arc::new(AtomicBool::new(false));
        let guard = ReadyGuard::mark(ready.clone());
        assert!(ready.load(Ordering::Relaxed));
        drop(guard);
        assert!(!ready.load(Ordering::Relaxed));
    }
}
