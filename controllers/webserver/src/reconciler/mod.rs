//! Reconciliation logic for Webserver resources.
//!
//! One pass is fetch, synthesize, converge, reduce:
//! - `desired`: fetches the Webserver and applies defaults
//! - `synthesizer`: derives the Deployment, Service and ConfigMap
//! - `convergence`: create-or-update of each dependent against the store
//! - `status`: derives status and conditions from the dependents

pub mod convergence;
pub mod desired;
pub mod status;
pub mod synthesizer;

#[cfg(test)]
mod reconciler_test;
#[cfg(test)]
mod synthesizer_test;

pub use convergence::{ConvergenceEngine, ReconcileOutcome};
pub use desired::ResourceIdentity;

use crate::error::ControllerError;
use crate::metrics::Metrics;
use chrono::Utc;
use crds::WebserverStatus;
use std::sync::Arc;
use std::time::Duration;
use store_client::{ObjectKind, ObjectStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Settings the reconcile core needs from the controller configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Value of the `managed-by` label
    pub manager_name: String,
    /// Steady-state re-check interval
    pub requeue_after: Duration,
}

/// What a successful pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    /// When to look at the resource again; `None` when it is gone
    pub requeue_after: Option<Duration>,
    pub outcomes: Vec<ReconcileOutcome>,
    pub status_written: bool,
}

/// Reconciles Webserver resources.
///
/// Holds no per-resource state: every pass works on values it fetched itself,
/// so passes for different resources can run concurrently.
pub struct Reconciler {
    store: Box<dyn ObjectStore>,
    settings: ReconcilerSettings,
    metrics: Option<Arc<Metrics>>,
}

impl Reconciler {
    pub fn new(store: Box<dyn ObjectStore>, settings: ReconcilerSettings) -> Self {
        Self {
            store,
            settings,
            metrics: None,
        }
    }

    /// Record per-dependent operations on `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one reconcile pass for `identity`.
    ///
    /// Returns `Ok` with no requeue when the Webserver no longer exists.
    /// Dependent failures do not stop the pass; they are aggregated into a
    /// `PartialFailure` after status has been written.
    pub async fn reconcile(
        &self,
        identity: &ResourceIdentity,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ControllerError> {
        let Some(fetched) = desired::fetch(self.store.as_ref(), identity).await? else {
            info!("Webserver {} not found, nothing to reconcile", identity);
            return Ok(ReconcileReport {
                requeue_after: None,
                outcomes: Vec::new(),
                status_written: false,
            });
        };
        let desired = fetched.desired;
        let prior = fetched.status;
        let now = Utc::now();

        let specs = match synthesizer::synthesize(&desired, &self.settings.manager_name, now) {
            Ok(specs) => specs,
            Err(e) => {
                warn!("Webserver {} has an invalid spec: {}", identity, e);
                let (observed, conditions) = status::reduce_validation_failure(&e, prior.as_ref(), now);
                let new_status = status::compose(&desired, observed, conditions, prior.as_ref());
                self.write_status(identity, prior.as_ref(), &new_status).await?;
                return Err(ControllerError::Validation(e));
            }
        };

        let engine = ConvergenceEngine::new(self.store.as_ref());
        let outcomes = engine.converge(&desired.owner_reference(), &specs, cancel).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_outcomes(&outcomes);
        }

        if outcomes.iter().any(ReconcileOutcome::is_not_attempted) {
            let done = outcomes.iter().filter(|o| !o.is_not_attempted()).count();
            return Err(ControllerError::Cancelled(format!(
                "Webserver {} converged {} of {} dependents before cancellation",
                identity,
                done,
                outcomes.len()
            )));
        }

        let workload = outcomes
            .iter()
            .filter(|o| o.kind == ObjectKind::Deployment)
            .find_map(|o| o.observed.as_ref())
            .and_then(|o| o.as_deployment());

        let failures: Vec<&ReconcileOutcome> = outcomes.iter().filter(|o| o.error().is_some()).collect();
        let summary = failures.iter().map(|o| o.to_string()).collect::<Vec<_>>().join("; ");

        let (observed, conditions) = if failures.is_empty() {
            status::reduce(&desired, workload, now)
        } else {
            status::reduce_partial_failure(workload, &summary, now)
        };
        let new_status = status::compose(&desired, observed, conditions, prior.as_ref());
        let status_written = self.write_status(identity, prior.as_ref(), &new_status).await?;

        if !failures.is_empty() {
            let conflicts_only = failures.iter().all(|o| o.error().is_some_and(StoreError::is_conflict));
            return Err(ControllerError::PartialFailure {
                failed: failures.len(),
                total: outcomes.len(),
                summary,
                conflicts_only,
            });
        }

        info!(
            "Reconciled Webserver {}: {} ({}/{} replicas ready)",
            identity, observed.phase, observed.ready_replicas, desired.replicas
        );
        Ok(ReconcileReport {
            requeue_after: Some(self.settings.requeue_after),
            outcomes,
            status_written,
        })
    }

    /// Patch status when it differs from `prior`. Returns whether a write was issued.
    async fn write_status(
        &self,
        identity: &ResourceIdentity,
        prior: Option<&WebserverStatus>,
        new_status: &WebserverStatus,
    ) -> Result<bool, ControllerError> {
        if prior == Some(new_status) {
            debug!("Webserver {} status unchanged, skipping update", identity);
            return Ok(false);
        }
        match self
            .store
            .patch_webserver_status(&identity.namespace, &identity.name, new_status)
            .await
        {
            Ok(()) => {
                debug!("Updated Webserver {} status", identity);
                Ok(true)
            }
            // Deleted mid-pass; dependents go with it.
            Err(StoreError::NotFound(_)) => {
                info!("Webserver {} deleted before status update", identity);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
