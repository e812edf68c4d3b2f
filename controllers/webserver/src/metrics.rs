//! Prometheus metrics for the Webserver Controller.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `webserver_reconcile_total` | Counter | `result` |
//! | `webserver_dependent_operations_total` | Counter | `kind`, `operation` |
//! | `webserver_reconcile_duration_seconds` | Histogram | |
//!
//! Each `Metrics` owns its registry, so tests can build as many as they like.

use crate::reconciler::ReconcileOutcome;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Reconcile duration buckets in seconds.
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounterVec,
    dependent_operations_total: IntCounterVec,
    reconcile_duration: Histogram,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create the metrics and register them with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new("webserver_reconcile_total", "Reconcile passes by result"),
            &["result"],
        )?;
        let dependent_operations_total = IntCounterVec::new(
            Opts::new(
                "webserver_dependent_operations_total",
                "Dependent create/update decisions by kind and operation",
            ),
            &["kind", "operation"],
        )?;
        let reconcile_duration = Histogram::with_opts(
            HistogramOpts::new("webserver_reconcile_duration_seconds", "Wall time of a reconcile pass")
                .buckets(DURATION_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(dependent_operations_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            dependent_operations_total,
            reconcile_duration,
        })
    }

    pub fn record_reconcile(&self, result: &str, elapsed: Duration) {
        self.reconcile_total.with_label_values(&[result]).inc();
        self.reconcile_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_outcomes(&self, outcomes: &[ReconcileOutcome]) {
        for outcome in outcomes {
            let operation = match (outcome.operation(), outcome.error()) {
                (Some(operation), _) => operation.as_str(),
                (None, Some(_)) => "failed",
                (None, None) => "not_attempted",
            };
            self.dependent_operations_total
                .with_label_values(&[outcome.kind.as_str(), operation])
                .inc();
        }
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
