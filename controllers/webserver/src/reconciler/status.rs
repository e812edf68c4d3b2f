//! Status reduction.
//!
//! Derives the Webserver status from what the dependents report. The
//! condition list is rebuilt on every pass; only `lastTransitionTime` is
//! carried over when a condition keeps its status.

use super::desired::DesiredState;
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use crds::{CONDITION_READY, Condition, ConditionStatus, WebserverPhase, WebserverStatus};
use k8s_openapi::api::apps::v1::Deployment;

pub const REASON_SUCCEEDED: &str = "ReconciliationSucceeded";
pub const REASON_REPLICAS_NOT_READY: &str = "ReplicasNotReady";
pub const REASON_VALIDATION_FAILED: &str = "ValidationFailed";
pub const REASON_DEPENDENTS_NOT_CONVERGED: &str = "DependentsNotConverged";

/// Readiness observed on the dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedStatus {
    pub ready_replicas: i32,
    pub phase: WebserverPhase,
}

/// Ready replicas reported by a Deployment; 0 when it has no status yet.
pub fn ready_replicas(workload: Option<&Deployment>) -> i32 {
    workload
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}

/// Compare observed readiness with the desired replica count.
pub fn reduce(
    desired: &DesiredState,
    workload: Option<&Deployment>,
    now: DateTime<Utc>,
) -> (ObservedStatus, Vec<Condition>) {
    let ready = ready_replicas(workload);
    if ready == desired.replicas {
        let condition = Condition::new(
            CONDITION_READY,
            ConditionStatus::True,
            REASON_SUCCEEDED,
            "Webserver is ready",
            now,
        );
        return (
            ObservedStatus {
                ready_replicas: ready,
                phase: WebserverPhase::Ready,
            },
            vec![condition],
        );
    }

    let condition = Condition::new(
        CONDITION_READY,
        ConditionStatus::False,
        REASON_REPLICAS_NOT_READY,
        format!("Expected {} replicas, got {}", desired.replicas, ready),
        now,
    );
    (
        ObservedStatus {
            ready_replicas: ready,
            phase: WebserverPhase::Reconciling,
        },
        vec![condition],
    )
}

/// Status for a spec the synthesizer rejected.
pub fn reduce_validation_failure(
    error: &ValidationError,
    prior: Option<&WebserverStatus>,
    now: DateTime<Utc>,
) -> (ObservedStatus, Vec<Condition>) {
    let condition = Condition::new(
        CONDITION_READY,
        ConditionStatus::False,
        REASON_VALIDATION_FAILED,
        error.to_string(),
        now,
    );
    (
        ObservedStatus {
            ready_replicas: prior.map_or(0, |s| s.ready_replicas),
            phase: WebserverPhase::Failed,
        },
        vec![condition],
    )
}

/// Status for a pass where some dependents failed to converge.
pub fn reduce_partial_failure(
    workload: Option<&Deployment>,
    summary: &str,
    now: DateTime<Utc>,
) -> (ObservedStatus, Vec<Condition>) {
    let condition = Condition::new(
        CONDITION_READY,
        ConditionStatus::False,
        REASON_DEPENDENTS_NOT_CONVERGED,
        summary,
        now,
    );
    (
        ObservedStatus {
            ready_replicas: ready_replicas(workload),
            phase: WebserverPhase::Reconciling,
        },
        vec![condition],
    )
}

/// Assemble the status to write.
///
/// A condition whose status matches the prior condition of the same type
/// keeps the prior `lastTransitionTime`, so an unchanged state produces an
/// identical status and no write.
pub fn compose(
    desired: &DesiredState,
    observed: ObservedStatus,
    conditions: Vec<Condition>,
    prior: Option<&WebserverStatus>,
) -> WebserverStatus {
    let conditions = conditions
        .into_iter()
        .map(|mut condition| {
            let carried = prior
                .and_then(|p| p.condition(&condition.r#type))
                .filter(|previous| previous.status == condition.status)
                .and_then(|previous| previous.last_transition_time);
            if carried.is_some() {
                condition.last_transition_time = carried;
            }
            condition
        })
        .collect();

    WebserverStatus {
        observed_generation: desired.generation,
        ready_replicas: observed.ready_replicas,
        phase: Some(observed.phase),
        conditions,
    }
}
