//! Controller-specific error types.
//!
//! This module defines the error taxonomy the reconcile core reports to the
//! scheduler. The error class decides the retry policy in `watcher.rs`.

use kube::Error as KubeError;
use store_client::StoreError;
use thiserror::Error;

/// Spec values the synthesizer refuses to turn into dependents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Replica count outside the supported range
    #[error("replicas must be between {min} and {max}, got {value}")]
    ReplicasOutOfRange { value: i32, min: i32, max: i32 },

    /// Port outside 1-65535
    #[error("port must be between 1 and 65535, got {0}")]
    PortOutOfRange(i32),

    /// Service type not in the supported set
    #[error("unsupported service type {0:?}, expected ClusterIP, NodePort or LoadBalancer")]
    UnknownServiceType(String),

    /// Image reference left empty after defaulting
    #[error("image must not be empty")]
    EmptyImage,

    /// Page colour that is not a hex colour or a colour keyword
    #[error("color {0:?} is not a CSS hex colour or colour name")]
    InvalidColor(String),

    /// Derived dependent name would not be a valid object name
    #[error("dependent name {0:?} is longer than 63 characters")]
    NameTooLong(String),
}

/// Errors that can occur in the Webserver Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Optimistic concurrency clash; retry right away
    #[error("Store conflict: {0}")]
    StoreConflict(String),

    /// Transient store fault; retry with backoff
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other store failure
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Desired state cannot be realised
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Some dependents failed to converge while others succeeded
    #[error("{failed} of {total} dependents failed to converge: {summary}")]
    PartialFailure {
        failed: usize,
        total: usize,
        summary: String,
        /// Every failure was an optimistic concurrency clash
        conflicts_only: bool,
    },

    /// Pass stopped by its deadline or by shutdown
    #[error("Reconcile cancelled: {0}")]
    Cancelled(String),

    /// Fetched resource is missing identity fields
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe/metrics server failed
    #[error("Probe server failed: {0}")]
    Server(String),
}

impl From<StoreError> for ControllerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(msg) | StoreError::AlreadyExists(msg) => ControllerError::StoreConflict(msg),
            StoreError::Unavailable(msg) => ControllerError::StoreUnavailable(msg),
            other => ControllerError::Store(other),
        }
    }
}

impl ControllerError {
    /// Whether the scheduler should requeue without waiting.
    pub fn requeue_immediately(&self) -> bool {
        matches!(
            self,
            ControllerError::StoreConflict(_) | ControllerError::PartialFailure { conflicts_only: true, .. }
        )
    }

    /// Whether retrying without a spec change can help.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ControllerError::Validation(_) | ControllerError::InvalidResource(_) | ControllerError::InvalidConfig(_)
        )
    }

    /// Short label for the `result` dimension of reconcile metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ControllerError::StoreConflict(_) => "conflict",
            ControllerError::StoreUnavailable(_) => "unavailable",
            ControllerError::Validation(_) | ControllerError::InvalidResource(_) => "invalid",
            ControllerError::PartialFailure { .. } => "partial_failure",
            ControllerError::Cancelled(_) => "cancelled",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_retry_classes() {
        let conflict: ControllerError = StoreError::Conflict("stale".to_string()).into();
        assert!(matches!(conflict, ControllerError::StoreConflict(_)));
        assert!(conflict.requeue_immediately());

        let unavailable: ControllerError = StoreError::Unavailable("timeout".to_string()).into();
        assert!(matches!(unavailable, ControllerError::StoreUnavailable(_)));
        assert!(!unavailable.requeue_immediately());
        assert!(unavailable.is_retryable());

        let rejected: ControllerError = StoreError::Rejected("forbidden".to_string()).into();
        assert!(matches!(rejected, ControllerError::Store(_)));
    }

    #[test]
    fn test_validation_is_not_retried() {
        let error = ControllerError::from(ValidationError::PortOutOfRange(70000));
        assert!(!error.is_retryable());
        assert_eq!(error.metric_label(), "invalid");
        assert!(error.to_string().contains("70000"));
    }

    #[test]
    fn test_partial_failure_of_conflicts_requeues_immediately() {
        let error = ControllerError::PartialFailure {
            failed: 1,
            total: 3,
            summary: "Service default/demo-service: Conflict".to_string(),
            conflicts_only: true,
        };
        assert!(error.requeue_immediately());
        assert_eq!(error.to_string(), "1 of 3 dependents failed to converge: Service default/demo-service: Conflict");
    }
}
