//! Object store errors

use thiserror::Error;

/// Errors that can occur when talking to the object store
///
/// Every store call is a single attempt. Callers decide what to do with a
/// failure based on its class: conflicts are worth an immediate retry,
/// transient faults a delayed one, and rejections a spec change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency clash (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Create raced another writer
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Transport fault, timeout, throttling or server-side error
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Request refused (invalid, forbidden, unprocessable)
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Object stored under a key holds a different kind than requested
    #[error("Kind mismatch: {0}")]
    KindMismatch(String),
}

impl StoreError {
    /// Classifies an API status response.
    ///
    /// `reason` is the Kubernetes `Status.reason` ("AlreadyExists", "Conflict", ...),
    /// used to tell a duplicate create from a stale update since both are 409.
    pub fn from_status(code: u16, reason: &str, message: String) -> Self {
        match code {
            404 => StoreError::NotFound(message),
            409 if reason == "AlreadyExists" => StoreError::AlreadyExists(message),
            409 => StoreError::Conflict(message),
            408 | 429 => StoreError::Unavailable(message),
            500..=599 => StoreError::Unavailable(message),
            _ => StoreError::Rejected(format!("{} ({}): {}", reason, code, message)),
        }
    }

    /// Whether retrying the same call later can succeed without a spec change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict(_) | StoreError::AlreadyExists(_) | StoreError::Unavailable(_)
        )
    }

    /// Whether this is an optimistic concurrency clash.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::AlreadyExists(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) => {
                StoreError::from_status(response.code, &response.reason, response.message.clone())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}
