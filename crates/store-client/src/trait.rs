//! ObjectStore trait for mocking
//!
//! This trait abstracts the cluster object store so the reconciler can be
//! driven against `KubeObjectStore` in production and `MockObjectStore` in tests.

use crate::error::StoreError;
use crate::object::{DependentObject, ObjectKey};
use crds::{Webserver, WebserverStatus};

/// Trait for object store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Each call is a single attempt; retry policy belongs to the caller's scheduler.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a Webserver. `Ok(None)` when it does not exist.
    async fn get_webserver(&self, namespace: &str, name: &str) -> Result<Option<Webserver>, StoreError>;

    /// Merge-patch the status subresource of a Webserver.
    async fn patch_webserver_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WebserverStatus,
    ) -> Result<(), StoreError>;

    /// Fetch a dependent object. `Ok(None)` when it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<DependentObject>, StoreError>;

    /// Create a dependent object, returning what the store persisted.
    async fn create(&self, object: &DependentObject) -> Result<DependentObject, StoreError>;

    /// Replace a dependent object. The object's `resourceVersion` must match
    /// the stored one, otherwise the store answers `Conflict`.
    async fn update(&self, object: &DependentObject) -> Result<DependentObject, StoreError>;
}
