//! Mock ObjectStore for unit testing
//!
//! This module provides an in-memory implementation of `ObjectStore` that
//! behaves like the API server where the reconciler cares: uids and
//! resourceVersions are assigned, stale updates conflict, Services get a
//! cluster IP, and Deployment status survives spec updates.

use crate::error::StoreError;
use crate::object::{DependentObject, ObjectKey};
use crate::store_trait::ObjectStore;
use crds::{Webserver, WebserverStatus};
use k8s_openapi::api::apps::v1::DeploymentStatus;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store operations, used to target injected failures and to label writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    GetWebserver,
    PatchStatus,
    Get,
    Create,
    Update,
}

impl StoreOperation {
    fn is_write(&self) -> bool {
        matches!(
            self,
            StoreOperation::PatchStatus | StoreOperation::Create | StoreOperation::Update
        )
    }
}

/// A write issued against the mock, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub operation: StoreOperation,
    pub target: String,
}

#[derive(Default)]
struct MockState {
    webservers: HashMap<(String, String), Webserver>,
    objects: HashMap<ObjectKey, DependentObject>,
    writes: Vec<WriteRecord>,
    failures: HashMap<(StoreOperation, String), StoreError>,
    next_version: u64,
    next_cluster_ip: u32,
}

impl MockState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    /// Records writes and returns the injected failure for this call, if any.
    fn intercept(&mut self, operation: StoreOperation, target: String) -> Result<(), StoreError> {
        if operation.is_write() {
            self.writes.push(WriteRecord {
                operation,
                target: target.clone(),
            });
        }
        match self.failures.get(&(operation, target)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn webserver_target(namespace: &str, name: &str) -> String {
    format!("Webserver {}/{}", namespace, name)
}

/// Mock ObjectStore for testing
///
/// Cloning shares the underlying state, so a test can hand one clone to the
/// reconciler and inspect the store through another.
#[derive(Clone, Default)]
pub struct MockObjectStore {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockObjectStore")
            .field("webservers", &state.webservers.len())
            .field("objects", &state.objects.len())
            .field("writes", &state.writes.len())
            .finish()
    }
}

impl MockObjectStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a Webserver (for test setup). Assigns uid, generation
    /// and resourceVersion when missing.
    pub fn insert_webserver(&self, mut webserver: Webserver) {
        let mut state = self.lock();
        let meta = &mut webserver.metadata;
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        if meta.generation.is_none() {
            meta.generation = Some(1);
        }
        meta.resource_version = Some(state.bump_version());
        let key = (webserver.namespace().unwrap_or_default(), webserver.name_any());
        state.webservers.insert(key, webserver);
    }

    /// Remove a Webserver, as if deleted by a user
    pub fn remove_webserver(&self, namespace: &str, name: &str) {
        self.lock()
            .webservers
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Current copy of a Webserver
    pub fn webserver(&self, namespace: &str, name: &str) -> Option<Webserver> {
        self.lock()
            .webservers
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current status of a Webserver
    pub fn status(&self, namespace: &str, name: &str) -> Option<WebserverStatus> {
        self.webserver(namespace, name).and_then(|w| w.status)
    }

    /// Add a dependent object directly (for test setup). Assigns uid and
    /// resourceVersion when missing.
    pub fn insert_object(&self, mut object: DependentObject) {
        let mut state = self.lock();
        let version = state.bump_version();
        let meta = object.metadata_mut();
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        meta.resource_version = Some(version);
        state.objects.insert(object.key(), object);
    }

    /// Current copy of a dependent object
    pub fn object(&self, key: &ObjectKey) -> Option<DependentObject> {
        self.lock().objects.get(key).cloned()
    }

    /// Modify a stored object as another actor would; bumps resourceVersion.
    pub fn mutate_object(&self, key: &ObjectKey, mutate: impl FnOnce(&mut DependentObject)) {
        let mut state = self.lock();
        let version = state.bump_version();
        if let Some(object) = state.objects.get_mut(key) {
            mutate(object);
            object.metadata_mut().resource_version = Some(version);
        }
    }

    /// Report `ready` replicas on a stored Deployment, as its controller would
    pub fn set_ready_replicas(&self, key: &ObjectKey, ready: i32) {
        let mut state = self.lock();
        if let Some(DependentObject::Deployment(deployment)) = state.objects.get_mut(key) {
            let status = deployment.status.get_or_insert_with(DeploymentStatus::default);
            status.ready_replicas = Some(ready);
        }
    }

    /// Make every `operation` on `key` fail with `error` until cleared
    pub fn fail_object(&self, operation: StoreOperation, key: &ObjectKey, error: StoreError) {
        self.lock().failures.insert((operation, key.to_string()), error);
    }

    /// Make every `operation` on a Webserver fail with `error` until cleared
    pub fn fail_webserver(&self, operation: StoreOperation, namespace: &str, name: &str, error: StoreError) {
        self.lock()
            .failures
            .insert((operation, webserver_target(namespace, name)), error);
    }

    /// Drop all injected failures
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Writes issued so far, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Number of writes issued so far
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn get_webserver(&self, namespace: &str, name: &str) -> Result<Option<Webserver>, StoreError> {
        let mut state = self.lock();
        state.intercept(StoreOperation::GetWebserver, webserver_target(namespace, name))?;
        Ok(state
            .webservers
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_webserver_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WebserverStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let target = webserver_target(namespace, name);
        state.intercept(StoreOperation::PatchStatus, target.clone())?;
        let version = state.bump_version();
        let webserver = state
            .webservers
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or(StoreError::NotFound(target))?;
        webserver.status = Some(status.clone());
        webserver.metadata.resource_version = Some(version);
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<DependentObject>, StoreError> {
        let mut state = self.lock();
        state.intercept(StoreOperation::Get, key.to_string())?;
        match state.objects.get(key) {
            Some(object) if object.kind() != key.kind => Err(StoreError::KindMismatch(key.to_string())),
            Some(object) => Ok(Some(object.clone())),
            None => Ok(None),
        }
    }

    async fn create(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let key = object.key();
        let mut state = self.lock();
        state.intercept(StoreOperation::Create, key.to_string())?;
        if key.name.is_empty() || key.namespace.is_empty() {
            return Err(StoreError::Rejected(format!("{} is missing name or namespace", key.kind)));
        }
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let mut created = object.clone();
        let version = state.bump_version();
        if let DependentObject::Service(service) = &mut created {
            let spec = service.spec.get_or_insert_with(Default::default);
            if spec.cluster_ip.is_none() {
                state.next_cluster_ip += 1;
                spec.cluster_ip = Some(format!("10.96.0.{}", state.next_cluster_ip));
            }
        }
        let meta = created.metadata_mut();
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = Some(version);
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let key = object.key();
        let mut state = self.lock();
        state.intercept(StoreOperation::Update, key.to_string())?;
        let stored = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if stored.kind() != object.kind() {
            return Err(StoreError::KindMismatch(key.to_string()));
        }
        let sent_version = object.metadata().resource_version.as_deref();
        if sent_version.is_some() && sent_version != stored.metadata().resource_version.as_deref() {
            return Err(StoreError::Conflict(format!(
                "{} has been modified; resourceVersion {} is stale",
                key,
                sent_version.unwrap_or_default()
            )));
        }

        let mut updated = object.clone();
        // Status is a subresource: replacing the object never changes it.
        if let (DependentObject::Deployment(new), DependentObject::Deployment(old)) = (&mut updated, stored) {
            new.status = old.status.clone();
        }
        let uid = stored.metadata().uid.clone();
        let version = state.bump_version();
        let meta = updated.metadata_mut();
        meta.uid = uid;
        meta.resource_version = Some(version);
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }
}
