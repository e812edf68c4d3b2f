//! Kubernetes-backed object store

use crate::error::StoreError;
use crate::object::{DependentObject, ObjectKey, ObjectKind};
use crate::store_trait::ObjectStore;
use crds::{Webserver, WebserverStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

/// Default field manager recorded on writes.
pub const DEFAULT_FIELD_MANAGER: &str = "webserver-operator";

/// Object store backed by the Kubernetes API server.
///
/// Holds only a `kube::Client`; `Api` handles are built per call because the
/// namespace comes from the key being addressed.
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    field_manager: String,
}

impl KubeObjectStore {
    /// Creates a store using the default field manager.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }

    /// Overrides the field manager recorded on writes.
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

/// Name and namespace of an object about to be written.
fn write_target(object: &DependentObject) -> Result<ObjectKey, StoreError> {
    let key = object.key();
    if key.name.is_empty() || key.namespace.is_empty() {
        return Err(StoreError::Rejected(format!(
            "{} is missing name or namespace",
            key.kind
        )));
    }
    Ok(key)
}

#[async_trait::async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_webserver(&self, namespace: &str, name: &str) -> Result<Option<Webserver>, StoreError> {
        let api: Api<Webserver> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_webserver_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WebserverStatus,
    ) -> Result<(), StoreError> {
        let api: Api<Webserver> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({
            "status": status
        });
        api.patch_status(name, &self.patch_params(), &Patch::Merge(&status_patch))
            .await?;
        debug!("Patched Webserver {}/{} status", namespace, name);
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<DependentObject>, StoreError> {
        let client = self.client.clone();
        let object = match key.kind {
            ObjectKind::Deployment => Api::<Deployment>::namespaced(client, &key.namespace)
                .get_opt(&key.name)
                .await?
                .map(DependentObject::Deployment),
            ObjectKind::Service => Api::<Service>::namespaced(client, &key.namespace)
                .get_opt(&key.name)
                .await?
                .map(DependentObject::Service),
            ObjectKind::ConfigMap => Api::<ConfigMap>::namespaced(client, &key.namespace)
                .get_opt(&key.name)
                .await?
                .map(DependentObject::ConfigMap),
        };
        Ok(object)
    }

    async fn create(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let key = write_target(object)?;
        let client = self.client.clone();
        let pp = self.post_params();
        let created = match object {
            DependentObject::Deployment(d) => DependentObject::Deployment(
                Api::<Deployment>::namespaced(client, &key.namespace).create(&pp, d).await?,
            ),
            DependentObject::Service(s) => DependentObject::Service(
                Api::<Service>::namespaced(client, &key.namespace).create(&pp, s).await?,
            ),
            DependentObject::ConfigMap(c) => DependentObject::ConfigMap(
                Api::<ConfigMap>::namespaced(client, &key.namespace).create(&pp, c).await?,
            ),
        };
        debug!("Created {}", key);
        Ok(created)
    }

    async fn update(&self, object: &DependentObject) -> Result<DependentObject, StoreError> {
        let key = write_target(object)?;
        let client = self.client.clone();
        let pp = self.post_params();
        let updated = match object {
            DependentObject::Deployment(d) => DependentObject::Deployment(
                Api::<Deployment>::namespaced(client, &key.namespace)
                    .replace(&key.name, &pp, d)
                    .await?,
            ),
            DependentObject::Service(s) => DependentObject::Service(
                Api::<Service>::namespaced(client, &key.namespace)
                    .replace(&key.name, &pp, s)
                    .await?,
            ),
            DependentObject::ConfigMap(c) => DependentObject::ConfigMap(
                Api::<ConfigMap>::namespaced(client, &key.namespace)
                    .replace(&key.name, &pp, c)
                    .await?,
            ),
        };
        debug!("Replaced {}", key);
        Ok(updated)
    }
}
