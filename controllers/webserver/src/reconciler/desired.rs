//! Desired-state fetching and defaulting.

use crate::error::ControllerError;
use crds::{Webserver, WebserverConfig, WebserverSpec, WebserverStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::fmt;
use store_client::ObjectStore;

pub const DEFAULT_REPLICAS: i32 = 1;
pub const DEFAULT_IMAGE: &str = "nginx:1.25";
pub const DEFAULT_PORT: i32 = 80;
pub const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";
pub const DEFAULT_TITLE: &str = "Webserver Operator Demo";
pub const DEFAULT_MESSAGE: &str = "Welcome to the Webserver Operator Demo!";
pub const DEFAULT_COLOR: &str = "#f0f0f0";

/// Identity of a reconcile request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Effective desired state for one reconcile pass.
///
/// Built from the fetched resource with defaults applied; never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub namespace: String,
    pub name: String,
    pub generation: Option<i64>,
    pub uid: String,
    pub replicas: i32,
    pub image: String,
    pub port: i32,
    pub service_type: String,
    pub config: WebserverConfig,
}

impl DesiredState {
    /// Snapshot a fetched Webserver, applying defaults.
    pub fn from_resource(webserver: &Webserver) -> Result<Self, ControllerError> {
        let name = webserver.name_any();
        let namespace = webserver
            .namespace()
            .ok_or_else(|| ControllerError::InvalidResource(format!("Webserver {} has no namespace", name)))?;
        let uid = webserver
            .uid()
            .ok_or_else(|| ControllerError::InvalidResource(format!("Webserver {}/{} has no uid", namespace, name)))?;
        let spec = apply_defaults(&webserver.spec);

        Ok(Self {
            namespace,
            name,
            generation: webserver.metadata.generation,
            uid,
            replicas: spec.replicas,
            image: spec.image,
            port: spec.port,
            service_type: spec.service_type,
            config: spec.config,
        })
    }

    /// Controller owner reference pointing at this Webserver.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: Webserver::api_version(&()).into_owned(),
            kind: Webserver::kind(&()).into_owned(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

/// Result of a successful fetch: the effective desired state and the status
/// currently stored on the resource.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub desired: DesiredState,
    pub status: Option<WebserverStatus>,
}

/// Returns a copy of `spec` with zero and empty fields replaced by defaults.
pub fn apply_defaults(spec: &WebserverSpec) -> WebserverSpec {
    let mut effective = spec.clone();
    if effective.replicas == 0 {
        effective.replicas = DEFAULT_REPLICAS;
    }
    if effective.image.is_empty() {
        effective.image = DEFAULT_IMAGE.to_string();
    }
    if effective.port == 0 {
        effective.port = DEFAULT_PORT;
    }
    if effective.service_type.is_empty() {
        effective.service_type = DEFAULT_SERVICE_TYPE.to_string();
    }
    let config = &mut effective.config;
    if config.title.is_empty() {
        config.title = DEFAULT_TITLE.to_string();
    }
    if config.message.is_empty() {
        config.message = DEFAULT_MESSAGE.to_string();
    }
    if config.color.is_empty() {
        config.color = DEFAULT_COLOR.to_string();
    }
    effective
}

/// Fetch the Webserver for `identity`. `Ok(None)` when it no longer exists.
pub async fn fetch(store: &dyn ObjectStore, identity: &ResourceIdentity) -> Result<Option<Fetched>, ControllerError> {
    let Some(webserver) = store.get_webserver(&identity.namespace, &identity.name).await? else {
        return Ok(None);
    };
    let desired = DesiredState::from_resource(&webserver)?;
    Ok(Some(Fetched {
        desired,
        status: webserver.status,
    }))
}
