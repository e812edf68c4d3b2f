//! Object addressing and the closed set of dependent kinds

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;

/// Kinds of dependent object the store client can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Deployment,
    Service,
    ConfigMap,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Deployment => "Deployment",
            ObjectKind::Service => "Service",
            ObjectKind::ConfigMap => "ConfigMap",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store address of an object: (kind, namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A dependent object of one of the supported kinds.
///
/// The kind set is fixed, so dispatch is a `match` rather than a trait object.
#[derive(Debug, Clone, PartialEq)]
pub enum DependentObject {
    Deployment(Deployment),
    Service(Service),
    ConfigMap(ConfigMap),
}

impl DependentObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            DependentObject::Deployment(_) => ObjectKind::Deployment,
            DependentObject::Service(_) => ObjectKind::Service,
            DependentObject::ConfigMap(_) => ObjectKind::ConfigMap,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            DependentObject::Deployment(o) => &o.metadata,
            DependentObject::Service(o) => &o.metadata,
            DependentObject::ConfigMap(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            DependentObject::Deployment(o) => &mut o.metadata,
            DependentObject::Service(o) => &mut o.metadata,
            DependentObject::ConfigMap(o) => &mut o.metadata,
        }
    }

    /// Store key derived from kind and metadata. Missing name or namespace
    /// yields an empty component, which the store rejects.
    pub fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(
            self.kind(),
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }

    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            DependentObject::Deployment(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Service> {
        match self {
            DependentObject::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_config_map(&self) -> Option<&ConfigMap> {
        match self {
            DependentObject::ConfigMap(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_metadata() {
        let object = DependentObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("demo-config".to_string()),
                namespace: Some("web".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let key = object.key();
        assert_eq!(key, ObjectKey::new(ObjectKind::ConfigMap, "web", "demo-config"));
        assert_eq!(key.to_string(), "ConfigMap web/demo-config");
        assert!(object.as_config_map().is_some());
        assert!(object.as_service().is_none());
    }
}
