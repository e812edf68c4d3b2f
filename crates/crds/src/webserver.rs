//! Webserver CRD
//!
//! Declares a static web server: a Deployment serving generated HTML from a
//! ConfigMap, exposed through a Service.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired state of a Webserver.
///
/// Every field is optional on the wire and omitted when zero. Zero values
/// (`0`, `""`) mean "use the controller default"; defaulting happens at
/// reconcile time, never in place. No schema defaults are published, so the
/// range bounds only apply to values a user actually sets.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "webserver.io",
    version = "v1alpha1",
    kind = "Webserver",
    namespaced,
    status = "WebserverStatus",
    shortname = "ws",
    scale(spec_replicas_path = ".spec.replicas", status_replicas_path = ".status.readyReplicas"),
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebserverSpec {
    /// Number of desired replicas for the web server deployment (1-10)
    #[serde(default, skip_serializing_if = "is_zero")]
    #[schemars(range(min = 1, max = 10))]
    pub replicas: i32,

    /// Container image to use for the web server
    #[serde(default)]
    pub image: String,

    /// Port the web server listens on (1-65535)
    #[serde(default, skip_serializing_if = "is_zero")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,

    /// Kubernetes Service type: ClusterIP, NodePort or LoadBalancer
    #[serde(default)]
    pub service_type: String,

    /// Content configuration rendered into the served page
    #[serde(default)]
    pub config: WebserverConfig,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

/// Configuration options for the served page.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebserverConfig {
    /// Title displayed on the web page
    #[serde(default)]
    pub title: String,

    /// Message displayed on the web page
    #[serde(default)]
    pub message: String,

    /// Background color of the web page
    #[serde(default)]
    pub color: String,

    /// Feature flags, rendered onto the page when enabled
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, bool>,
}

/// Observed state of a Webserver.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebserverStatus {
    /// Generation of the Webserver most recently acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Ready replicas reported by the owned Deployment
    #[serde(default)]
    pub ready_replicas: i32,

    /// Coarse lifecycle phase for quick inspection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<WebserverPhase>,

    /// Latest observations; replaced wholesale on every reconcile
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl WebserverStatus {
    /// Returns the condition of the given type, if present.
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }
}

/// Webserver lifecycle phase
///
/// Serializes as PascalCase ("Ready", "Reconciling", ...) to match the
/// printer columns and the phase strings users script against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum WebserverPhase {
    /// Dependents are being converged or are not yet ready
    Reconciling,

    /// All dependents converged and every desired replica is ready
    Ready,

    /// Declared state cannot be realised; waits for the next change
    Failed,
}

impl WebserverPhase {
    /// Phase as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            WebserverPhase::Reconciling => "Reconciling",
            WebserverPhase::Ready => "Ready",
            WebserverPhase::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for WebserverPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserializes_with_missing_fields() {
        let spec: WebserverSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec, WebserverSpec::default());
        assert_eq!(spec.replicas, 0);
        assert!(spec.image.is_empty());
    }

    #[test]
    fn test_spec_uses_camel_case() {
        let spec: WebserverSpec = serde_json::from_value(serde_json::json!({
            "replicas": 3,
            "serviceType": "NodePort",
            "config": {"title": "Hi", "features": {"darkMode": true}}
        }))
        .unwrap();
        assert_eq!(spec.replicas, 3);
        assert_eq!(spec.service_type, "NodePort");
        assert_eq!(spec.config.features.get("darkMode"), Some(&true));
    }

    #[test]
    fn test_phase_serializes_pascal_case() {
        let value = serde_json::to_value(WebserverPhase::Reconciling).unwrap();
        assert_eq!(value, serde_json::json!("Reconciling"));
        assert_eq!(WebserverPhase::Ready.to_string(), "Ready");
    }

    #[test]
    fn test_crd_metadata() {
        use kube::CustomResourceExt;
        let crd = Webserver::crd();
        assert_eq!(crd.spec.group, "webserver.io");
        assert_eq!(crd.spec.names.kind, "Webserver");
        assert_eq!(crd.spec.names.short_names, Some(vec!["ws".to_string()]));

        let version = &crd.spec.versions[0];
        let columns: Vec<&str> = version
            .additional_printer_columns
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(columns, vec!["Phase", "Ready", "Desired", "Age"]);

        let scale = version.subresources.as_ref().unwrap().scale.as_ref().unwrap();
        assert_eq!(scale.spec_replicas_path, ".spec.replicas");
        assert_eq!(scale.status_replicas_path, ".status.readyReplicas");
    }

    #[test]
    fn test_schema_bounds_replicas_and_port() {
        use kube::CustomResourceExt;
        let crd = Webserver::crd();
        let schema = serde_json::to_value(&crd.spec.versions[0].schema).unwrap();
        let spec = &schema["openAPIV3Schema"]["properties"]["spec"]["properties"];
        assert_eq!(spec["replicas"]["minimum"].as_f64(), Some(1.0));
        assert_eq!(spec["replicas"]["maximum"].as_f64(), Some(10.0));
        assert_eq!(spec["port"]["minimum"].as_f64(), Some(1.0));
        assert_eq!(spec["port"]["maximum"].as_f64(), Some(65535.0));
        // A published default of 0 would itself violate the minimum
        assert!(spec["replicas"].get("default").is_none());
        assert!(spec["port"].get("default").is_none());
    }
}
