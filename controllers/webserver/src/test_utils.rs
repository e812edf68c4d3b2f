//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::reconciler::desired::DesiredState;
#[cfg(test)]
use crate::reconciler::{Reconciler, ReconcilerSettings};
#[cfg(test)]
use chrono::{DateTime, TimeZone, Utc};
#[cfg(test)]
use crds::{Webserver, WebserverSpec};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use store_client::MockObjectStore;

#[cfg(test)]
pub const TEST_NAMESPACE: &str = "default";
#[cfg(test)]
pub const TEST_MANAGER: &str = "webserver-operator";

/// Helper to create a test Webserver with the given spec
#[cfg(test)]
pub fn create_test_webserver(name: &str, spec: WebserverSpec) -> Webserver {
    Webserver {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            uid: Some(format!("uid-{}", name)),
            generation: Some(1),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Helper to create a fully specified Webserver spec
#[cfg(test)]
pub fn create_test_spec(replicas: i32) -> WebserverSpec {
    let mut spec = WebserverSpec {
        replicas,
        image: "nginx:1.25".to_string(),
        port: 8080,
        service_type: "ClusterIP".to_string(),
        ..Default::default()
    };
    spec.config.title = "Hello".to_string();
    spec.config.message = "Served by the operator".to_string();
    spec.config.color = "#ffffff".to_string();
    spec
}

/// Helper to create the effective desired state for a test Webserver
#[cfg(test)]
pub fn create_test_desired(name: &str, replicas: i32) -> DesiredState {
    DesiredState::from_resource(&create_test_webserver(name, create_test_spec(replicas)))
        .unwrap_or_else(|e| panic!("test webserver should be valid: {}", e))
}

/// Fixed timestamp for deterministic synthesis
#[cfg(test)]
pub fn test_time(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0)
        .single()
        .unwrap_or_else(|| panic!("valid test timestamp"))
}

/// Helper to create a reconciler backed by a clone of `store`
#[cfg(test)]
pub fn create_test_reconciler(store: &MockObjectStore) -> Reconciler {
    Reconciler::new(
        Box::new(store.clone()),
        ReconcilerSettings {
            manager_name: TEST_MANAGER.to_string(),
            requeue_after: Duration::from_secs(300),
        },
    )
}
