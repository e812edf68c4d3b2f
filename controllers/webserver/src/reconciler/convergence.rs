//! Convergence engine.
//!
//! Create-or-update for each synthesized dependent. Only the fields the
//! engine owns are compared and written; everything else on an existing
//! object (cluster IP, server defaults, fields set by other actors) is kept.
//! Each store call is a single attempt. Failures are captured per dependent
//! and the remaining dependents are still processed.

use super::synthesizer::{DependentSpec, stable_content};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use std::fmt;
use store_client::{DependentObject, ObjectKind, ObjectStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Write the engine performed (or skipped) for a dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Created,
    Updated,
    Unchanged,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Created => "created",
            Operation::Updated => "updated",
            Operation::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeResult {
    Applied(Operation),
    Failed(StoreError),
    /// Skipped because the pass was cancelled first
    NotAttempted,
}

/// Per-dependent result of one convergence pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub kind: ObjectKind,
    pub name: String,
    pub result: OutcomeResult,
    /// Object as the store holds it after this pass, when known
    pub observed: Option<DependentObject>,
}

impl ReconcileOutcome {
    fn new(spec: &DependentSpec, result: OutcomeResult, observed: Option<DependentObject>) -> Self {
        Self {
            kind: spec.key.kind,
            name: spec.key.name.clone(),
            result,
            observed,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self.result {
            OutcomeResult::Applied(operation) => Some(operation),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StoreError> {
        match &self.result {
            OutcomeResult::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_not_attempted(&self) -> bool {
        self.result == OutcomeResult::NotAttempted
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            OutcomeResult::Applied(operation) => write!(f, "{} {} {}", self.kind, self.name, operation.as_str()),
            OutcomeResult::Failed(error) => write!(f, "{} {}: {}", self.kind, self.name, error),
            OutcomeResult::NotAttempted => write!(f, "{} {} not attempted", self.kind, self.name),
        }
    }
}

/// Drives dependents toward their synthesized shape.
pub struct ConvergenceEngine<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ConvergenceEngine<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Converge every dependent in order, returning one outcome per spec.
    ///
    /// Once `cancel` fires, the in-flight call is abandoned and the remaining
    /// dependents are reported as not attempted. Writes that already landed
    /// stay in place.
    pub async fn converge(
        &self,
        owner: &OwnerReference,
        specs: &[DependentSpec],
        cancel: &CancellationToken,
    ) -> Vec<ReconcileOutcome> {
        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in specs {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.converge_one(owner, spec) => Some(result),
            };
            let outcome = match result {
                None => {
                    debug!("Skipping {}: reconcile cancelled", spec.key);
                    ReconcileOutcome::new(spec, OutcomeResult::NotAttempted, None)
                }
                Some(Ok((operation, object))) => ReconcileOutcome::new(spec, OutcomeResult::Applied(operation), Some(object)),
                Some(Err(error)) => {
                    warn!("Failed to converge {}: {}", spec.key, error);
                    ReconcileOutcome::new(spec, OutcomeResult::Failed(error), None)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn converge_one(
        &self,
        owner: &OwnerReference,
        spec: &DependentSpec,
    ) -> Result<(Operation, DependentObject), StoreError> {
        let mut desired = spec.desired.clone();
        upsert_owner_reference(desired.metadata_mut(), owner);

        let Some(existing) = self.store.get(&spec.key).await? else {
            let created = self.store.create(&desired).await?;
            info!("Created {}", spec.key);
            return Ok((Operation::Created, created));
        };
        ensure_not_controlled_by_other(&existing, owner)?;

        let merged = merge_owned_fields(&existing, &desired)?;
        if merged == existing {
            debug!("{} already converged", spec.key);
            return Ok((Operation::Unchanged, existing));
        }

        let updated = self.store.update(&merged).await?;
        info!("Updated {}", spec.key);
        Ok((Operation::Updated, updated))
    }
}

/// Existing object with the desired owned fields written over it.
///
/// `resourceVersion` stays that of `existing`, so a concurrent writer makes
/// the update fail with a conflict instead of being overwritten.
pub fn merge_owned_fields(existing: &DependentObject, desired: &DependentObject) -> Result<DependentObject, StoreError> {
    let mut merged = existing.clone();
    match (&mut merged, desired) {
        (DependentObject::Deployment(current), DependentObject::Deployment(want)) => merge_deployment(current, want),
        (DependentObject::Service(current), DependentObject::Service(want)) => merge_service(current, want),
        (DependentObject::ConfigMap(current), DependentObject::ConfigMap(want)) => merge_config_map(current, want),
        _ => {
            return Err(StoreError::KindMismatch(format!(
                "{} holds a {}",
                desired.key(),
                existing.kind()
            )));
        }
    }
    Ok(merged)
}

/// Refuse to adopt an object whose controller is some other owner. The API
/// server allows one controller reference per object.
fn ensure_not_controlled_by_other(existing: &DependentObject, owner: &OwnerReference) -> Result<(), StoreError> {
    let other = existing
        .metadata()
        .owner_references
        .iter()
        .flatten()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid);
    match other {
        Some(controller) => Err(StoreError::Rejected(format!(
            "{} is already controlled by {} {} ({})",
            existing.key(),
            controller.kind,
            controller.name,
            controller.uid
        ))),
        None => Ok(()),
    }
}

fn merge_metadata(current: &mut ObjectMeta, want: &ObjectMeta) {
    merge_labels(&mut current.labels, want.labels.as_ref());
    for owner in want.owner_references.iter().flatten() {
        upsert_owner_reference(current, owner);
    }
}

/// Key-wise label merge; labels the engine does not set are left alone.
fn merge_labels(current: &mut Option<BTreeMap<String, String>>, want: Option<&BTreeMap<String, String>>) {
    let Some(want) = want.filter(|w| !w.is_empty()) else {
        return;
    };
    let labels = current.get_or_insert_with(BTreeMap::new);
    for (key, value) in want {
        if labels.get(key) != Some(value) {
            labels.insert(key.clone(), value.clone());
        }
    }
}

fn upsert_owner_reference(meta: &mut ObjectMeta, owner: &OwnerReference) {
    let references = meta.owner_references.get_or_insert_with(Vec::new);
    match references.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) if *existing == *owner => {}
        Some(existing) => *existing = owner.clone(),
        None => references.push(owner.clone()),
    }
}

/// Merge `want` into the item of `items` sharing its name, or append it.
fn upsert_named<T: Clone>(
    items: &mut Vec<T>,
    want: &[T],
    name: impl Fn(&T) -> Option<&str>,
    merge: impl Fn(&mut T, &T),
) {
    for wanted in want {
        match items.iter_mut().find(|item| name(&**item) == name(wanted)) {
            Some(item) => merge(item, wanted),
            None => items.push(wanted.clone()),
        }
    }
}

fn merge_container(current: &mut Container, want: &Container) {
    current.image.clone_from(&want.image);
    if let Some(ports) = want.ports.as_deref() {
        upsert_named(
            current.ports.get_or_insert_with(Vec::new),
            ports,
            |p| p.name.as_deref(),
            |p, w| p.container_port = w.container_port,
        );
    }
    if let Some(mounts) = want.volume_mounts.as_deref() {
        upsert_named(
            current.volume_mounts.get_or_insert_with(Vec::new),
            mounts,
            |m| Some(m.name.as_str()),
            |m, w| {
                m.mount_path.clone_from(&w.mount_path);
                m.read_only = w.read_only;
            },
        );
    }
}

fn merge_deployment(current: &mut Deployment, want: &Deployment) {
    merge_metadata(&mut current.metadata, &want.metadata);
    let Some(want_spec) = want.spec.as_ref() else {
        return;
    };
    let spec = current.spec.get_or_insert_with(Default::default);
    spec.replicas = want_spec.replicas;
    spec.selector.match_labels.clone_from(&want_spec.selector.match_labels);

    let want_template = &want_spec.template;
    if let Some(want_meta) = want_template.metadata.as_ref() {
        let meta = spec.template.metadata.get_or_insert_with(Default::default);
        merge_labels(&mut meta.labels, want_meta.labels.as_ref());
    }
    let Some(want_pod) = want_template.spec.as_ref() else {
        return;
    };
    let pod = spec.template.spec.get_or_insert_with(Default::default);
    upsert_named(
        &mut pod.containers,
        &want_pod.containers,
        |c| Some(c.name.as_str()),
        merge_container,
    );
    if let Some(volumes) = want_pod.volumes.as_deref() {
        upsert_named(
            pod.volumes.get_or_insert_with(Vec::new),
            volumes,
            |v| Some(v.name.as_str()),
            |v, w| match (v.config_map.as_mut(), w.config_map.as_ref()) {
                (Some(source), Some(want_source)) => source.name.clone_from(&want_source.name),
                (None, Some(want_source)) => v.config_map = Some(want_source.clone()),
                _ => {}
            },
        );
    }
}

fn merge_service(current: &mut Service, want: &Service) {
    merge_metadata(&mut current.metadata, &want.metadata);
    let Some(want_spec) = want.spec.as_ref() else {
        return;
    };
    let spec = current.spec.get_or_insert_with(Default::default);
    spec.type_.clone_from(&want_spec.type_);
    spec.selector.clone_from(&want_spec.selector);
    if let Some(ports) = want_spec.ports.as_deref() {
        upsert_named(
            spec.ports.get_or_insert_with(Vec::new),
            ports,
            |p| p.name.as_deref(),
            |p, w| {
                p.port = w.port;
                p.target_port.clone_from(&w.target_port);
            },
        );
    }
    // Node ports are only valid on NodePort and LoadBalancer Services.
    if spec.type_.as_deref() == Some("ClusterIP") {
        for port in spec.ports.iter_mut().flatten() {
            port.node_port = None;
        }
    }
}

fn merge_config_map(current: &mut ConfigMap, want: &ConfigMap) {
    merge_metadata(&mut current.metadata, &want.metadata);
    let Some(want_data) = want.data.as_ref() else {
        return;
    };
    let data = current.data.get_or_insert_with(BTreeMap::new);
    for (key, value) in want_data {
        let same = data
            .get(key)
            .is_some_and(|existing| stable_content(existing) == stable_content(value));
        if !same {
            data.insert(key.clone(), value.clone());
        }
    }
}
