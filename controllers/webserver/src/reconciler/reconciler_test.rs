//! Unit tests for full reconcile passes against the mock store

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::status::{REASON_DEPENDENTS_NOT_CONVERGED, REASON_SUCCEEDED, REASON_VALIDATION_FAILED};
    use crate::reconciler::ResourceIdentity;
    use crate::reconciler::convergence::Operation;
    use crate::test_utils::*;
    use crds::{CONDITION_READY, WebserverPhase};
    use std::time::Duration;
    use store_client::{MockObjectStore, ObjectKey, ObjectKind, StoreError, StoreOperation};
    use tokio_util::sync::CancellationToken;

    fn identity(name: &str) -> ResourceIdentity {
        ResourceIdentity::new(TEST_NAMESPACE, name)
    }

    fn deployment_key(name: &str) -> ObjectKey {
        ObjectKey::new(ObjectKind::Deployment, TEST_NAMESPACE, format!("{}-deployment", name))
    }

    #[tokio::test]
    async fn test_deleted_webserver_is_a_no_op() {
        let store = MockObjectStore::new();
        let reconciler = create_test_reconciler(&store);

        let report = reconciler
            .reconcile(&identity("gone"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.requeue_after, None);
        assert!(report.outcomes.is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_converges_then_settles() {
        let store = MockObjectStore::new();
        store.insert_webserver(create_test_webserver("demo", create_test_spec(2)));
        let reconciler = create_test_reconciler(&store);
        let cancel = CancellationToken::new();

        // First pass creates everything; pods are not ready yet
        let report = reconciler.reconcile(&identity("demo"), &cancel).await.unwrap();
        assert_eq!(report.requeue_after, Some(Duration::from_secs(300)));
        assert!(report.outcomes.iter().all(|o| o.operation() == Some(Operation::Created)));
        assert!(report.status_written);
        let status = store.status(TEST_NAMESPACE, "demo").unwrap();
        assert_eq!(status.phase, Some(WebserverPhase::Reconciling));
        assert_eq!(status.ready_replicas, 0);

        // Pods come up
        store.set_ready_replicas(&deployment_key("demo"), 2);
        let report = reconciler.reconcile(&identity("demo"), &cancel).await.unwrap();
        assert!(report.outcomes.iter().all(|o| o.operation() == Some(Operation::Unchanged)));
        let status = store.status(TEST_NAMESPACE, "demo").unwrap();
        assert_eq!(status.phase, Some(WebserverPhase::Ready));
        assert_eq!(status.ready_replicas, 2);
        let ready = status.condition(CONDITION_READY).unwrap();
        assert!(ready.is_true());
        assert_eq!(ready.reason, REASON_SUCCEEDED);

        // Nothing changed: no writes at all
        let writes = store.write_count();
        let report = reconciler.reconcile(&identity("demo"), &cancel).await.unwrap();
        assert!(!report.status_written);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_invalid_spec_reports_failed_status() {
        let store = MockObjectStore::new();
        store.insert_webserver(create_test_webserver("demo", create_test_spec(11)));
        let reconciler = create_test_reconciler(&store);

        let result = reconciler.reconcile(&identity("demo"), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ControllerError::Validation(_))));

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].operation, StoreOperation::PatchStatus);
        let status = store.status(TEST_NAMESPACE, "demo").unwrap();
        assert_eq!(status.phase, Some(WebserverPhase::Failed));
        assert_eq!(status.condition(CONDITION_READY).unwrap().reason, REASON_VALIDATION_FAILED);

        // Retrying the same spec does not rewrite status
        let result = reconciler.reconcile(&identity("demo"), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ControllerError::Validation(_))));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_dependent_failure_yields_partial_failure() {
        let store = MockObjectStore::new();
        store.insert_webserver(create_test_webserver("demo", create_test_spec(1)));
        store.fail_object(
            StoreOperation::Create,
            &ObjectKey::new(ObjectKind::ConfigMap, TEST_NAMESPACE, "demo-config"),
            StoreError::Unavailable("etcd timeout".to_string()),
        );
        let reconciler = create_test_reconciler(&store);

        let result = reconciler.reconcile(&identity("demo"), &CancellationToken::new()).await;
        match result {
            Err(ControllerError::PartialFailure {
                failed,
                total,
                conflicts_only,
                ..
            }) => {
                assert_eq!((failed, total), (1, 3));
                assert!(!conflicts_only);
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        assert!(store.object(&deployment_key("demo")).is_some());
        let status = store.status(TEST_NAMESPACE, "demo").unwrap();
        assert_eq!(status.condition(CONDITION_READY).unwrap().reason, REASON_DEPENDENTS_NOT_CONVERGED);
    }

    #[tokio::test]
    async fn test_conflicting_update_requeues_immediately() {
        let store = MockObjectStore::new();
        store.insert_webserver(create_test_webserver("demo", create_test_spec(1)));
        let reconciler = create_test_reconciler(&store);
        reconciler
            .reconcile(&identity("demo"), &CancellationToken::new())
            .await
            .unwrap();

        store.insert_webserver(create_test_webserver("demo", create_test_spec(2)));
        store.fail_object(
            StoreOperation::Update,
            &deployment_key("demo"),
            StoreError::Conflict("object has been modified".to_string()),
        );
        let error = reconciler
            .reconcile(&identity("demo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(error.requeue_immediately());
    }

    #[tokio::test]
    async fn test_unavailable_store_on_fetch() {
        let store = MockObjectStore::new();
        store.fail_webserver(
            StoreOperation::GetWebserver,
            TEST_NAMESPACE,
            "demo",
            StoreError::Unavailable("connection refused".to_string()),
        );
        let reconciler = create_test_reconciler(&store);
        let result = reconciler.reconcile(&identity("demo"), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ControllerError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancelled_pass_writes_nothing() {
        let store = MockObjectStore::new();
        store.insert_webserver(create_test_webserver("demo", create_test_spec(1)));
        let reconciler = create_test_reconciler(&store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = reconciler.reconcile(&identity("demo"), &cancel).await;
        assert!(matches!(result, Err(ControllerError::Cancelled(_))));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_status_patch_on_deleted_webserver_is_ignored() {
        let store = MockObjectStore::new();
        store.insert_webserver(create_test_webserver("demo", create_test_spec(1)));
        store.fail_webserver(
            StoreOperation::PatchStatus,
            TEST_NAMESPACE,
            "demo",
            StoreError::NotFound("demo".to_string()),
        );
        let reconciler = create_test_reconciler(&store);

        let report = reconciler
            .reconcile(&identity("demo"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!report.status_written);
    }
}
