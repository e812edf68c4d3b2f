//! Unit tests for dependent synthesis

#[cfg(test)]
mod tests {
    use crate::error::ValidationError;
    use crate::reconciler::synthesizer::*;
    use crate::test_utils::*;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use store_client::ObjectKind;

    fn index_html(specs: &[DependentSpec]) -> String {
        specs[2]
            .desired
            .as_config_map()
            .and_then(|c| c.data.as_ref())
            .and_then(|d| d.get(INDEX_HTML))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_three_dependents_in_order() {
        let desired = create_test_desired("demo", 2);
        let specs = synthesize(&desired, TEST_MANAGER, test_time(0)).unwrap();

        let keys: Vec<(ObjectKind, &str)> = specs.iter().map(|s| (s.key.kind, s.key.name.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (ObjectKind::Deployment, "demo-deployment"),
                (ObjectKind::Service, "demo-service"),
                (ObjectKind::ConfigMap, "demo-config"),
            ]
        );
        for spec in &specs {
            let meta = spec.desired.metadata();
            assert_eq!(meta.namespace.as_deref(), Some(TEST_NAMESPACE));
            let labels = meta.labels.as_ref().unwrap();
            assert_eq!(labels.get("app").map(String::as_str), Some("webserver"));
            assert_eq!(labels.get("instance").map(String::as_str), Some("demo"));
            assert_eq!(labels.get("managed-by").map(String::as_str), Some(TEST_MANAGER));
            assert_eq!(spec.key, spec.desired.key());
        }
    }

    #[test]
    fn test_deployment_shape() {
        let desired = create_test_desired("demo", 2);
        let specs = synthesize(&desired, TEST_MANAGER, test_time(0)).unwrap();
        let deployment = specs[0].desired.as_deployment().unwrap();
        let spec = deployment.spec.as_ref().unwrap();

        assert_eq!(spec.replicas, Some(2));
        let match_labels = spec.selector.match_labels.as_ref().unwrap();
        assert_eq!(match_labels.len(), 2);
        assert!(!match_labels.contains_key("managed-by"));

        let pod = spec.template.spec.as_ref().unwrap();
        let container = &pod.containers[0];
        assert_eq!(container.name, CONTAINER_NAME);
        assert_eq!(container.image.as_deref(), Some("nginx:1.25"));
        let port = &container.ports.as_ref().unwrap()[0];
        assert_eq!(port.container_port, 8080);
        assert_eq!(port.name.as_deref(), Some(PORT_NAME));
        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, HTML_MOUNT_PATH);
        assert_eq!(mount.read_only, Some(true));

        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.name, HTML_VOLUME);
        assert!(volume.config_map.is_some());
    }

    #[test]
    fn test_service_shape() {
        let mut desired = create_test_desired("demo", 1);
        desired.service_type = "NodePort".to_string();
        let specs = synthesize(&desired, TEST_MANAGER, test_time(0)).unwrap();
        let service = specs[1].desired.as_service().unwrap();
        let spec = service.spec.as_ref().unwrap();

        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        assert!(spec.cluster_ip.is_none());
        let port = &spec.ports.as_ref().unwrap()[0];
        assert_eq!(port.port, SERVICE_PORT);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(spec.selector.as_ref().unwrap().get("instance").map(String::as_str), Some("demo"));
    }

    #[test]
    fn test_synthesis_is_deterministic_apart_from_timestamp() {
        let desired = create_test_desired("demo", 3);
        let first = synthesize(&desired, TEST_MANAGER, test_time(0)).unwrap();
        let second = synthesize(&desired, TEST_MANAGER, test_time(7)).unwrap();

        assert_eq!(first[0], second[0]);
        assert_eq!(first[1], second[1]);

        let (before, after) = (index_html(&first), index_html(&second));
        assert_ne!(before, after);
        assert_eq!(stable_content(&before), stable_content(&after));
        assert!(before.contains("2024-05-01 10:00:00 UTC"));
    }

    #[test]
    fn test_page_escapes_user_strings_and_sorts_features() {
        let mut desired = create_test_desired("demo", 1);
        desired.config.title = "<script>alert(1)</script>".to_string();
        desired.config.features.insert("zeta".to_string(), true);
        desired.config.features.insert("alpha".to_string(), true);
        desired.config.features.insert("hidden".to_string(), false);

        let html = index_html(&synthesize(&desired, TEST_MANAGER, test_time(0)).unwrap());
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(!html.contains("hidden"));
        let alpha = html.find("<li>alpha</li>").unwrap();
        let zeta = html.find("<li>zeta</li>").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_invalid_specs_are_rejected() {
        let mut desired = create_test_desired("demo", 1);
        desired.replicas = 11;
        assert_eq!(
            synthesize(&desired, TEST_MANAGER, test_time(0)),
            Err(ValidationError::ReplicasOutOfRange {
                value: 11,
                min: MIN_REPLICAS,
                max: MAX_REPLICAS
            })
        );

        let mut desired = create_test_desired("demo", 1);
        desired.port = 70000;
        assert_eq!(
            synthesize(&desired, TEST_MANAGER, test_time(0)),
            Err(ValidationError::PortOutOfRange(70000))
        );

        let mut desired = create_test_desired("demo", 1);
        desired.service_type = "ExternalName".to_string();
        assert!(matches!(
            synthesize(&desired, TEST_MANAGER, test_time(0)),
            Err(ValidationError::UnknownServiceType(_))
        ));

        let mut desired = create_test_desired("demo", 1);
        desired.image = "  ".to_string();
        assert_eq!(synthesize(&desired, TEST_MANAGER, test_time(0)), Err(ValidationError::EmptyImage));

        let mut desired = create_test_desired("demo", 1);
        desired.config.color = "red; } body { display:none".to_string();
        assert_eq!(
            synthesize(&desired, TEST_MANAGER, test_time(0)),
            Err(ValidationError::InvalidColor("red; } body { display:none".to_string()))
        );
    }

    #[test]
    fn test_long_owner_name_is_rejected() {
        let long_name = "w".repeat(60);
        let desired = create_test_desired(&long_name, 1);
        let result = synthesize(&desired, TEST_MANAGER, test_time(0));
        assert_eq!(result, Err(ValidationError::NameTooLong(format!("{}-deployment", long_name))));
    }
}
