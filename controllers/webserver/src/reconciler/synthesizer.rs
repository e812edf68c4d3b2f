//! Dependent-resource synthesis.
//!
//! Turns a `DesiredState` into the Deployment, Service and ConfigMap that
//! should exist for it. Pure: the only input besides the desired state is the
//! timestamp rendered into the page, and that line is marked volatile so the
//! convergence engine ignores it when diffing.

use super::desired::DesiredState;
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use store_client::{DependentObject, ObjectKey, ObjectKind};

pub const MIN_REPLICAS: i32 = 1;
pub const MAX_REPLICAS: i32 = 10;
const MAX_NAME_LEN: usize = 63;

pub const APP_LABEL_VALUE: &str = "webserver";
pub const CONTAINER_NAME: &str = "webserver";
pub const PORT_NAME: &str = "http";
pub const SERVICE_PORT: i32 = 80;
pub const HTML_VOLUME: &str = "html-content";
pub const HTML_MOUNT_PATH: &str = "/usr/share/nginx/html";
pub const INDEX_HTML: &str = "index.html";

/// Opening of the generated-at line. It changes on every pass and is the only
/// line excluded from comparison. User text is escaped, so it can never start
/// a line with `<`.
pub const GENERATED_LINE_PREFIX: &str = "<li data-volatile><strong>Generated:</strong>";

/// Kubernetes Service types the operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "ClusterIP" => Ok(ServiceType::ClusterIP),
            "NodePort" => Ok(ServiceType::NodePort),
            "LoadBalancer" => Ok(ServiceType::LoadBalancer),
            other => Err(ValidationError::UnknownServiceType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// One dependent the store should hold after convergence.
#[derive(Debug, Clone, PartialEq)]
pub struct DependentSpec {
    pub key: ObjectKey,
    pub desired: DependentObject,
}

pub fn deployment_name(owner: &str) -> String {
    format!("{}-deployment", owner)
}

pub fn service_name(owner: &str) -> String {
    format!("{}-service", owner)
}

pub fn config_map_name(owner: &str) -> String {
    format!("{}-config", owner)
}

/// Labels set on every dependent.
pub fn dependent_labels(desired: &DesiredState, manager_name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(desired);
    labels.insert("managed-by".to_string(), manager_name.to_string());
    labels
}

/// Labels the Service and Deployment select pods by.
pub fn selector_labels(desired: &DesiredState) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_LABEL_VALUE.to_string()),
        ("instance".to_string(), desired.name.clone()),
    ])
}

/// Compute the dependents for `desired`, in convergence order.
pub fn synthesize(
    desired: &DesiredState,
    manager_name: &str,
    generated_at: DateTime<Utc>,
) -> Result<Vec<DependentSpec>, ValidationError> {
    validate(desired)?;
    let service_type = ServiceType::parse(&desired.service_type)?;

    let dependents = vec![
        DependentObject::Deployment(build_deployment(desired, manager_name)),
        DependentObject::Service(build_service(desired, manager_name, service_type)),
        DependentObject::ConfigMap(build_config_map(desired, manager_name, generated_at)),
    ];

    dependents
        .into_iter()
        .map(|object| {
            let key = object.key();
            if key.name.len() > MAX_NAME_LEN {
                return Err(ValidationError::NameTooLong(key.name));
            }
            Ok(DependentSpec { key, desired: object })
        })
        .collect()
}

fn validate(desired: &DesiredState) -> Result<(), ValidationError> {
    if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&desired.replicas) {
        return Err(ValidationError::ReplicasOutOfRange {
            value: desired.replicas,
            min: MIN_REPLICAS,
            max: MAX_REPLICAS,
        });
    }
    if !(1..=65535).contains(&desired.port) {
        return Err(ValidationError::PortOutOfRange(desired.port));
    }
    if desired.image.trim().is_empty() {
        return Err(ValidationError::EmptyImage);
    }
    if !is_css_color(&desired.config.color) {
        return Err(ValidationError::InvalidColor(desired.config.color.clone()));
    }
    Ok(())
}

/// `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa` or a named colour keyword.
fn is_css_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => (1..=32).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphabetic()),
    }
}

fn object_meta(desired: &DesiredState, name: String, manager_name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(desired.namespace.clone()),
        labels: Some(dependent_labels(desired, manager_name)),
        ..Default::default()
    }
}

fn build_deployment(desired: &DesiredState, manager_name: &str) -> Deployment {
    let selector = selector_labels(desired);
    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(desired.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: desired.port,
            name: Some(PORT_NAME.to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: HTML_VOLUME.to_string(),
            mount_path: HTML_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };
    let volume = Volume {
        name: HTML_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(&desired.name).into(),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(desired, deployment_name(&desired.name), manager_name),
        spec: Some(DeploymentSpec {
            replicas: Some(desired.replicas),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![volume]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn build_service(desired: &DesiredState, manager_name: &str, service_type: ServiceType) -> Service {
    Service {
        metadata: object_meta(desired, service_name(&desired.name), manager_name),
        spec: Some(ServiceSpec {
            type_: Some(service_type.as_str().to_string()),
            selector: Some(selector_labels(desired)),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(desired.port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

fn build_config_map(desired: &DesiredState, manager_name: &str, generated_at: DateTime<Utc>) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(desired, config_map_name(&desired.name), manager_name),
        data: Some(BTreeMap::from([(
            INDEX_HTML.to_string(),
            render_html(desired, generated_at),
        )])),
        ..Default::default()
    }
}

/// Payload without the generated-at line, for comparing generated content.
pub fn stable_content(payload: &str) -> String {
    payload
        .lines()
        .filter(|line| !line.trim_start().starts_with(GENERATED_LINE_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_html(desired: &DesiredState, generated_at: DateTime<Utc>) -> String {
    let config = &desired.config;
    let title = escape_html(&config.title);
    let color = &config.color;
    let message = escape_html(&config.message);

    // BTreeMap iteration keeps the feature list in a stable order.
    let mut features = String::new();
    for (feature, _) in config.features.iter().filter(|(_, enabled)| **enabled) {
        features.push_str(&format!("                <li>{}</li>\n", escape_html(feature)));
    }
    let features_block = if features.is_empty() {
        String::new()
    } else {
        format!(
            "\n        <div class=\"info\">\n            <h3>Enabled Features</h3>\n            <ul>\n{}            </ul>\n        </div>\n",
            features
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: Arial, sans-serif;
            background-color: {color};
            margin: 0;
            padding: 20px;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
        }}
        .container {{
            text-align: center;
            background: white;
            padding: 40px;
            border-radius: 10px;
            box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1);
            max-width: 600px;
        }}
        h1 {{ color: #333; margin-bottom: 20px; }}
        p {{ color: #666; font-size: 18px; line-height: 1.6; }}
        .info {{
            margin-top: 30px;
            padding: 20px;
            background: #f8f9fa;
            border-radius: 5px;
            text-align: left;
        }}
        .info h3 {{ margin-top: 0; color: #495057; }}
        .info ul {{ color: #6c757d; }}
        .status {{
            margin-top: 20px;
            padding: 10px;
            background: #d4edda;
            border: 1px solid #c3e6cb;
            border-radius: 5px;
            color: #155724;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        <p>{message}</p>

        <div class="info">
            <h3>Webserver Operator Demo</h3>
            <ul>
                <li><strong>Instance:</strong> {name}</li>
                <li><strong>Namespace:</strong> {namespace}</li>
                <li><strong>Replicas:</strong> {replicas}</li>
                <li><strong>Image:</strong> {image}</li>
                <li><strong>Port:</strong> {port}</li>
                <li><strong>Service Type:</strong> {service_type}</li>
                {generated_prefix} {generated}</li>
            </ul>
        </div>
{features_block}
        <div class="status">
            Web server is running successfully!
        </div>
    </div>
</body>
</html>
"#,
        name = escape_html(&desired.name),
        namespace = escape_html(&desired.namespace),
        replicas = desired.replicas,
        image = escape_html(&desired.image),
        port = desired.port,
        service_type = escape_html(&desired.service_type),
        generated_prefix = GENERATED_LINE_PREFIX,
        generated = generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"Tom\" & 'Jerry'</b>"), "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_stable_content_drops_only_generated_line() {
        let payload = "<ul>\n    <li data-volatile><strong>Generated:</strong> 12:00</li>\n</ul>";
        assert_eq!(stable_content(payload), "<ul>\n</ul>");

        let user_line = "<ul>\n<li>data-volatile title</li>\n</ul>";
        assert_eq!(stable_content(user_line), user_line);
    }

    #[test]
    fn test_css_color_tokens() {
        assert!(is_css_color("#f0f0f0"));
        assert!(is_css_color("#FFF"));
        assert!(is_css_color("#11223344"));
        assert!(is_css_color("rebeccapurple"));
        assert!(!is_css_color("#12345"));
        assert!(!is_css_color("#zzzzzz"));
        assert!(!is_css_color("red; } body { display:none"));
        assert!(!is_css_color(""));
    }

    #[test]
    fn test_service_type_parse() {
        assert_eq!(ServiceType::parse("NodePort"), Ok(ServiceType::NodePort));
        assert_eq!(
            ServiceType::parse("ExternalName"),
            Err(ValidationError::UnknownServiceType("ExternalName".to_string()))
        );
    }
}
