//! Worker pod rendering.
//!
//! A worker pod is layered from three sources, later layers winning:
//!
//! 1. the base pod template,
//! 2. the task's pod override (`executor_config`),
//! 3. the dynamic pod carrying the task identity, image, and command.
//!
//! Objects are merged key by key. Lists of named entries (containers,
//! env vars, volumes, mounts, ...) are merged by `name`; any other value in a
//! later layer replaces the earlier one.

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec};
use kube::api::ObjectMeta;
use podwarden_core::{make_safe_label_value, worker_pod_name, TaskDescriptor};
use serde_json::Value;

use crate::config::WorkerConfig;
use crate::{KubeError, Result};

/// Name of the worker container.
pub const BASE_CONTAINER_NAME: &str = "base";

/// Workers run once; the executor handles retries.
const WORKER_RESTART_POLICY: &str = "Never";

/// Key under which `executor_config` may nest the pod override.
const POD_OVERRIDE_KEY: &str = "pod_override";

/// Renders the fully-resolved pod for a task.
///
/// Implementations must be deterministic: the same inputs always produce the
/// same pod.
pub trait ManifestRenderer: Send + Sync {
    /// Render the worker pod of `descriptor` on top of `base_template`, with
    /// `pod_override` applied in between.
    ///
    /// # Errors
    ///
    /// Returns [`KubeError::Template`] if the layers cannot be resolved into a
    /// valid pod.
    fn render(
        &self,
        descriptor: &TaskDescriptor,
        base_template: &Pod,
        pod_override: Option<&Pod>,
    ) -> Result<Pod>;
}

/// Renderer for executor worker pods.
#[derive(Debug, Clone, Default)]
pub struct WorkerPodRenderer {
    config: WorkerConfig,
}

impl WorkerPodRenderer {
    /// Create a renderer using `config` for image, namespace, and labels.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

impl ManifestRenderer for WorkerPodRenderer {
    fn render(
        &self,
        descriptor: &TaskDescriptor,
        base_template: &Pod,
        pod_override: Option<&Pod>,
    ) -> Result<Pod> {
        let dynamic = build_dynamic_pod(descriptor, &self.config);

        let mut merged = to_value(base_template)?;
        if let Some(pod_override) = pod_override {
            merge_values(&mut merged, to_value(pod_override)?);
        }
        merge_values(&mut merged, to_value(&dynamic)?);

        serde_json::from_value(merged)
            .map_err(|e| KubeError::Template(format!("merged pod is invalid: {e}")))
    }
}

/// Build the pod carrying a task's identity, image, and command.
#[must_use]
pub fn build_dynamic_pod(descriptor: &TaskDescriptor, config: &WorkerConfig) -> Pod {
    Pod {
        metadata: build_metadata(descriptor, config),
        spec: Some(PodSpec {
            containers: vec![build_container(descriptor, config)],
            restart_policy: Some(WORKER_RESTART_POLICY.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_metadata(descriptor: &TaskDescriptor, config: &WorkerConfig) -> ObjectMeta {
    let try_number = descriptor.try_number.to_string();

    let mut labels = BTreeMap::new();
    labels.insert(
        "airflow-worker".to_string(),
        make_safe_label_value(&config.scheduler_job_id),
    );
    labels.insert(
        "dag_id".to_string(),
        make_safe_label_value(descriptor.dag_id.as_str()),
    );
    labels.insert(
        "task_id".to_string(),
        make_safe_label_value(descriptor.task_id.as_str()),
    );
    labels.insert(
        "run_id".to_string(),
        make_safe_label_value(descriptor.run_id.as_str()),
    );
    labels.insert("try_number".to_string(), try_number.clone());
    labels.insert(
        "airflow_version".to_string(),
        make_safe_label_value(&config.airflow_version),
    );
    labels.insert("kubernetes_executor".to_string(), "True".to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert("dag_id".to_string(), descriptor.dag_id.to_string());
    annotations.insert("task_id".to_string(), descriptor.task_id.to_string());
    annotations.insert("run_id".to_string(), descriptor.run_id.to_string());
    annotations.insert("try_number".to_string(), try_number);

    ObjectMeta {
        name: Some(worker_pod_name(
            &descriptor.dag_id,
            &descriptor.task_id,
            descriptor.try_number,
        )),
        namespace: Some(config.namespace.clone()),
        labels: Some(labels),
        annotations: Some(annotations),
        ..Default::default()
    }
}

fn build_container(descriptor: &TaskDescriptor, config: &WorkerConfig) -> Container {
    Container {
        name: BASE_CONTAINER_NAME.to_string(),
        image: config.image.clone(),
        args: Some(descriptor.args.clone()),
        env: Some(vec![EnvVar {
            name: "AIRFLOW_IS_K8S_EXECUTOR_POD".to_string(),
            value: Some("True".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// The template used when no pod template file is configured.
#[must_use]
pub fn default_pod_template() -> Pod {
    Pod {
        metadata: ObjectMeta::default(),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: BASE_CONTAINER_NAME.to_string(),
                ..Default::default()
            }],
            restart_policy: Some(WORKER_RESTART_POLICY.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Load the base pod template from a YAML file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or a template error if it
/// does not contain a pod.
pub async fn load_pod_template(path: &Path) -> Result<Pod> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| KubeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    serde_yaml::from_str(&contents)
        .map_err(|e| KubeError::Template(format!("{}: {e}", path.display())))
}

/// Load the configured base template, falling back to the default one.
///
/// # Errors
///
/// Returns an error if a configured template file cannot be loaded.
pub async fn resolve_base_template(config: &WorkerConfig) -> Result<Pod> {
    match &config.pod_template_file {
        Some(path) => load_pod_template(path).await,
        None => Ok(default_pod_template()),
    }
}

/// Extract a pod override from a task's `executor_config`.
///
/// Accepts either a pod object or `{"pod_override": <pod>}`. A null value
/// means no override.
///
/// # Errors
///
/// Returns a template error if the value is not a pod.
pub fn pod_override_from_value(value: &Value) -> Result<Option<Pod>> {
    let pod_value = match value {
        Value::Null => return Ok(None),
        Value::Object(map) => map.get(POD_OVERRIDE_KEY).unwrap_or(value),
        other => {
            return Err(KubeError::Template(format!(
                "executor_config must be an object, got {other}"
            )))
        }
    };
    if pod_value.is_null() {
        return Ok(None);
    }

    serde_json::from_value(pod_value.clone())
        .map(Some)
        .map_err(|e| KubeError::Template(format!("invalid pod override: {e}")))
}

fn to_value(pod: &Pod) -> Result<Value> {
    Ok(serde_json::to_value(pod)?)
}

/// Merge `overlay` into `base`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(overlay_items))
            if is_named_list(base_items) && is_named_list(&overlay_items) =>
        {
            for item in overlay_items {
                let existing = base_items
                    .iter_mut()
                    .find(|candidate| candidate.get("name") == item.get("name"));
                match existing {
                    Some(existing) => merge_values(existing, item),
                    None => base_items.push(item),
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn is_named_list(items: &[Value]) -> bool {
    items
        .iter()
        .all(|item| item.get("name").is_some_and(Value::is_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};
    use podwarden_core::{DagDefinition, TaskDescriptor};
    use serde_json::json;

    fn logical_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00+00:00").unwrap()
    }

    fn descriptor(try_number: u32) -> TaskDescriptor {
        let dag: DagDefinition = serde_json::from_value(json!({
            "dag_id": "etl",
            "tasks": [{ "task_id": "extract", "try_number": try_number }]
        }))
        .unwrap();
        TaskDescriptor::for_manual_run(&dag, &dag.tasks[0], logical_date())
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            image: Some("apache/airflow:3.0.0".to_string()),
            namespace: "airflow".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn render_has_identity_and_command() {
        let renderer = WorkerPodRenderer::new(config());
        let pod = renderer
            .render(&descriptor(1), &default_pod_template(), None)
            .unwrap();

        let meta = &pod.metadata;
        assert!(meta.name.as_deref().unwrap().starts_with("etl-extract-"));
        assert_eq!(meta.namespace.as_deref(), Some("airflow"));

        let labels = meta.labels.as_ref().unwrap();
        assert_eq!(labels.get("dag_id").map(String::as_str), Some("etl"));
        assert_eq!(labels.get("task_id").map(String::as_str), Some("extract"));
        assert_eq!(labels.get("try_number").map(String::as_str), Some("1"));
        assert_eq!(
            labels.get("airflow-worker").map(String::as_str),
            Some("worker-config")
        );
        assert_eq!(
            labels.get("kubernetes_executor").map(String::as_str),
            Some("True")
        );

        let annotations = meta.annotations.as_ref().unwrap();
        assert_eq!(
            annotations.get("run_id").map(String::as_str),
            Some("manual__2024-05-01T00:00:00+00:00")
        );

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(spec.containers.len(), 1);
        let container = &spec.containers[0];
        assert_eq!(container.name, "base");
        assert_eq!(container.image.as_deref(), Some("apache/airflow:3.0.0"));
        assert_eq!(
            container.args.as_ref().unwrap()[..3],
            ["airflow".to_string(), "tasks".to_string(), "run".to_string()]
        );
    }

    #[test]
    fn render_is_deterministic() {
        let renderer = WorkerPodRenderer::new(config());
        let first = renderer
            .render(&descriptor(1), &default_pod_template(), None)
            .unwrap();
        let second = renderer
            .render(&descriptor(1), &default_pod_template(), None)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn try_number_changes_pod_name() {
        let renderer = WorkerPodRenderer::new(config());
        let first = renderer
            .render(&descriptor(1), &default_pod_template(), None)
            .unwrap();
        let second = renderer
            .render(&descriptor(2), &default_pod_template(), None)
            .unwrap();
        assert_ne!(first.metadata.name, second.metadata.name);
    }

    #[test]
    fn template_image_kept_without_configured_image() {
        let mut template = default_pod_template();
        template.spec.as_mut().unwrap().containers[0].image = Some("custom:1".to_string());

        let renderer = WorkerPodRenderer::new(WorkerConfig::default());
        let pod = renderer.render(&descriptor(1), &template, None).unwrap();
        assert_eq!(
            pod.spec.unwrap().containers[0].image.as_deref(),
            Some("custom:1")
        );
    }

    #[test]
    fn restart_policy_is_never_over_template_without_one() {
        let template = Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: BASE_CONTAINER_NAME.to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        let renderer = WorkerPodRenderer::new(WorkerConfig::default());
        let pod = renderer.render(&descriptor(1), &template, None).unwrap();
        assert_eq!(
            pod.spec.unwrap().restart_policy.as_deref(),
            Some("Never")
        );
    }

    #[test]
    fn override_merges_but_cannot_replace_identity() {
        let pod_override = pod_override_from_value(&json!({
            "pod_override": {
                "metadata": {
                    "name": "hijacked",
                    "labels": { "team": "data" }
                },
                "spec": {
                    "containers": [{
                        "name": "base",
                        "env": [{ "name": "EXTRA", "value": "1" }]
                    }, {
                        "name": "sidecar",
                        "image": "busybox"
                    }]
                }
            }
        }))
        .unwrap()
        .unwrap();

        let renderer = WorkerPodRenderer::new(config());
        let pod = renderer
            .render(&descriptor(1), &default_pod_template(), Some(&pod_override))
            .unwrap();

        assert_ne!(pod.metadata.name.as_deref(), Some("hijacked"));
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("data"));
        assert!(labels.contains_key("dag_id"));

        let containers = &pod.spec.as_ref().unwrap().containers;
        assert_eq!(containers.len(), 2);
        let env: Vec<_> = containers[0]
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(env, vec!["EXTRA", "AIRFLOW_IS_K8S_EXECUTOR_POD"]);
        assert_eq!(containers[1].name, "sidecar");
    }

    #[test]
    fn override_rejects_non_object() {
        assert!(pod_override_from_value(&json!("nope")).is_err());
        assert!(pod_override_from_value(&Value::Null).unwrap().is_none());
    }

    #[test]
    fn merge_replaces_scalars_and_plain_lists() {
        let mut base = json!({ "a": 1, "list": [1, 2], "nested": { "x": true } });
        merge_values(
            &mut base,
            json!({ "a": 2, "list": [3], "nested": { "y": false } }),
        );
        assert_eq!(
            base,
            json!({ "a": 2, "list": [3], "nested": { "x": true, "y": false } })
        );
    }

    #[tokio::test]
    async fn load_template_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.yaml");
        std::fs::write(
            &path,
            "apiVersion: v1\nkind: Pod\nmetadata:\n  labels:\n    env: test\nspec:\n  containers:\n    - name: base\n      image: worker:1\n",
        )
        .unwrap();

        let template = load_pod_template(&path).await.unwrap();
        assert_eq!(
            template.spec.unwrap().containers[0].image.as_deref(),
            Some("worker:1")
        );
    }

    #[tokio::test]
    async fn load_template_reports_missing_file() {
        let err = load_pod_template(Path::new("/nonexistent/template.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Io { .. }));
    }
}
