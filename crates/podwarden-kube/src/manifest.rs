//! Worker manifest generation.
//!
//! Renders the worker pod of every task in a DAG and writes each one to
//! `<output>/airflow_yaml_output/<dag>_<task>_<date>.yml`. The first failure
//! stops the run; files already written for earlier tasks are left in place.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use k8s_openapi::api::core::v1::Pod;
use podwarden_core::{label_safe_datestring, DagDefinition, DagId, TaskDescriptor, TaskId};
use tracing::{debug, info};

use crate::pod::{pod_override_from_value, ManifestRenderer};
use crate::{KubeError, Result};

/// Directory created under the output path.
pub const OUTPUT_SUBDIR: &str = "airflow_yaml_output";

/// File name of the manifest for one task.
#[must_use]
pub fn manifest_file_name(
    dag_id: &DagId,
    task_id: &TaskId,
    logical_date: &DateTime<FixedOffset>,
) -> String {
    format!(
        "{dag_id}_{task_id}_{}.yml",
        label_safe_datestring(logical_date)
    )
}

/// Writes one rendered worker manifest per task.
pub struct ManifestGenerationJob<R> {
    renderer: R,
    base_template: Pod,
}

impl<R: ManifestRenderer> ManifestGenerationJob<R> {
    /// Create a job rendering with `renderer` on top of `base_template`.
    #[must_use]
    pub fn new(renderer: R, base_template: Pod) -> Self {
        Self {
            renderer,
            base_template,
        }
    }

    /// Render a single task into a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the task's override is invalid or rendering fails.
    pub fn render_task(&self, descriptor: &TaskDescriptor) -> Result<Pod> {
        let pod_override = descriptor
            .executor_config
            .as_ref()
            .map(pod_override_from_value)
            .transpose()?
            .flatten();

        self.renderer
            .render(descriptor, &self.base_template, pod_override.as_ref())
    }

    /// Generate manifests for every task of `dag`.
    ///
    /// Returns the directory the files were written to.
    ///
    /// # Errors
    ///
    /// Returns an error if the DAG is invalid, or on the first render,
    /// serialization, or write failure. Later tasks are not processed.
    pub async fn generate(
        &self,
        dag: &DagDefinition,
        logical_date: DateTime<FixedOffset>,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        dag.validate()?;

        let target = output_dir.join(OUTPUT_SUBDIR);
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|source| KubeError::Io {
                path: target.clone(),
                source,
            })?;

        for task in &dag.tasks {
            let descriptor = TaskDescriptor::for_manual_run(dag, task, logical_date);
            let pod = self.render_task(&descriptor)?;
            let yaml = serde_yaml::to_string(&pod)?;

            let path = target.join(manifest_file_name(
                &dag.dag_id,
                &task.task_id,
                &logical_date,
            ));
            tokio::fs::write(&path, yaml)
                .await
                .map_err(|source| KubeError::Io {
                    path: path.clone(),
                    source,
                })?;

            debug!(
                dag_id = %dag.dag_id,
                task_id = %task.task_id,
                path = %path.display(),
                "Wrote worker manifest"
            );
        }

        info!(
            dag_id = %dag.dag_id,
            tasks = dag.tasks.len(),
            output = %target.display(),
            "Generated worker manifests"
        );

        Ok(target)
    }
}
