//! DAG definitions and task descriptors.
//!
//! A [`DagDefinition`] is the caller-supplied task set. Each task is turned
//! into a [`TaskDescriptor`] carrying the run identity and the command the
//! worker pod executes.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::{DagId, RunId, TaskId};

/// Folder prefix the worker resolves DAG files against.
pub const DAGS_FOLDER: &str = "DAGS_FOLDER";

/// A DAG and the tasks belonging to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagDefinition {
    /// The DAG identifier.
    pub dag_id: DagId,
    /// Location of the DAG file relative to the DAGs folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_fileloc: Option<String>,
    /// Tasks in declaration order.
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

/// A single task of a DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// The task identifier.
    pub task_id: TaskId,
    /// Try number the manifest is rendered for.
    #[serde(default)]
    pub try_number: u32,
    /// Per-task pod override, shaped like a pod manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_config: Option<serde_json::Value>,
}

impl DagDefinition {
    /// Check that task ids are unique within the DAG.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateTask`] for the first repeated task id.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.tasks.len());
        for task in &self.tasks {
            if !seen.insert(&task.task_id) {
                return Err(CoreError::DuplicateTask {
                    dag_id: self.dag_id.clone(),
                    task_id: task.task_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Everything needed to render the worker pod of one task try.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// The DAG the task belongs to.
    pub dag_id: DagId,
    /// The task identifier.
    pub task_id: TaskId,
    /// The DAG run identifier.
    pub run_id: RunId,
    /// The try number.
    pub try_number: u32,
    /// Logical date of the run.
    pub logical_date: DateTime<FixedOffset>,
    /// Worker container arguments.
    pub args: Vec<String>,
    /// Optional pod override.
    pub executor_config: Option<serde_json::Value>,
}

impl TaskDescriptor {
    /// Build the descriptor of `task` for a manually triggered run.
    #[must_use]
    pub fn for_manual_run(
        dag: &DagDefinition,
        task: &TaskDefinition,
        logical_date: DateTime<FixedOffset>,
    ) -> Self {
        let run_id = RunId::manual(&logical_date);
        let args = command_args(
            &dag.dag_id,
            &task.task_id,
            &run_id,
            dag.relative_fileloc.as_deref(),
        );

        Self {
            dag_id: dag.dag_id.clone(),
            task_id: task.task_id.clone(),
            run_id,
            try_number: task.try_number,
            logical_date,
            args,
            executor_config: task.executor_config.clone(),
        }
    }
}

/// Compute the worker command line for a task run.
#[must_use]
pub fn command_args(
    dag_id: &DagId,
    task_id: &TaskId,
    run_id: &RunId,
    relative_fileloc: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "airflow".to_string(),
        "tasks".to_string(),
        "run".to_string(),
        dag_id.to_string(),
        task_id.to_string(),
        run_id.to_string(),
        "--local".to_string(),
    ];
    if let Some(fileloc) = relative_fileloc {
        args.push("--subdir".to_string());
        args.push(format!("{DAGS_FOLDER}/{}", fileloc.trim_start_matches('/')));
    }
    args
}
