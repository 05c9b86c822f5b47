//! Core types and utilities for podwarden.
//!
//! This crate provides the foundational types shared by the pod sweeper and
//! the manifest generator:
//!
//! - **Identifiers**: validated DAG, task, and run ids
//! - **Labels**: label-safe timestamps, label values, and worker pod names
//! - **Tasks**: DAG definitions and the task descriptors rendered into pods
//!
//! # Example
//!
//! ```
//! use chrono::DateTime;
//! use podwarden_core::{label_safe_datestring, worker_pod_name, DagId, TaskId};
//!
//! let dag_id = DagId::new("etl").unwrap();
//! let task_id = TaskId::new("extract").unwrap();
//! let name = worker_pod_name(&dag_id, &task_id, 1);
//! assert!(name.starts_with("etl-extract-"));
//!
//! let date = DateTime::parse_from_rfc3339("2024-05-01T00:00:00+00:00").unwrap();
//! assert_eq!(label_safe_datestring(&date), "2024-05-01T00_00_00_plus_00_00");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod labels;
pub mod task;

pub use error::{CoreError, Result};
pub use ids::{DagId, IdError, RunId, TaskId};
pub use labels::{iso_format, label_safe_datestring, make_safe_label_value, worker_pod_name};
pub use task::{command_args, DagDefinition, TaskDefinition, TaskDescriptor};
