//! Common error types for podwarden.

use crate::ids::{DagId, TaskId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors shared across podwarden crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A task id appears more than once in a DAG.
    #[error("duplicate task {task_id} in dag {dag_id}")]
    DuplicateTask {
        /// The DAG containing the duplicate.
        dag_id: DagId,
        /// The repeated task id.
        task_id: TaskId,
    },
}
