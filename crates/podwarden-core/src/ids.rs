//! Identifier types for podwarden.
//!
//! This module provides strongly-typed identifiers for DAGs, tasks, and runs.
//! DAG and task ids end up in file names and pod labels, so they are validated
//! on construction and never re-checked downstream.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::labels::iso_format;

/// Maximum length of a DAG or task identifier.
pub const MAX_ID_LENGTH: usize = 250;

/// Identifier of a DAG.
///
/// Restricted to ASCII alphanumerics, `-`, `_` and `.`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DagId(String);

impl DagId {
    /// Parse a `DagId`, validating its characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty, too long, or contains a character
    /// outside `[A-Za-z0-9_.-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_key(&value)?;
        Ok(Self(value))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DagId({})", self.0)
    }
}

impl fmt::Display for DagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DagId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DagId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DagId> for String {
    fn from(id: DagId) -> Self {
        id.0
    }
}

impl AsRef<str> for DagId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a task within a DAG.
///
/// Same character rules as [`DagId`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Parse a `TaskId`, validating its characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty, too long, or contains a character
    /// outside `[A-Za-z0-9_.-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_key(&value)?;
        Ok(Self(value))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a DAG run.
///
/// Run ids are free-form; manually triggered runs use `manual__<iso date>`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Create a `RunId` from an arbitrary string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate the run id of a manually triggered run at `logical_date`.
    #[must_use]
    pub fn manual(logical_date: &DateTime<FixedOffset>) -> Self {
        Self(format!("manual__{}", iso_format(logical_date)))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_key(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(IdError::TooLong {
            max: MAX_ID_LENGTH,
            got: value.len(),
        });
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(IdError::InvalidCharacter {
            id: value.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier is empty.
    #[error("identifier must not be empty")]
    Empty,

    /// The identifier exceeds the maximum length.
    #[error("identifier too long: max {max} characters, got {got}")]
    TooLong {
        /// The maximum number of characters.
        max: usize,
        /// The actual number of characters.
        got: usize,
    },

    /// The identifier contains a character outside the allowed set.
    #[error("invalid character {ch:?} in identifier {id:?}")]
    InvalidCharacter {
        /// The rejected identifier.
        id: String,
        /// The first offending character.
        ch: char,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dag_id_accepts_key_characters() {
        let id = DagId::new("example_dag-v1.2").unwrap();
        assert_eq!(id.as_str(), "example_dag-v1.2");
        assert_eq!(id.to_string(), "example_dag-v1.2");
    }

    #[test]
    fn dag_id_rejects_empty() {
        assert_eq!(DagId::new(""), Err(IdError::Empty));
    }

    #[test]
    fn task_id_rejects_path_separator() {
        let result = TaskId::new("group/task");
        assert!(matches!(
            result,
            Err(IdError::InvalidCharacter { ch: '/', .. })
        ));
    }

    #[test]
    fn task_id_rejects_overlong() {
        let result = TaskId::new("t".repeat(MAX_ID_LENGTH + 1));
        assert!(matches!(result, Err(IdError::TooLong { .. })));
    }

    #[test]
    fn task_id_serde_validates() {
        let ok: TaskId = serde_json::from_str("\"extract\"").unwrap();
        assert_eq!(ok.as_str(), "extract");

        let bad: Result<TaskId, _> = serde_json::from_str("\"bad id\"");
        assert!(bad.is_err());
    }

    #[test]
    fn manual_run_id_uses_iso_date() {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
            .unwrap();
        assert_eq!(
            RunId::manual(&date).as_str(),
            "manual__2024-03-01T12:30:00+00:00"
        );
    }
}
