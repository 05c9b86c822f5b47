//! Pod observation types.
//!
//! Cluster pods are normalized into [`PodObservation`] at ingestion so the
//! sweeper never string-compares phases, reasons, or restart policies.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

/// Phase of the pod lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PodPhase {
    /// Pod has been accepted but containers are not yet running.
    Pending,
    /// Pod is running with at least one container.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// Pod status cannot be determined.
    #[default]
    Unknown,
}

impl PodPhase {
    /// Parse a pod phase from a Kubernetes phase string, ignoring case.
    #[must_use]
    pub fn from_k8s_phase(phase: &str) -> Self {
        match phase.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name of the phase.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason reported in the pod status, lowercased.
///
/// An absent reason is stored as [`PodReason::None`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PodReason {
    /// No reason reported.
    #[default]
    None,
    /// The pod was evicted by the kubelet.
    Evicted,
    /// Any other reason, lowercased.
    Other(String),
}

impl PodReason {
    /// Parse an optional status reason, ignoring case.
    #[must_use]
    pub fn from_k8s_reason(reason: Option<&str>) -> Self {
        let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
            return Self::None;
        };
        let lower = reason.to_ascii_lowercase();
        if lower == "evicted" {
            Self::Evicted
        } else {
            Self::Other(lower)
        }
    }

    /// Lowercase reason text, empty when absent.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "",
            Self::Evicted => "evicted",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for PodReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restart policy from the pod spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Containers are always restarted.
    #[default]
    Always,
    /// Containers are restarted on failure.
    OnFailure,
    /// Containers are never restarted.
    Never,
}

impl RestartPolicy {
    /// Parse an optional restart policy, ignoring case.
    ///
    /// Missing or unrecognized values map to [`RestartPolicy::Always`], which
    /// never makes a failed pod eligible for deletion.
    #[must_use]
    pub fn from_k8s_policy(policy: Option<&str>) -> Self {
        match policy.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
            Some("never") => Self::Never,
            Some("onfailure") => Self::OnFailure,
            _ => Self::Always,
        }
    }

    /// Lowercase name of the policy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::OnFailure => "onfailure",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one cluster pod at scan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodObservation {
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
    /// Lifecycle phase.
    pub phase: PodPhase,
    /// Status reason.
    pub reason: PodReason,
    /// Restart policy from the spec.
    pub restart_policy: RestartPolicy,
    /// When the pod was created, in the offset the cluster reported.
    pub creation_timestamp: Option<DateTime<FixedOffset>>,
}

impl PodObservation {
    /// Normalize a Kubernetes pod into an observation.
    ///
    /// Returns `None` for pods without a name, which cannot be deleted.
    /// Pods without a namespace are attributed to `namespace`.
    #[must_use]
    pub fn from_pod(pod: &Pod, namespace: &str) -> Option<Self> {
        let name = pod.metadata.name.clone()?;
        let status = pod.status.as_ref();

        Some(Self {
            name,
            namespace: pod
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| namespace.to_string()),
            phase: status
                .and_then(|s| s.phase.as_deref())
                .map(PodPhase::from_k8s_phase)
                .unwrap_or_default(),
            reason: PodReason::from_k8s_reason(status.and_then(|s| s.reason.as_deref())),
            restart_policy: RestartPolicy::from_k8s_policy(
                pod.spec.as_ref().and_then(|s| s.restart_policy.as_deref()),
            ),
            creation_timestamp: pod
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0.fixed_offset()),
        })
    }
}

/// One page of a pod listing.
#[derive(Debug, Clone, Default)]
pub struct PodPage {
    /// Pods in the order the API returned them.
    pub items: Vec<PodObservation>,
    /// Token for the next page; `None` ends the traversal.
    pub continue_token: Option<String>,
}
