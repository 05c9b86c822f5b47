//! Pod classification and the paginated cleanup sweep.
//!
//! A pod is eligible for deletion when it
//!
//! - has succeeded,
//! - has failed and will never be restarted,
//! - was evicted, whatever phase it reports, or
//! - has been pending for longer than the minimum pending threshold.
//!
//! Classification only looks at one [`PodObservation`] at a time. The sweep
//! walks the listing page by page, deletes eligible pods as it goes, and
//! drops each page before fetching the next.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SweepConfig;
use crate::k8s::PodClient;
use crate::types::{PodObservation, PodPhase, PodReason, RestartPolicy};
use crate::Result;

/// Pending pods younger than this are never deleted.
pub const MIN_PENDING_FLOOR_MINUTES: i64 = 5;

/// Minimum age, in minutes, before a pending pod is considered stuck.
///
/// Values below [`MIN_PENDING_FLOOR_MINUTES`] are raised to the floor so that
/// pods still pulling images or starting containers are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MinPendingMinutes(i64);

impl MinPendingMinutes {
    /// Clamp a requested threshold to the floor.
    #[must_use]
    pub fn new(requested: i64) -> Self {
        Self(requested.max(MIN_PENDING_FLOOR_MINUTES))
    }

    /// The effective threshold in minutes.
    #[must_use]
    pub const fn minutes(self) -> i64 {
        self.0
    }

    /// The effective threshold as a duration, saturating at
    /// [`Duration::MAX`].
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::try_minutes(self.0).unwrap_or(Duration::MAX)
    }
}

impl Default for MinPendingMinutes {
    fn default() -> Self {
        Self(MIN_PENDING_FLOOR_MINUTES)
    }
}

/// Why a pod was found eligible for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionRule {
    /// All containers terminated successfully.
    Succeeded,
    /// Failed with restart policy `Never`.
    FailedNeverRestart,
    /// Evicted by the kubelet.
    Evicted,
    /// Pending longer than the threshold.
    StuckPending,
}

/// Outcome of classifying one pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionDecision {
    /// The rule that matched, if any.
    pub rule: Option<DeletionRule>,
    /// Snapshot of the fields the decision was based on.
    pub justification: String,
}

impl DeletionDecision {
    /// Whether the pod should be deleted.
    #[must_use]
    pub const fn should_delete(&self) -> bool {
        self.rule.is_some()
    }
}

/// Classify a pod.
///
/// `now` is converted into the offset of the pod's creation timestamp before
/// the pending age is computed. A pending pod without a creation timestamp is
/// never considered stuck.
#[must_use]
pub fn classify(
    obs: &PodObservation,
    min_pending: MinPendingMinutes,
    now: DateTime<Utc>,
) -> DeletionDecision {
    let rule = if obs.phase == PodPhase::Succeeded {
        Some(DeletionRule::Succeeded)
    } else if obs.phase == PodPhase::Failed && obs.restart_policy == RestartPolicy::Never {
        Some(DeletionRule::FailedNeverRestart)
    } else if obs.reason == PodReason::Evicted {
        Some(DeletionRule::Evicted)
    } else if obs.phase == PodPhase::Pending && pending_too_long(obs, min_pending, now) {
        Some(DeletionRule::StuckPending)
    } else {
        None
    };

    DeletionDecision {
        rule,
        justification: format!(
            "phase \"{}\" and reason \"{}\", restart policy \"{}\"",
            obs.phase, obs.reason, obs.restart_policy
        ),
    }
}

/// Whether `obs` is eligible for deletion.
#[must_use]
pub fn should_delete(
    obs: &PodObservation,
    min_pending: MinPendingMinutes,
    now: DateTime<Utc>,
) -> bool {
    classify(obs, min_pending, now).should_delete()
}

fn pending_too_long(
    obs: &PodObservation,
    min_pending: MinPendingMinutes,
    now: DateTime<Utc>,
) -> bool {
    let Some(created) = obs.creation_timestamp else {
        return false;
    };
    let now = now.with_timezone(created.offset());
    now.signed_duration_since(created) > min_pending.as_duration()
}

/// What the sweep did with one pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SweepAction {
    /// The pod was deleted.
    Deleted,
    /// Deletion was attempted and failed.
    DeleteFailed {
        /// The error reported by the client.
        error: String,
    },
    /// The pod was left alone.
    Retained,
}

/// Per-pod result of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodOutcome {
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
    /// Classification result.
    pub decision: DeletionDecision,
    /// Action taken.
    pub action: SweepAction,
}

impl fmt::Display for PodOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            SweepAction::Deleted => write!(
                f,
                "Deleted pod \"{}\" {}",
                self.name, self.decision.justification
            ),
            SweepAction::DeleteFailed { error } => {
                write!(f, "Can't remove pod \"{}\": {error}", self.name)
            }
            SweepAction::Retained => write!(f, "No action taken on pod {}", self.name),
        }
    }
}

/// A deletion that failed during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDeletion {
    /// Pod name.
    pub name: String,
    /// Error message.
    pub error: String,
}

/// Summary of a completed sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Namespace that was swept.
    pub namespace: String,
    /// Effective pending threshold in minutes.
    pub min_pending_minutes: i64,
    /// Number of list calls made.
    pub pages: usize,
    /// Number of pods inspected.
    pub inspected: usize,
    /// Number of pods deleted.
    pub deleted: usize,
    /// Number of pods retained.
    pub retained: usize,
    /// Deletions that failed.
    pub failures: Vec<FailedDeletion>,
}

impl SweepReport {
    fn new(namespace: &str, min_pending: MinPendingMinutes) -> Self {
        Self {
            namespace: namespace.to_string(),
            min_pending_minutes: min_pending.minutes(),
            pages: 0,
            inspected: 0,
            deleted: 0,
            retained: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, outcome: &PodOutcome) {
        self.inspected += 1;
        match &outcome.action {
            SweepAction::Deleted => self.deleted += 1,
            SweepAction::Retained => self.retained += 1,
            SweepAction::DeleteFailed { error } => self.failures.push(FailedDeletion {
                name: outcome.name.clone(),
                error: error.clone(),
            }),
        }
    }
}

/// Deletes finished, evicted, and stuck executor worker pods.
pub struct PodSweeper {
    client: Arc<dyn PodClient>,
    config: SweepConfig,
}

impl PodSweeper {
    /// Create a sweeper over `client`.
    #[must_use]
    pub fn new(client: Arc<dyn PodClient>, config: SweepConfig) -> Self {
        Self { client, config }
    }

    /// Sweep `namespace` once.
    ///
    /// # Errors
    ///
    /// Returns an error if listing any page fails. Failed deletions are
    /// logged and reported, never returned.
    pub async fn sweep(&self, namespace: &str, min_pending_minutes: i64) -> Result<SweepReport> {
        self.sweep_with(namespace, min_pending_minutes, |_| {}).await
    }

    /// Sweep `namespace` once, calling `on_outcome` after each pod.
    ///
    /// # Errors
    ///
    /// Returns an error if listing any page fails.
    pub async fn sweep_with<F>(
        &self,
        namespace: &str,
        min_pending_minutes: i64,
        mut on_outcome: F,
    ) -> Result<SweepReport>
    where
        F: FnMut(&PodOutcome) + Send,
    {
        let min_pending = MinPendingMinutes::new(min_pending_minutes);
        if min_pending.minutes() != min_pending_minutes {
            debug!(
                requested = min_pending_minutes,
                effective = min_pending.minutes(),
                "Raised minimum pending minutes to the floor"
            );
        }

        info!(
            namespace,
            label_selector = %self.config.label_selector,
            min_pending_minutes = min_pending.minutes(),
            "Listing pods"
        );

        let mut report = SweepReport::new(namespace, min_pending);
        let mut continue_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_pods(
                    namespace,
                    &self.config.label_selector,
                    self.config.page_size,
                    continue_token.as_deref(),
                )
                .await?;
            report.pages += 1;

            for pod in &page.items {
                let outcome = self.process(pod, min_pending).await;
                report.record(&outcome);
                on_outcome(&outcome);
            }

            match page.continue_token {
                Some(token) => continue_token = Some(token),
                None => break,
            }
        }

        info!(
            namespace,
            pages = report.pages,
            inspected = report.inspected,
            deleted = report.deleted,
            retained = report.retained,
            failed = report.failures.len(),
            "Sweep complete"
        );

        Ok(report)
    }

    async fn process(&self, pod: &PodObservation, min_pending: MinPendingMinutes) -> PodOutcome {
        debug!(pod_name = %pod.name, "Inspecting pod");

        let decision = classify(pod, min_pending, Utc::now());

        let action = if decision.should_delete() {
            info!(
                pod_name = %pod.name,
                namespace = %pod.namespace,
                rule = ?decision.rule,
                phase = %pod.phase,
                reason = %pod.reason,
                restart_policy = %pod.restart_policy,
                "Deleting pod"
            );
            match self.client.delete_pod(&pod.name, &pod.namespace).await {
                Ok(()) => SweepAction::Deleted,
                Err(e) if e.is_not_found() => {
                    warn!(pod_name = %pod.name, error = %e, "Pod already gone");
                    SweepAction::DeleteFailed {
                        error: e.to_string(),
                    }
                }
                Err(e) => {
                    error!(pod_name = %pod.name, error = %e, "Failed to delete pod");
                    SweepAction::DeleteFailed {
                        error: e.to_string(),
                    }
                }
            }
        } else {
            debug!(pod_name = %pod.name, "No action taken on pod");
            SweepAction::Retained
        };

        PodOutcome {
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            decision,
            action,
        }
    }
}
