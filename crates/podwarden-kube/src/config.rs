//! Configuration for the pod sweeper and the worker manifest generator.
//!
//! Every configuration type has a `Default` and a `from_env()` constructor
//! that overrides individual fields from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Label keys every executor worker pod carries.
pub const WORKER_POD_LABELS: [&str; 4] = ["dag_id", "task_id", "try_number", "airflow_version"];

/// Retry policy for Kubernetes API calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Initial delay, in milliseconds, before the first retry.
    pub initial_delay_ms: u64,

    /// Maximum delay between retries.
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = f64::from(self.backoff_factor.max(1.0)).powi(exponent);
        let delay = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay as u64)
    }
}

/// Configuration for the pod sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Label selector restricting the sweep to executor worker pods.
    pub label_selector: String,
    /// Number of pods requested per list call.
    pub page_size: u32,
    /// Timeout applied to each API request, in seconds.
    pub request_timeout_secs: u64,
    /// Retry policy for API calls.
    pub retry: RetryConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            label_selector: WORKER_POD_LABELS.join(","),
            page_size: 500,
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl SweepConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `PODWARDEN_LABEL_SELECTOR`: label selector for listed pods
    /// - `PODWARDEN_PAGE_SIZE`: pods per list call
    /// - `PODWARDEN_REQUEST_TIMEOUT_SECS`: per-request timeout
    /// - `PODWARDEN_RETRY_MAX_ATTEMPTS`: attempts per API call
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PODWARDEN_LABEL_SELECTOR") {
            config.label_selector = val;
        }
        if let Ok(val) = std::env::var("PODWARDEN_PAGE_SIZE") {
            if let Ok(n) = val.parse::<u32>() {
                config.page_size = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("PODWARDEN_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.request_timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("PODWARDEN_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse::<u32>() {
                config.retry.max_attempts = n.max(1);
            }
        }

        config
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration for rendering executor worker pods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker container image. When unset the template's image is kept.
    pub image: Option<String>,
    /// Namespace worker pods are created in.
    pub namespace: String,
    /// YAML pod template used as the base of every worker pod.
    pub pod_template_file: Option<PathBuf>,
    /// Value of the `airflow-worker` label.
    pub scheduler_job_id: String,
    /// Value of the `airflow_version` label.
    pub airflow_version: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            image: None,
            namespace: "default".to_string(),
            pod_template_file: None,
            scheduler_job_id: "worker-config".to_string(),
            airflow_version: "3.0.0".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `WORKER_IMAGE`: worker container image
    /// - `EXECUTOR_NAMESPACE`: namespace of worker pods
    /// - `POD_TEMPLATE_FILE`: path of the base pod template
    /// - `AIRFLOW_VERSION`: value of the `airflow_version` label
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WORKER_IMAGE") {
            config.image = Some(val);
        }
        if let Ok(val) = std::env::var("EXECUTOR_NAMESPACE") {
            config.namespace = val;
        }
        if let Ok(val) = std::env::var("POD_TEMPLATE_FILE") {
            config.pod_template_file = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("AIRFLOW_VERSION") {
            config.airflow_version = val;
        }

        config
    }
}
