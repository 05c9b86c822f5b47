//! Kubernetes pod client.
//!
//! This module provides the [`PodClient`] trait used by the sweeper and the
//! [`KubePodClient`] implementation backed by the cluster API.

use std::future::Future;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams};
use kube::Client;
use tracing::{debug, info, warn};

use crate::config::{RetryConfig, SweepConfig};
use crate::types::{PodObservation, PodPage};
use crate::{KubeError, Result};

/// The `PodClient` trait defines the cluster operations the sweeper needs.
#[async_trait]
pub trait PodClient: Send + Sync {
    /// List one page of pods matching `label_selector` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be listed (connectivity,
    /// authorization, or API failure).
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
        page_size: u32,
        continue_token: Option<&str>,
    ) -> Result<PodPage>;

    /// Delete a single pod.
    ///
    /// # Errors
    ///
    /// Returns [`KubeError::PodNotFound`] if the pod is already gone, or a
    /// transport error for any other failure.
    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<()>;
}

/// Pod client backed by a Kubernetes API server.
pub struct KubePodClient {
    client: Client,
    retry: RetryConfig,
}

impl KubePodClient {
    /// Create a client from the inferred cluster configuration.
    ///
    /// This uses in-cluster config or the local kubeconfig, with request
    /// timeouts taken from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if no cluster configuration can be loaded or the
    /// client cannot be built.
    pub async fn new(config: &SweepConfig) -> Result<Self> {
        let mut kube_config = kube::Config::infer()
            .await
            .map_err(|e| KubeError::Config(format!("Failed to load cluster config: {e}")))?;

        let timeout = config.request_timeout();
        kube_config.connect_timeout = Some(timeout);
        kube_config.read_timeout = Some(timeout);
        kube_config.write_timeout = Some(timeout);

        let client = Client::try_from(kube_config)?;

        Ok(Self::with_client(client, config.retry.clone()))
    }

    /// Create a pod client with a pre-configured kube client.
    #[must_use]
    pub fn with_client(client: Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    fn pods_api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Run `op`, retrying retriable failures with exponential backoff.
///
/// `op` is called at most `retry.max_attempts` times, and at least once.
/// Non-retriable errors are returned immediately.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-retriable error.
pub async fn retry_with<T, F, Fut>(retry: &RetryConfig, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retriable() && attempt < max_attempts => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Kubernetes API call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
        page_size: u32,
        continue_token: Option<&str>,
    ) -> Result<PodPage> {
        let pods = self.pods_api(namespace);
        let mut params = ListParams::default()
            .labels(label_selector)
            .limit(page_size);
        if let Some(token) = continue_token {
            params = params.continue_token(token);
        }

        let (pods, params) = (&pods, &params);
        let pod_list = retry_with(&self.retry, "list_pods", || async move {
            pods.list(params).await.map_err(KubeError::from)
        })
        .await?;

        let mut items = Vec::with_capacity(pod_list.items.len());
        for pod in &pod_list.items {
            match PodObservation::from_pod(pod, namespace) {
                Some(observation) => items.push(observation),
                None => warn!(namespace, "Skipping pod without a name"),
            }
        }

        let continue_token = pod_list.metadata.continue_.filter(|t| !t.is_empty());

        debug!(
            namespace,
            count = items.len(),
            has_more = continue_token.is_some(),
            "Listed pod page"
        );

        Ok(PodPage {
            items,
            continue_token,
        })
    }

    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<()> {
        let pods = &self.pods_api(namespace);

        let mut attempt = 0_u32;
        let result = retry_with(&self.retry, "delete_pod", || {
            attempt += 1;
            let retried = attempt > 1;
            async move {
                match pods.delete(name, &DeleteParams::default()).await {
                    Ok(_) => Ok(()),
                    Err(kube::Error::Api(e)) if e.code == 404 => {
                        not_found_outcome(name, namespace, retried)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        })
        .await;

        if result.is_ok() {
            info!(pod_name = name, namespace, "Delete request accepted");
        }
        result
    }
}

/// Map a 404 on delete.
///
/// A 404 after a failed attempt means an earlier request already removed the
/// pod, so it counts as deleted.
fn not_found_outcome(name: &str, namespace: &str, retried: bool) -> Result<()> {
    if retried {
        debug!(pod_name = name, namespace, "Pod gone after retried delete");
        return Ok(());
    }
    Err(KubeError::PodNotFound {
        name: name.to_string(),
        namespace: namespace.to_string(),
    })
}

/// A mock pod client for testing without a real Kubernetes cluster.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use kube::core::ErrorResponse;
    use parking_lot::Mutex;
    use std::collections::{HashSet, VecDeque};

    /// A list call observed by the mock.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ListCall {
        /// Namespace that was listed.
        pub namespace: String,
        /// Label selector that was sent.
        pub label_selector: String,
        /// Requested page size.
        pub page_size: u32,
        /// Continuation token that was sent.
        pub continue_token: Option<String>,
    }

    enum ScriptedPage {
        Page(PodPage),
        Fail(u16),
    }

    /// A mock client that serves scripted pages and records every call.
    #[derive(Default)]
    pub struct MockPodClient {
        pages: Mutex<VecDeque<ScriptedPage>>,
        list_calls: Mutex<Vec<ListCall>>,
        delete_calls: Mutex<Vec<String>>,
        failing_deletes: Mutex<HashSet<String>>,
        deleted: Mutex<HashSet<String>>,
    }

    impl MockPodClient {
        /// Create a new mock client with no pages.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a page of pods followed by `continue_token`.
        #[must_use]
        pub fn with_page(self, items: Vec<PodObservation>, continue_token: Option<&str>) -> Self {
            self.pages.lock().push_back(ScriptedPage::Page(PodPage {
                items,
                continue_token: continue_token.map(str::to_string),
            }));
            self
        }

        /// Queue a list failure with the given API status code.
        #[must_use]
        pub fn with_list_failure(self, code: u16) -> Self {
            self.pages.lock().push_back(ScriptedPage::Fail(code));
            self
        }

        /// Make deleting `name` fail with an API error.
        #[must_use]
        pub fn failing_delete(self, name: &str) -> Self {
            self.failing_deletes.lock().insert(name.to_string());
            self
        }

        /// All list calls in the order they were made.
        #[must_use]
        pub fn list_calls(&self) -> Vec<ListCall> {
            self.list_calls.lock().clone()
        }

        /// Names of all pods a delete was attempted for, in order.
        #[must_use]
        pub fn delete_calls(&self) -> Vec<String> {
            self.delete_calls.lock().clone()
        }
    }

    pub(crate) fn api_error(code: u16, message: &str) -> KubeError {
        KubeError::Transport(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "Mock".to_string(),
            code,
        }))
    }

    #[async_trait]
    impl PodClient for MockPodClient {
        async fn list_pods(
            &self,
            namespace: &str,
            label_selector: &str,
            page_size: u32,
            continue_token: Option<&str>,
        ) -> Result<PodPage> {
            self.list_calls.lock().push(ListCall {
                namespace: namespace.to_string(),
                label_selector: label_selector.to_string(),
                page_size,
                continue_token: continue_token.map(str::to_string),
            });

            match self.pages.lock().pop_front() {
                Some(ScriptedPage::Page(page)) => Ok(page),
                Some(ScriptedPage::Fail(code)) => Err(api_error(code, "scripted list failure")),
                None => Ok(PodPage::default()),
            }
        }

        async fn delete_pod(&self, name: &str, namespace: &str) -> Result<()> {
            self.delete_calls.lock().push(name.to_string());

            if self.failing_deletes.lock().contains(name) {
                return Err(api_error(500, "scripted delete failure"));
            }
            if !self.deleted.lock().insert(name.to_string()) {
                return Err(KubeError::PodNotFound {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{api_error, MockPodClient};
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use crate::types::{PodPhase, PodReason, RestartPolicy};

    fn observation(name: &str) -> PodObservation {
        PodObservation {
            name: name.to_string(),
            namespace: "airflow".to_string(),
            phase: PodPhase::Succeeded,
            reason: PodReason::None,
            restart_policy: RestartPolicy::Never,
            creation_timestamp: None,
        }
    }

    #[tokio::test]
    async fn mock_serves_pages_in_order() {
        let client = MockPodClient::new()
            .with_page(vec![observation("a")], Some("next"))
            .with_page(vec![observation("b")], None);

        let first = client.list_pods("airflow", "dag_id", 1, None).await.unwrap();
        assert_eq!(first.items[0].name, "a");
        assert_eq!(first.continue_token.as_deref(), Some("next"));

        let second = client
            .list_pods("airflow", "dag_id", 1, Some("next"))
            .await
            .unwrap();
        assert_eq!(second.items[0].name, "b");
        assert!(second.continue_token.is_none());

        let calls = client.list_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].continue_token.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn mock_list_failure_is_not_retriable_for_auth() {
        let client = MockPodClient::new().with_list_failure(403);
        let err = client.list_pods("airflow", "", 10, None).await.unwrap_err();
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn mock_second_delete_is_not_found() {
        let client = MockPodClient::new();
        client.delete_pod("a", "airflow").await.unwrap();
        let err = client.delete_pod("a", "airflow").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.delete_calls(), vec!["a", "a"]);
    }

    fn retry_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_factor: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retriable_errors_are_retried_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<()> = retry_with(&retry_config(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(503, "unavailable")) }
        })
        .await;

        assert!(result.unwrap_err().is_retriable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_after_success() {
        let calls = AtomicU32::new(0);

        let result = retry_with(&retry_config(5), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(api_error(429, "slow down"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_error_returns_after_first_attempt() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with(&retry_config(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(403, "forbidden")) }
        })
        .await;

        assert!(!result.unwrap_err().is_retriable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn not_found_on_first_delete_attempt_is_an_error() {
        let err = not_found_outcome("worker", "airflow", false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn not_found_on_retried_delete_counts_as_deleted() {
        assert!(not_found_outcome("worker", "airflow", true).is_ok());
    }
}
