//! Sweep behavior against a scripted pod client.

use std::sync::Arc;

use chrono::{Duration, Utc};
use podwarden_kube::{
    MockPodClient, PodObservation, PodPhase, PodReason, PodSweeper, RestartPolicy, SweepAction,
    SweepConfig,
};

fn pods(prefix: &str, count: usize, phase: PodPhase) -> Vec<PodObservation> {
    (0..count)
        .map(|i| PodObservation {
            name: format!("{prefix}-{i}"),
            namespace: "airflow".to_string(),
            phase,
            reason: PodReason::None,
            restart_policy: RestartPolicy::Never,
            creation_timestamp: Some((Utc::now() - Duration::minutes(1)).fixed_offset()),
        })
        .collect()
}

#[tokio::test]
async fn follows_continuation_tokens_until_exhausted() {
    let client = Arc::new(
        MockPodClient::new()
            .with_page(pods("a", 500, PodPhase::Running), Some("A"))
            .with_page(pods("b", 500, PodPhase::Running), Some("B"))
            .with_page(pods("c", 12, PodPhase::Running), None),
    );
    let sweeper = PodSweeper::new(client.clone(), SweepConfig::default());

    let report = sweeper.sweep("airflow", 5).await.unwrap();

    let calls = client.list_calls();
    assert_eq!(calls.len(), 3);
    let tokens: Vec<_> = calls.iter().map(|c| c.continue_token.as_deref()).collect();
    assert_eq!(tokens, vec![None, Some("A"), Some("B")]);
    assert!(calls.iter().all(|c| c.page_size == 500));
    assert!(calls
        .iter()
        .all(|c| c.label_selector == "dag_id,task_id,try_number,airflow_version"));
    assert!(calls.iter().all(|c| c.namespace == "airflow"));

    assert_eq!(report.pages, 3);
    assert_eq!(report.inspected, 1012);
    assert_eq!(report.retained, 1012);
    assert!(client.delete_calls().is_empty());
}

#[tokio::test]
async fn delete_failure_does_not_stop_the_sweep() {
    let client = Arc::new(
        MockPodClient::new()
            .with_page(pods("pod", 10, PodPhase::Succeeded), None)
            .failing_delete("pod-4"),
    );
    let sweeper = PodSweeper::new(client.clone(), SweepConfig::default());

    let mut actions = Vec::new();
    let report = sweeper
        .sweep_with("airflow", 5, |outcome| {
            actions.push((outcome.name.clone(), outcome.action.clone()));
        })
        .await
        .unwrap();

    let attempted = client.delete_calls();
    assert_eq!(attempted.len(), 10);
    assert_eq!(attempted[9], "pod-9");

    assert_eq!(report.deleted, 9);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "pod-4");
    assert!(matches!(actions[4].1, SweepAction::DeleteFailed { .. }));
    assert!(actions[5..]
        .iter()
        .all(|(_, action)| *action == SweepAction::Deleted));
}

#[tokio::test]
async fn list_failure_mid_sweep_is_fatal() {
    let client = Arc::new(
        MockPodClient::new()
            .with_page(pods("ok", 3, PodPhase::Succeeded), Some("A"))
            .with_list_failure(401),
    );
    let sweeper = PodSweeper::new(client.clone(), SweepConfig::default());

    assert!(sweeper.sweep("airflow", 5).await.is_err());
    assert_eq!(client.delete_calls().len(), 3);
    assert_eq!(client.list_calls().len(), 2);
}

#[tokio::test]
async fn fresh_pending_pods_survive_low_threshold() {
    let client = Arc::new(MockPodClient::new().with_page(pods("new", 4, PodPhase::Pending), None));
    let sweeper = PodSweeper::new(client.clone(), SweepConfig::default());

    let report = sweeper.sweep("airflow", 0).await.unwrap();

    assert_eq!(report.min_pending_minutes, 5);
    assert_eq!(report.retained, 4);
    assert!(client.delete_calls().is_empty());
}

#[tokio::test]
async fn huge_pending_threshold_retains_pending_pods() {
    let client = Arc::new(
        MockPodClient::new().with_page(
            vec![
                PodObservation {
                    creation_timestamp: Some((Utc::now() - Duration::minutes(10)).fixed_offset()),
                    ..pods("stuck", 1, PodPhase::Pending).remove(0)
                },
                pods("done", 1, PodPhase::Succeeded).remove(0),
            ],
            None,
        ),
    );
    let sweeper = PodSweeper::new(client.clone(), SweepConfig::default());

    let report = sweeper.sweep("airflow", 200_000_000_000_000).await.unwrap();

    assert_eq!(report.retained, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(client.delete_calls(), vec!["done-0"]);
}
