//! Subcommand implementations.
//!
//! Each command loads its configuration, builds what it needs, and runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use podwarden_core::DagDefinition;
use podwarden_kube::pod::resolve_base_template;
use podwarden_kube::{
    KubePodClient, ManifestGenerationJob, PodSweeper, SweepConfig, WorkerConfig,
    WorkerPodRenderer,
};

/// Read a DAG definition from a YAML file.
pub async fn load_dag_definition(path: &Path) -> anyhow::Result<DagDefinition> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read DAG file {}", path.display()))?;
    let dag: DagDefinition = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid DAG file {}", path.display()))?;
    Ok(dag)
}

/// Render every task of the DAG in `dag_file` to YAML manifests.
pub async fn generate_pod_yaml(
    dag_file: &Path,
    logical_date: DateTime<FixedOffset>,
    output_path: &Path,
) -> anyhow::Result<()> {
    let target =
        render_manifests(dag_file, logical_date, output_path, WorkerConfig::from_env()).await?;
    println!("YAML output can be found at {}", target.display());
    Ok(())
}

async fn render_manifests(
    dag_file: &Path,
    logical_date: DateTime<FixedOffset>,
    output_path: &Path,
    config: WorkerConfig,
) -> anyhow::Result<PathBuf> {
    let dag = load_dag_definition(dag_file).await?;
    let base_template = resolve_base_template(&config)
        .await
        .context("Failed to load pod template")?;

    let job = ManifestGenerationJob::new(WorkerPodRenderer::new(config), base_template);
    let target = job
        .generate(&dag, logical_date, output_path)
        .await
        .with_context(|| format!("Failed to generate manifests for DAG {}", dag.dag_id))?;
    Ok(target)
}

/// Sweep `namespace` once, printing a line for every pod.
pub async fn cleanup_pods(namespace: &str, min_pending_minutes: i64) -> anyhow::Result<()> {
    let config = SweepConfig::from_env();
    let client = KubePodClient::new(&config)
        .await
        .context("Failed to connect to the cluster")?;
    let sweeper = PodSweeper::new(Arc::new(client), config);

    println!("Loading Kubernetes configuration");
    println!("Listing pods in namespace {namespace}");

    let report = sweeper
        .sweep_with(namespace, min_pending_minutes, |outcome| {
            println!("Inspecting pod {}", outcome.name);
            println!("{outcome}");
        })
        .await
        .with_context(|| format!("Failed to sweep namespace {namespace}"))?;

    println!(
        "Inspected {} pods: {} deleted, {} retained, {} failed",
        report.inspected,
        report.deleted,
        report.retained,
        report.failures.len()
    );
    Ok(())
}
