//! Podwarden CLI - sweeps finished worker pods and renders worker manifests.
//!
//! This is the entry point for the `podwarden` binary.

mod commands;

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Podwarden - executor worker pod housekeeping.
#[derive(Parser, Debug)]
#[command(name = "podwarden")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the worker pod manifest of every task in a DAG.
    GeneratePodYaml {
        /// YAML file describing the DAG and its tasks.
        #[arg(long)]
        dag_file: PathBuf,

        /// Logical date of the run (RFC 3339).
        #[arg(long, value_parser = parse_logical_date)]
        logical_date: DateTime<FixedOffset>,

        /// Directory the manifests are written under.
        #[arg(long, default_value = ".")]
        output_path: PathBuf,
    },

    /// Delete finished, evicted, and stuck worker pods.
    CleanupPods {
        /// Namespace to sweep.
        #[arg(long, env = "EXECUTOR_NAMESPACE", default_value = "default")]
        namespace: String,

        /// Minutes a pod may stay pending before it is deleted (at least 5).
        #[arg(long, default_value_t = 30, allow_negative_numbers = true)]
        min_pending_minutes: i64,
    },
}

fn parse_logical_date(value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value).map_err(|e| format!("invalid RFC 3339 date: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,podwarden=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Command::GeneratePodYaml {
            dag_file,
            logical_date,
            output_path,
        } => commands::generate_pod_yaml(&dag_file, logical_date, &output_path).await,
        Command::CleanupPods {
            namespace,
            min_pending_minutes,
        } => commands::cleanup_pods(&namespace, min_pending_minutes).await,
    }
}
