//! Kubernetes pod sweeper and worker manifest generator for podwarden.
//!
//! This crate provides two independent entry points that share the
//! Kubernetes object model:
//!
//! - [`PodSweeper`] lists executor worker pods page by page and deletes the
//!   ones that succeeded, failed for good, were evicted, or have been stuck
//!   pending too long
//! - [`ManifestGenerationJob`] renders the worker pod of every task of a DAG
//!   and writes one YAML manifest per task
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │        PodSweeper        │      │  ManifestGenerationJob   │
//! │  classify ─► delete      │      │  descriptor ─► render    │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │                                 │
//!              ▼                                 ▼
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │   PodClient (trait)      │      │ ManifestRenderer (trait) │
//! │   KubePodClient          │      │ WorkerPodRenderer        │
//! └────────────┬─────────────┘      └──────────────────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │  Kubernetes API Server   │
//! └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use podwarden_kube::{KubePodClient, PodSweeper, SweepConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SweepConfig::default();
//! let client = KubePodClient::new(&config).await?;
//! let sweeper = PodSweeper::new(Arc::new(client), config);
//!
//! let report = sweeper.sweep("airflow", 5).await?;
//! println!("deleted {} of {} pods", report.deleted, report.inspected);
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to use [`MockPodClient`], which serves
//! scripted pages and records every list and delete call.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod k8s;
pub mod manifest;
pub mod pod;
pub mod sweep;
pub mod types;

pub use config::{RetryConfig, SweepConfig, WorkerConfig};
pub use error::{KubeError, Result};
pub use k8s::{KubePodClient, PodClient};
pub use manifest::ManifestGenerationJob;
pub use pod::{ManifestRenderer, WorkerPodRenderer};
pub use sweep::{
    classify, should_delete, DeletionDecision, MinPendingMinutes, PodOutcome, PodSweeper,
    SweepAction, SweepReport,
};
pub use types::{PodObservation, PodPage, PodPhase, PodReason, RestartPolicy};

#[cfg(any(test, feature = "test-utils"))]
pub use k8s::mock::MockPodClient;
