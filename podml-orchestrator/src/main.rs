//! PodML Orchestrator
//!
//! Launches containerized training runs on a compute cluster and tracks them
//! in a durable job record.
//!
//! Architecture:
//! - Configuration: settings from environment variables with defaults
//! - Repositories: SQLite persistence for configurations and jobs
//! - Cluster: workload backends (Kubernetes or podman) behind one trait
//! - Services: job creation, reconciliation and the stuck-job sweeper
//! - API: axum handlers, owner taken from a trusted proxy header

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod artifacts;
pub mod cluster;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod storage;

use crate::artifacts::ArtifactLocator;
use crate::cluster::WorkloadClient;
use crate::cluster::kubernetes::KubernetesClient;
use crate::cluster::podman::PodmanClient;
use crate::cluster::retry::{RetryPolicy, RetryingClient};
use crate::config::{ClusterBackend, Settings};
use crate::service::{TrainingJobService, sweeper};
use crate::storage::StorageRoot;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podml_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PodML Orchestrator...");

    let settings = Settings::from_env().context("Failed to load settings")?;
    settings.validate().context("Invalid settings")?;

    info!(
        "Loaded settings: backend={:?}, namespace={}, image={}, pvc={:?}",
        settings.backend, settings.namespace, settings.trainer_image, settings.pvc_name
    );

    info!("Connecting to database...");

    let pool = db::create_pool(&settings.database_url)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    std::fs::create_dir_all(&settings.storage_root).with_context(|| {
        format!(
            "Failed to create storage root {}",
            settings.storage_root.display()
        )
    })?;
    let storage = StorageRoot::new(&settings.storage_root)
        .context("Failed to resolve storage root")?;

    info!("Storage root: {}", storage.path().display());

    let cluster = build_cluster_client(&settings, &storage).await?;

    let jobs = Arc::new(TrainingJobService::new(
        pool.clone(),
        cluster,
        storage.clone(),
        ArtifactLocator::new(storage, settings.artifact_read_timeout),
        settings.trainer_image.clone(),
        settings.pvc_name.clone(),
        settings.default_resources.clone(),
    ));

    let _sweeper = sweeper::spawn(
        Arc::clone(&jobs),
        settings.sweep_interval,
        settings.queued_timeout,
    );

    // Build router with all API endpoints
    let app = api::create_router(api::AppState { pool, jobs });

    info!("Listening on {}", settings.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

/// Creates the configured backend, wrapped with retries on transient errors
async fn build_cluster_client(
    settings: &Settings,
    storage: &StorageRoot,
) -> Result<Arc<dyn WorkloadClient>> {
    let backend: Arc<dyn WorkloadClient> = match settings.backend {
        ClusterBackend::Kubernetes => {
            let client = KubernetesClient::from_settings(settings)
                .context("Failed to initialize Kubernetes client")?;
            info!("Using Kubernetes backend at {}", settings.k8s_api_url);
            Arc::new(client)
        }
        ClusterBackend::Podman => {
            let client = PodmanClient::new(storage.path().to_path_buf(), settings.cluster_timeout);
            client
                .check_available()
                .await
                .context("Podman backend selected but podman is unavailable")?;
            Arc::new(client)
        }
    };

    Ok(Arc::new(RetryingClient::new(
        backend,
        RetryPolicy::with_max_attempts(settings.cluster_max_retries),
    )))
}
