//! Podman backend
//!
//! Runs training workloads as detached local containers, for development
//! without a cluster. Volume-mode sub-paths are bind-mounted from the host
//! storage root.

use async_trait::async_trait;
use podml_core::contract::{ARTIFACTS_MOUNT_PATH, DATASET_MOUNT_PATH, TrainerExit};
use podml_core::domain::phase::Phase;
use podml_core::domain::resources::ResourceQuartet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ClusterError, WorkloadClient, WorkloadSpec};

pub struct PodmanClient {
    storage_root: PathBuf,
    timeout: Duration,
}

impl PodmanClient {
    /// Creates a podman backend
    ///
    /// # Arguments
    /// * `storage_root` - Host directory standing in for the shared volume
    /// * `timeout` - Upper bound on each podman invocation
    pub fn new(storage_root: PathBuf, timeout: Duration) -> Self {
        Self {
            storage_root,
            timeout,
        }
    }

    /// Checks podman is installed and answering
    pub async fn check_available(&self) -> Result<(), ClusterError> {
        let output = self.podman(&["--version".to_string()]).await?;
        if !output.success {
            return Err(ClusterError::Rejected(
                "podman is not working correctly".to_string(),
            ));
        }
        info!("Podman is available: {}", output.stdout.trim());
        Ok(())
    }

    /// Arguments for `podman run` starting the workload detached
    fn run_args(&self, spec: &WorkloadSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--label".to_string(),
            "app=podml".to_string(),
        ];

        args.extend(resource_args(&spec.resources));

        for (name, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", name, value));
        }

        if let Some(volume) = &spec.volume {
            let dataset = self.storage_root.join(&volume.dataset_sub_path);
            let artifacts = self.storage_root.join(&volume.artifacts_sub_path);
            args.push("-v".to_string());
            args.push(format!("{}:{}:ro", dataset.display(), DATASET_MOUNT_PATH));
            args.push("-v".to_string());
            args.push(format!("{}:{}", artifacts.display(), ARTIFACTS_MOUNT_PATH));
        }

        args.push(spec.image.clone());
        args
    }

    async fn podman(&self, args: &[String]) -> Result<PodmanOutput, ClusterError> {
        let run = Command::new("podman").args(args).kill_on_drop(true).output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ClusterError::Transient(format!("podman timed out after {:?}", self.timeout)))?
            .map_err(|e| ClusterError::Transient(format!("failed to execute podman: {}", e)))?;

        let result = PodmanOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.stderr.trim().is_empty() {
            debug!("podman stderr: {}", result.stderr.trim());
        }

        Ok(result)
    }
}

struct PodmanOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

#[async_trait]
impl WorkloadClient for PodmanClient {
    async fn submit(&self, spec: &WorkloadSpec) -> Result<String, ClusterError> {
        if let Some(volume) = &spec.volume {
            let artifacts = self.storage_root.join(&volume.artifacts_sub_path);
            tokio::fs::create_dir_all(&artifacts).await.map_err(|e| {
                ClusterError::Rejected(format!("failed to create artifacts directory: {}", e))
            })?;
        }

        let output = self.podman(&self.run_args(spec)).await?;

        if output.success {
            info!(
                "Container {} started with ID: {}",
                spec.name,
                output.stdout.trim()
            );
            return Ok(spec.name.clone());
        }

        if output.stderr.contains("already in use") {
            info!("Container {} already exists, treating submit as done", spec.name);
            return Ok(spec.name.clone());
        }

        Err(ClusterError::Rejected(format!(
            "podman run failed for {}: {}",
            spec.name,
            output.stderr.trim()
        )))
    }

    async fn get_phase(&self, handle: &str) -> Result<Phase, ClusterError> {
        let args = [
            "inspect".to_string(),
            "--type".to_string(),
            "container".to_string(),
            "--format".to_string(),
            "{{.State.Status}} {{.State.ExitCode}}".to_string(),
            handle.to_string(),
        ];
        let output = self.podman(&args).await?;

        if !output.success {
            let stderr = output.stderr.to_lowercase();
            if stderr.contains("no such") || stderr.contains("not found") {
                return Err(ClusterError::NotFound(handle.to_string()));
            }
            return Err(ClusterError::Transient(format!(
                "podman inspect failed for {}",
                handle
            )));
        }

        let phase = phase_from_inspect(output.stdout.trim())?;
        debug!("Container {} phase: {:?}", handle, phase);
        Ok(phase)
    }
}

/// Parses `"<state> <exit code>"` as printed by `podman inspect`
fn phase_from_inspect(state: &str) -> Result<Phase, ClusterError> {
    let mut parts = state.split_whitespace();
    let status = parts.next().unwrap_or_default();
    let exit_code = parts.next().and_then(|c| c.parse::<i32>().ok()).unwrap_or(0);

    let phase = match status {
        "created" | "configured" | "initialized" => Phase::default(),
        "running" | "paused" | "stopping" => Phase {
            active_count: 1,
            ..Default::default()
        },
        "exited" | "stopped" if exit_code == 0 => Phase {
            succeeded_count: 1,
            ..Default::default()
        },
        "exited" | "stopped" | "dead" | "removing" => {
            let meaning = TrainerExit::from_code(exit_code)
                .map(TrainerExit::describe)
                .unwrap_or("unexpected exit");
            warn!("Trainer exited with code {} ({})", exit_code, meaning);
            Phase {
                has_failure_condition: true,
                ..Default::default()
            }
        }
        other => {
            return Err(ClusterError::Transient(format!(
                "unrecognised container state: {:?}",
                other
            )));
        }
    };

    Ok(phase)
}

/// Maps Kubernetes-style quantities onto podman resource flags
///
/// Quantities podman cannot express are left out rather than guessed.
fn resource_args(resources: &ResourceQuartet) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(cpus) = cpu_cores(&resources.cpu_limit) {
        args.push(format!("--cpus={}", cpus));
    }
    if let Some(memory) = memory_flag(&resources.mem_limit) {
        args.push(format!("--memory={}", memory));
    }
    if let Some(memory) = memory_flag(&resources.mem_request) {
        args.push(format!("--memory-reservation={}", memory));
    }

    args
}

fn cpu_cores(quantity: &str) -> Option<String> {
    match quantity.strip_suffix('m') {
        Some(millis) => {
            let millis = millis.parse::<f64>().ok()?;
            Some(format!("{}", millis / 1000.0))
        }
        None => {
            quantity.parse::<f64>().ok()?;
            Some(quantity.to_string())
        }
    }
}

fn memory_flag(quantity: &str) -> Option<String> {
    const UNITS: &[(&str, &str)] = &[
        ("Ki", "k"),
        ("Mi", "m"),
        ("Gi", "g"),
        ("k", "k"),
        ("M", "m"),
        ("G", "g"),
    ];

    for (suffix, unit) in UNITS {
        if let Some(amount) = quantity.strip_suffix(suffix) {
            let amount = amount.parse::<u64>().ok()?;
            return Some(format!("{}{}", amount, unit));
        }
    }

    quantity.parse::<u64>().ok().map(|bytes| format!("{}b", bytes))
}
