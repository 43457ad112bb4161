//! Orchestrator configuration
//!
//! Every setting comes from the environment with a development default.

use podml_core::domain::resources::ResourceQuartet;

use crate::cluster::kubernetes::TTL_SECONDS_AFTER_FINISHED;
use std::path::PathBuf;
use std::time::Duration;

/// Which compute backend runs training workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterBackend {
    Kubernetes,
    Podman,
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite connection string (e.g., "sqlite://podml.db")
    pub database_url: String,

    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// Shared storage root; volume-mode datasets must live under it
    pub storage_root: PathBuf,

    /// Persistent volume claim backing `storage_root` inside the cluster.
    /// Volume mode is only available when this is set.
    pub pvc_name: Option<String>,

    pub namespace: String,
    pub trainer_image: String,
    pub backend: ClusterBackend,

    /// Kubernetes API server base URL
    pub k8s_api_url: String,
    pub k8s_token_path: PathBuf,
    pub k8s_ca_path: PathBuf,

    /// Upper bound on a single cluster API call
    pub cluster_timeout: Duration,

    /// Attempts for a cluster call failing with a transient error
    pub cluster_max_retries: u32,

    /// Upper bound on reading one artifact file
    pub artifact_read_timeout: Duration,

    /// How often the stuck-job sweeper runs
    pub sweep_interval: Duration,

    /// Age after which a `queued` job is considered stuck. With the
    /// Kubernetes backend, this plus one sweep interval must stay within half
    /// of the finished-Job TTL, so a sweep still finds the Job.
    pub queued_timeout: Duration,

    /// Resources used when a create request leaves a field unset
    pub default_resources: ResourceQuartet,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://podml.db".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            storage_root: PathBuf::from("./storage"),
            pvc_name: None,
            namespace: "default".to_string(),
            trainer_image: "podml-trainer:latest".to_string(),
            backend: ClusterBackend::Kubernetes,
            k8s_api_url: "https://kubernetes.default.svc".to_string(),
            k8s_token_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"),
            k8s_ca_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt"),
            cluster_timeout: Duration::from_secs(10),
            cluster_max_retries: 3,
            artifact_read_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            queued_timeout: Duration::from_secs(120),
            default_resources: ResourceQuartet::default(),
        }
    }
}

impl Settings {
    /// Creates settings from environment variables
    ///
    /// Recognised variables:
    /// - DATABASE_URL, BIND_ADDR, STORAGE_ROOT
    /// - K8S_PVC_NAME, K8S_NAMESPACE, K8S_API_URL, K8S_TOKEN_PATH, K8S_CA_PATH
    /// - TRAINER_IMAGE, CLUSTER_BACKEND (kubernetes | podman)
    /// - CLUSTER_TIMEOUT_SECS, CLUSTER_MAX_RETRIES, ARTIFACT_READ_TIMEOUT_SECS
    /// - SWEEP_INTERVAL_SECS, QUEUED_TIMEOUT_SECS
    /// - DEFAULT_CPU_REQUEST, DEFAULT_MEM_REQUEST, DEFAULT_CPU_LIMIT, DEFAULT_MEM_LIMIT
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let backend = match std::env::var("CLUSTER_BACKEND") {
            Ok(value) => parse_backend(&value)?,
            Err(_) => defaults.backend,
        };

        let default_resources = ResourceQuartet {
            cpu_request: env_or("DEFAULT_CPU_REQUEST", defaults.default_resources.cpu_request),
            mem_request: env_or("DEFAULT_MEM_REQUEST", defaults.default_resources.mem_request),
            cpu_limit: env_or("DEFAULT_CPU_LIMIT", defaults.default_resources.cpu_limit),
            mem_limit: env_or("DEFAULT_MEM_LIMIT", defaults.default_resources.mem_limit),
        };

        Ok(Self {
            database_url: env_or("DATABASE_URL", defaults.database_url),
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            storage_root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            pvc_name: std::env::var("K8S_PVC_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            namespace: env_or("K8S_NAMESPACE", defaults.namespace),
            trainer_image: env_or("TRAINER_IMAGE", defaults.trainer_image),
            backend,
            k8s_api_url: env_or("K8S_API_URL", defaults.k8s_api_url),
            k8s_token_path: std::env::var("K8S_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.k8s_token_path),
            k8s_ca_path: std::env::var("K8S_CA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.k8s_ca_path),
            cluster_timeout: env_secs("CLUSTER_TIMEOUT_SECS", defaults.cluster_timeout),
            cluster_max_retries: std::env::var("CLUSTER_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(defaults.cluster_max_retries),
            artifact_read_timeout: env_secs(
                "ARTIFACT_READ_TIMEOUT_SECS",
                defaults.artifact_read_timeout,
            ),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            queued_timeout: env_secs("QUEUED_TIMEOUT_SECS", defaults.queued_timeout),
            default_resources,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.trainer_image.trim().is_empty() {
            anyhow::bail!("trainer_image cannot be empty");
        }

        if self.namespace.trim().is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if !self.k8s_api_url.starts_with("http://") && !self.k8s_api_url.starts_with("https://")
        {
            anyhow::bail!("k8s_api_url must start with http:// or https://");
        }

        if self.cluster_timeout.is_zero() {
            anyhow::bail!("cluster_timeout must be greater than 0");
        }

        if self.cluster_max_retries == 0 {
            anyhow::bail!("cluster_max_retries must be at least 1");
        }

        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        let sweep_deadline = self.queued_timeout + self.sweep_interval;
        let ttl_margin = Duration::from_secs(TTL_SECONDS_AFTER_FINISHED / 2);
        if self.backend == ClusterBackend::Kubernetes && sweep_deadline > ttl_margin {
            anyhow::bail!(
                "queued_timeout + sweep_interval ({}s) must not exceed {}s, half the finished Job TTL",
                sweep_deadline.as_secs(),
                ttl_margin.as_secs()
            );
        }

        self.default_resources
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid default resources: {}", e))?;

        Ok(())
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn parse_backend(value: &str) -> anyhow::Result<ClusterBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "kubernetes" | "k8s" => Ok(ClusterBackend::Kubernetes),
        "podman" => Ok(ClusterBackend::Podman),
        other => anyhow::bail!("unknown CLUSTER_BACKEND: {}", other),
    }
}
