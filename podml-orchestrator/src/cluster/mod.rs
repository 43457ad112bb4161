//! Cluster Workload Client
//!
//! The orchestrator needs exactly two things from a compute backend: start a
//! containerized workload under a given name, and report that workload's
//! phase. Backends implement [`WorkloadClient`]; everything above this module
//! only sees the trait.

pub mod kubernetes;
#[cfg(test)]
pub mod memory;
pub mod podman;
pub mod retry;

use async_trait::async_trait;
use podml_core::domain::phase::Phase;
use podml_core::domain::resources::ResourceQuartet;
use std::collections::BTreeMap;
use thiserror::Error;

/// Everything a backend needs to start one training workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Workload name, also the idempotency key on the cluster side
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub resources: ResourceQuartet,
    /// Shared-volume mounts, present only in volume mode
    pub volume: Option<VolumePlan>,
}

/// Sub-paths of the shared storage volume to mount into the workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePlan {
    pub claim_name: String,
    /// Mounted read-only at the dataset mount path
    pub dataset_sub_path: String,
    /// Mounted read-write at the artifacts mount path
    pub artifacts_sub_path: String,
}

/// Errors reported by a cluster backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Network trouble, timeouts, throttling or server-side errors; worth retrying
    #[error("transient cluster error: {0}")]
    Transient(String),

    /// The backend refused the request
    #[error("cluster rejected request: {0}")]
    Rejected(String),

    /// No workload exists under the given name
    #[error("workload not found: {0}")]
    NotFound(String),
}

impl ClusterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClusterError::Transient(_))
    }
}

/// Compute backend able to run a container to completion
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Starts a workload and returns its handle
    ///
    /// Submitting a name that already exists succeeds with that name, so a
    /// belated retry after a partial failure is safe.
    async fn submit(&self, spec: &WorkloadSpec) -> Result<String, ClusterError>;

    /// Reports the current phase of the workload behind `handle`
    async fn get_phase(&self, handle: &str) -> Result<Phase, ClusterError>;
}
