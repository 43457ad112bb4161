//! Training job domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::contract::MetricsReport;
use crate::domain::resources::ResourceQuartet;

/// Training job record
///
/// Created by the orchestrator in `Queued`, mutated only through status
/// transitions afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub id: Uuid,
    pub owner: String,
    pub configuration_id: Uuid,
    pub status: JobStatus,
    /// Cluster-side workload name, assigned once at insert time
    pub workload_name: String,
    pub resources: ResourceQuartet,
    pub delivery_mode: DeliveryMode,
    pub model_uri: Option<String>,
    pub metrics: Option<MetricsReport>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Training job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects
    /// `queued -> running -> {succeeded | failed}`.
    ///
    /// Skipping `running` is allowed: a short workload can finish between
    /// two polls.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Queued | JobStatus::Running, s) if s.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// How the dataset reaches the workload and how artifacts leave it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Dataset and artifacts live under the shared storage root
    Volume,
    /// Dataset fetched and artifacts uploaded through presigned URLs
    Url,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Volume => "volume",
            DeliveryMode::Url => "url",
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volume" => Ok(DeliveryMode::Volume),
            "url" => Ok(DeliveryMode::Url),
            other => Err(format!("unknown delivery mode: {}", other)),
        }
    }
}

/// Workload name for a job: `train-` followed by the first 8 hex digits of the id
pub fn workload_name_for(job_id: Uuid) -> String {
    let simple = job_id.simple().to_string();
    format!("train-{}", &simple[..8])
}
