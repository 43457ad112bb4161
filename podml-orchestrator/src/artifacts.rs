//! Artifact Locator
//!
//! Finds what a finished volume-mode job left in its artifacts directory.
//! Missing or unreadable files are not errors: the job simply completes
//! without them.

use podml_core::contract::{METRICS_FILE_NAME, MODEL_FILE_NAME, MetricsReport};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::StorageRoot;

/// Artifacts found for one job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifacts {
    pub model_uri: Option<String>,
    pub metrics: Option<MetricsReport>,
}

#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    storage: StorageRoot,
    read_timeout: Duration,
}

impl ArtifactLocator {
    pub fn new(storage: StorageRoot, read_timeout: Duration) -> Self {
        Self {
            storage,
            read_timeout,
        }
    }

    /// Looks up `model.pkl` and `metrics.json` for a job
    pub async fn locate(&self, owner: &str, job_id: Uuid) -> Artifacts {
        let dir = self.storage.artifacts_dir(owner, job_id);

        let metrics = self.read_metrics(&dir.join(METRICS_FILE_NAME)).await;

        let model_path = dir.join(MODEL_FILE_NAME);
        let model_uri = match tokio::fs::try_exists(&model_path).await {
            Ok(true) => Some(format!("file://{}", model_path.display())),
            Ok(false) => None,
            Err(e) => {
                warn!("Could not check {}: {}", model_path.display(), e);
                None
            }
        };

        debug!(
            "Job {} artifacts: model={}, metrics={}",
            job_id,
            model_uri.is_some(),
            metrics.is_some()
        );

        Artifacts { model_uri, metrics }
    }

    async fn read_metrics(&self, path: &Path) -> Option<MetricsReport> {
        let bytes = match tokio::time::timeout(self.read_timeout, tokio::fs::read(path)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Ok(Err(e)) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
            Err(_) => {
                warn!(
                    "Timed out after {:?} reading {}",
                    self.read_timeout,
                    path.display()
                );
                return None;
            }
        };

        match MetricsReport::parse(&bytes) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Ignoring malformed metrics in {}: {}", path.display(), e);
                None
            }
        }
    }
}
