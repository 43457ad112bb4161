//! Training Job Service
//!
//! Turns a stored configuration into a running cluster workload and keeps the
//! job record in step with what the cluster reports.
//!
//! `create` writes the `queued` record before touching the cluster, so a
//! failed submission leaves a record behind for the sweeper to resolve.
//! `refresh` pulls the workload phase on demand; status writes are guarded
//! in the repository, so concurrent refreshes converge on whichever terminal
//! write lands first.

use podml_core::contract::{
    ARTIFACTS_MOUNT_PATH, DATASET_MOUNT_PATH, DatasetSource, OutputDestination, TrainerInputs,
};
use podml_core::domain::configuration::Configuration;
use podml_core::domain::job::{DeliveryMode, JobStatus, TrainingJob, workload_name_for};
use podml_core::domain::phase::Phase;
use podml_core::domain::resources::ResourceQuartet;
use podml_core::dto::job::{CreateJob, DeliveryUrls, Page};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactLocator, Artifacts};
use crate::cluster::{ClusterError, VolumePlan, WorkloadClient, WorkloadSpec};
use crate::repository::job::NewJob;
use crate::repository::{configuration_repository, job_repository};
use crate::storage::{StorageRoot, validate_owner};

/// Attempts at drawing a job id whose workload name is not yet taken
const MAX_NAME_ATTEMPTS: usize = 5;

/// Failure of an orchestrator operation, by kind
///
/// Display strings are safe to show to callers; backend detail stays in the
/// error source.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("not found")]
    NotFound,

    #[error("failed to submit training job")]
    SubmissionFailure {
        /// Set when a `queued` record was persisted before the failure
        job_id: Option<Uuid>,
        #[source]
        source: BackendError,
    },

    #[error("failed to reconcile training job, try again")]
    ReconciliationFailure {
        #[source]
        source: BackendError,
    },

    #[error("storage error")]
    Storage(#[from] sqlx::Error),
}

/// Underlying backend failure
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("record store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("cluster: {0}")]
    Cluster(#[from] ClusterError),
}

fn reconciliation(source: impl Into<BackendError>) -> OrchestratorError {
    OrchestratorError::ReconciliationFailure {
        source: source.into(),
    }
}

fn submission(job_id: Option<Uuid>, source: impl Into<BackendError>) -> OrchestratorError {
    OrchestratorError::SubmissionFailure {
        job_id,
        source: source.into(),
    }
}

/// How a job receives its dataset and returns its artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
enum Delivery {
    Volume {
        claim_name: String,
        dataset_sub_path: String,
    },
    Url {
        dataset_url: String,
        model_url: String,
        metrics_url: String,
    },
}

impl Delivery {
    fn mode(&self) -> DeliveryMode {
        match self {
            Delivery::Volume { .. } => DeliveryMode::Volume,
            Delivery::Url { .. } => DeliveryMode::Url,
        }
    }
}

pub struct TrainingJobService {
    pool: SqlitePool,
    cluster: Arc<dyn WorkloadClient>,
    storage: StorageRoot,
    artifacts: ArtifactLocator,
    trainer_image: String,
    pvc_name: Option<String>,
    default_resources: ResourceQuartet,
}

impl TrainingJobService {
    pub fn new(
        pool: SqlitePool,
        cluster: Arc<dyn WorkloadClient>,
        storage: StorageRoot,
        artifacts: ArtifactLocator,
        trainer_image: String,
        pvc_name: Option<String>,
        default_resources: ResourceQuartet,
    ) -> Self {
        Self {
            pool,
            cluster,
            storage,
            artifacts,
            trainer_image,
            pvc_name,
            default_resources,
        }
    }

    /// Launches a training job from one of the owner's configurations
    ///
    /// Input problems are reported before anything is written. On success
    /// the returned job is `running`.
    pub async fn create(&self, owner: &str, req: CreateJob) -> Result<TrainingJob, OrchestratorError> {
        validate_owner(owner).map_err(OrchestratorError::InvalidInput)?;

        let configuration =
            configuration_repository::find_by_id(&self.pool, req.configuration_id, owner)
                .await
                .map_err(|e| submission(None, e))?
                .ok_or(OrchestratorError::NotFound)?;

        let resources = req.resources.resolve(&self.default_resources);
        resources
            .validate()
            .map_err(OrchestratorError::InvalidInput)?;

        let delivery = self.choose_delivery(&configuration, req.urls)?;

        let job = self
            .insert_queued(owner, configuration.id, resources, delivery.mode())
            .await?;

        let spec = self.workload_spec(&job, &configuration, &delivery);

        let handle = match self.cluster.submit(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Submitting workload {} for job {} failed: {}", spec.name, job.id, e);
                return Err(submission(Some(job.id), e));
            }
        };

        if handle != job.workload_name {
            warn!(
                "Backend reported handle {} for workload {}, keeping the stored name",
                handle, job.workload_name
            );
        }

        let started = job_repository::mark_running(&self.pool, job.id, owner)
            .await
            .map_err(|e| submission(Some(job.id), e))?;
        if !started {
            warn!(
                "Job {} was no longer queued after submitting {}, returning the stored status",
                job.id, job.workload_name
            );
        }

        info!(
            "Job {} submitted as {} ({} mode)",
            job.id,
            job.workload_name,
            job.delivery_mode.as_str()
        );

        job_repository::find_by_id(&self.pool, job.id, owner)
            .await
            .map_err(|e| submission(Some(job.id), e))?
            .ok_or(OrchestratorError::NotFound)
    }

    /// Returns the job, first reconciling it with the cluster unless it is
    /// already terminal
    pub async fn refresh(&self, owner: &str, id: Uuid) -> Result<TrainingJob, OrchestratorError> {
        let job = job_repository::find_by_id(&self.pool, id, owner)
            .await
            .map_err(reconciliation)?
            .ok_or(OrchestratorError::NotFound)?;

        if job.status.is_terminal() {
            debug!("Job {} is {}, skipping cluster query", job.id, job.status);
            return Ok(job);
        }

        let phase = self
            .cluster
            .get_phase(&job.workload_name)
            .await
            .map_err(reconciliation)?;

        self.apply_phase(&job, phase).await
    }

    /// Lists the owner's jobs, newest first
    pub async fn list(&self, owner: &str, page: Page) -> Result<Vec<TrainingJob>, OrchestratorError> {
        let jobs = job_repository::list_by_owner(&self.pool, owner, page.clamped()).await?;
        Ok(jobs)
    }

    /// Resolves jobs that have sat in `queued` for longer than `older_than`
    ///
    /// A job whose workload the cluster has never heard of is failed; one
    /// whose workload exists gets its phase applied. Jobs hitting any other
    /// error are left for the next sweep. Returns how many jobs changed.
    pub async fn sweep_stuck_queued(&self, older_than: Duration) -> Result<usize, OrchestratorError> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| OrchestratorError::InvalidInput(format!("Invalid queued timeout: {}", e)))?;
        let cutoff = chrono::Utc::now() - older_than;

        let stuck = job_repository::find_queued_before(&self.pool, cutoff).await?;
        if stuck.is_empty() {
            return Ok(0);
        }

        debug!("Found {} job(s) queued since before {}", stuck.len(), cutoff);

        let mut changed = 0;
        for job in stuck {
            match self.cluster.get_phase(&job.workload_name).await {
                Ok(phase) => match self.apply_phase(&job, phase).await {
                    Ok(updated) if updated.status != job.status => changed += 1,
                    Ok(_) => {}
                    Err(e) => warn!("Could not reconcile stuck job {}: {:?}", job.id, e),
                },
                Err(ClusterError::NotFound(_)) => {
                    if self.resolve_missing_workload(&job).await? {
                        changed += 1;
                    }
                }
                Err(e) => debug!("Skipping stuck job {} this sweep: {}", job.id, e),
            }
        }

        Ok(changed)
    }

    /// Settles a stuck job whose workload the cluster no longer knows
    ///
    /// A volume-mode job that left `metrics.json` behind ran to completion
    /// and its Job was already cleaned up, so it is marked succeeded with its
    /// artifacts. Anything else never reached the cluster and is marked failed.
    async fn resolve_missing_workload(&self, job: &TrainingJob) -> Result<bool, OrchestratorError> {
        let artifacts = match job.delivery_mode {
            DeliveryMode::Volume => self.artifacts.locate(&job.owner, job.id).await,
            DeliveryMode::Url => Artifacts::default(),
        };

        if artifacts.metrics.is_some() {
            let succeeded = job_repository::mark_terminal(
                &self.pool,
                job.id,
                &job.owner,
                JobStatus::Succeeded,
                artifacts.model_uri.as_deref(),
                artifacts.metrics.as_ref(),
            )
            .await?;
            if succeeded {
                info!(
                    "Workload {} is gone but job {} left its metrics, marked succeeded",
                    job.workload_name, job.id
                );
            }
            return Ok(succeeded);
        }

        let failed = job_repository::mark_terminal(
            &self.pool,
            job.id,
            &job.owner,
            JobStatus::Failed,
            None,
            None,
        )
        .await?;
        if failed {
            warn!(
                "Job {} never reached the cluster as {}, marked failed",
                job.id, job.workload_name
            );
        }
        Ok(failed)
    }

    /// Writes the status implied by `phase`, then re-reads the record
    ///
    /// A phase that maps below the stored status writes nothing.
    async fn apply_phase(
        &self,
        job: &TrainingJob,
        phase: Phase,
    ) -> Result<TrainingJob, OrchestratorError> {
        let observed = phase.status();

        let changed = match observed {
            _ if !job.status.can_transition_to(observed) => false,
            JobStatus::Succeeded | JobStatus::Failed => {
                let artifacts = match job.delivery_mode {
                    DeliveryMode::Volume => self.artifacts.locate(&job.owner, job.id).await,
                    DeliveryMode::Url => Artifacts::default(),
                };

                job_repository::mark_terminal(
                    &self.pool,
                    job.id,
                    &job.owner,
                    observed,
                    artifacts.model_uri.as_deref(),
                    artifacts.metrics.as_ref(),
                )
                .await
                .map_err(reconciliation)?
            }
            JobStatus::Running => job_repository::mark_running(&self.pool, job.id, &job.owner)
                .await
                .map_err(reconciliation)?,
            JobStatus::Queued => false,
        };

        if changed {
            info!("Job {} moved from {} to {}", job.id, job.status, observed);
        }

        job_repository::find_by_id(&self.pool, job.id, &job.owner)
            .await
            .map_err(reconciliation)?
            .ok_or(OrchestratorError::NotFound)
    }

    /// Picks volume mode for local datasets when a claim is configured,
    /// URL mode otherwise
    fn choose_delivery(
        &self,
        configuration: &Configuration,
        urls: DeliveryUrls,
    ) -> Result<Delivery, OrchestratorError> {
        if let (Some(path), Some(claim_name)) =
            (configuration.local_dataset_path(), self.pvc_name.as_ref())
        {
            let dataset_sub_path = self
                .storage
                .dataset_sub_path(path)
                .map_err(OrchestratorError::InvalidInput)?;

            return Ok(Delivery::Volume {
                claim_name: claim_name.clone(),
                dataset_sub_path,
            });
        }

        let (Some(dataset_url), Some(model_url), Some(metrics_url)) = (
            non_empty(urls.dataset_url),
            non_empty(urls.output_model_url),
            non_empty(urls.output_metrics_url),
        ) else {
            return Err(OrchestratorError::InvalidInput(
                "dataset_url, output_model_url and output_metrics_url are all required when the dataset is not on the shared volume".to_string(),
            ));
        };

        for url in [&dataset_url, &model_url, &metrics_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(OrchestratorError::InvalidInput(
                    "Delivery URLs must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(Delivery::Url {
            dataset_url,
            model_url,
            metrics_url,
        })
    }

    /// Inserts the `queued` record, drawing a new id if the workload name is
    /// already taken
    async fn insert_queued(
        &self,
        owner: &str,
        configuration_id: Uuid,
        resources: ResourceQuartet,
        delivery_mode: DeliveryMode,
    ) -> Result<TrainingJob, OrchestratorError> {
        let mut last_error = None;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let id = Uuid::new_v4();
            let new = NewJob {
                id,
                owner: owner.to_string(),
                configuration_id,
                workload_name: workload_name_for(id),
                resources: resources.clone(),
                delivery_mode,
            };

            match job_repository::insert(&self.pool, new).await {
                Ok(job) => return Ok(job),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    warn!("Workload name for job {} already taken, drawing a new id", id);
                    last_error = Some(sqlx::Error::Database(e));
                }
                Err(e) => return Err(submission(None, e)),
            }
        }

        Err(submission(
            None,
            last_error.unwrap_or(sqlx::Error::RowNotFound),
        ))
    }

    fn workload_spec(
        &self,
        job: &TrainingJob,
        configuration: &Configuration,
        delivery: &Delivery,
    ) -> WorkloadSpec {
        let (dataset, output, volume) = match delivery {
            Delivery::Volume {
                claim_name,
                dataset_sub_path,
            } => (
                DatasetSource::Path(DATASET_MOUNT_PATH.to_string()),
                OutputDestination::Directory(ARTIFACTS_MOUNT_PATH.to_string()),
                Some(VolumePlan {
                    claim_name: claim_name.clone(),
                    dataset_sub_path: dataset_sub_path.clone(),
                    artifacts_sub_path: self.storage.artifacts_sub_path(&job.owner, job.id),
                }),
            ),
            Delivery::Url {
                dataset_url,
                model_url,
                metrics_url,
            } => (
                DatasetSource::Url(dataset_url.clone()),
                OutputDestination::Urls {
                    model_url: model_url.clone(),
                    metrics_url: metrics_url.clone(),
                },
                None,
            ),
        };

        let inputs = TrainerInputs {
            x_column: configuration.x_column.clone(),
            y_column: configuration.y_column.clone(),
            fit_intercept: configuration.fit_intercept(),
            owner: job.owner.clone(),
            job_id: job.id.to_string(),
            dataset,
            output,
        };

        WorkloadSpec {
            name: job.workload_name.clone(),
            image: self.trainer_image.clone(),
            env: inputs.to_env(),
            resources: job.resources.clone(),
            volume,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
