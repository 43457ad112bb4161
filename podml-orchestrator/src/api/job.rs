//! Training Job API Handlers
//!
//! HTTP endpoints for launching and tracking training jobs.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use podml_core::domain::job::TrainingJob;
use podml_core::dto::job::{CreateJob, Page};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::owner::Owner;

/// POST /jobs
/// Launch a training job from a configuration
pub async fn create_job(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<TrainingJob>)> {
    tracing::info!(
        "Launching job for configuration {} ({})",
        req.configuration_id,
        owner
    );

    let job = state.jobs.create(&owner, req).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<TrainingJob>>> {
    tracing::debug!("Listing jobs for {}", owner);

    let jobs = state.jobs.list(&owner, page).await?;
    Ok(Json(jobs))
}

/// GET /jobs/{id}
/// Get a job, reconciling its status with the cluster first
pub async fn get_job(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TrainingJob>> {
    tracing::debug!("Refreshing job: {}", id);

    let job = state.jobs.refresh(&owner, id).await?;
    Ok(Json(job))
}
