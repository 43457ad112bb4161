//! Training Job Repository
//!
//! Handles all database operations related to training jobs.
//!
//! Status changes are single guarded `UPDATE` statements: a record only moves
//! forward along `queued -> running -> terminal`, and a terminal record is
//! never written again.

use podml_core::contract::MetricsReport;
use podml_core::domain::job::{DeliveryMode, JobStatus, TrainingJob};
use podml_core::domain::resources::ResourceQuartet;
use podml_core::dto::job::Page;
use sqlx::SqlitePool;
use sqlx::types::Json;
use uuid::Uuid;

/// Fields fixed at insert time
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: Uuid,
    pub owner: String,
    pub configuration_id: Uuid,
    pub workload_name: String,
    pub resources: ResourceQuartet,
    pub delivery_mode: DeliveryMode,
}

/// Insert a new job in `queued`
pub async fn insert(pool: &SqlitePool, new: NewJob) -> Result<TrainingJob, sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO training_jobs
            (id, owner_sub, configuration_id, status, workload_name, resources,
             delivery_mode, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.id)
    .bind(&new.owner)
    .bind(new.configuration_id)
    .bind(JobStatus::Queued.as_str())
    .bind(&new.workload_name)
    .bind(Json(&new.resources))
    .bind(new.delivery_mode.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(TrainingJob {
        id: new.id,
        owner: new.owner,
        configuration_id: new.configuration_id,
        status: JobStatus::Queued,
        workload_name: new.workload_name,
        resources: new.resources,
        delivery_mode: new.delivery_mode,
        model_uri: None,
        metrics: None,
        created_at: now,
        updated_at: now,
    })
}

/// Find a job by ID, visible only to its owner
pub async fn find_by_id(
    pool: &SqlitePool,
    id: Uuid,
    owner: &str,
) -> Result<Option<TrainingJob>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, owner_sub, configuration_id, status, workload_name, resources,
               delivery_mode, model_uri, metrics, created_at, updated_at
        FROM training_jobs
        WHERE id = ? AND owner_sub = ?
        "#,
    )
    .bind(id)
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List an owner's jobs, newest first
pub async fn list_by_owner(
    pool: &SqlitePool,
    owner: &str,
    page: Page,
) -> Result<Vec<TrainingJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, owner_sub, configuration_id, status, workload_name, resources,
               delivery_mode, model_uri, metrics, created_at, updated_at
        FROM training_jobs
        WHERE owner_sub = ?
        ORDER BY created_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(owner)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Count an owner's jobs
pub async fn count_by_owner(pool: &SqlitePool, owner: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM training_jobs WHERE owner_sub = ?")
        .bind(owner)
        .fetch_one(pool)
        .await
}

/// Queued jobs created before `cutoff`, across all owners, oldest first
///
/// Timestamps are stored as UTC RFC 3339 text, so the cutoff compares as
/// text and the `(status, created_at)` index serves the query.
pub async fn find_queued_before(
    pool: &SqlitePool,
    cutoff: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<TrainingJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, owner_sub, configuration_id, status, workload_name, resources,
               delivery_mode, model_uri, metrics, created_at, updated_at
        FROM training_jobs
        WHERE status = ? AND created_at < ?
        ORDER BY created_at ASC
        "#,
    )
    .bind(JobStatus::Queued.as_str())
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(TrainingJob::from).collect())
}

/// Move a `queued` job to `running`
///
/// Returns false when the job was no longer `queued`.
pub async fn mark_running(pool: &SqlitePool, id: Uuid, owner: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE training_jobs
        SET status = ?, updated_at = ?
        WHERE id = ? AND owner_sub = ? AND status = ?
        "#,
    )
    .bind(JobStatus::Running.as_str())
    .bind(chrono::Utc::now())
    .bind(id)
    .bind(owner)
    .bind(JobStatus::Queued.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a non-terminal job to a terminal status, recording its artifacts
///
/// Status and artifact columns change in one statement. Returns false when
/// the job was already terminal, in which case nothing is written.
pub async fn mark_terminal(
    pool: &SqlitePool,
    id: Uuid,
    owner: &str,
    status: JobStatus,
    model_uri: Option<&str>,
    metrics: Option<&MetricsReport>,
) -> Result<bool, sqlx::Error> {
    debug_assert!(status.is_terminal());

    let result = sqlx::query(
        r#"
        UPDATE training_jobs
        SET status = ?,
            model_uri = COALESCE(?, model_uri),
            metrics = COALESCE(?, metrics),
            updated_at = ?
        WHERE id = ? AND owner_sub = ? AND status IN (?, ?)
        "#,
    )
    .bind(status.as_str())
    .bind(model_uri)
    .bind(metrics.map(Json))
    .bind(chrono::Utc::now())
    .bind(id)
    .bind(owner)
    .bind(JobStatus::Queued.as_str())
    .bind(JobStatus::Running.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    owner_sub: String,
    configuration_id: Uuid,
    status: String,
    workload_name: String,
    resources: Json<ResourceQuartet>,
    delivery_mode: String,
    model_uri: Option<String>,
    metrics: Option<Json<MetricsReport>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<JobRow> for TrainingJob {
    fn from(row: JobRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!("Job {}: {}, treating as queued", row.id, e);
            JobStatus::Queued
        });

        let delivery_mode = row.delivery_mode.parse().unwrap_or_else(|e| {
            tracing::warn!("Job {}: {}, treating as url mode", row.id, e);
            DeliveryMode::Url
        });

        TrainingJob {
            id: row.id,
            owner: row.owner_sub,
            configuration_id: row.configuration_id,
            status,
            workload_name: row.workload_name,
            resources: row.resources.0,
            delivery_mode,
            model_uri: row.model_uri,
            metrics: row.metrics.map(|Json(m)| m),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
