use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create configurations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configurations (
            id BLOB PRIMARY KEY,
            owner_sub TEXT NOT NULL,
            name TEXT NOT NULL,
            dataset_uri TEXT NOT NULL,
            x_column TEXT NOT NULL,
            y_column TEXT NOT NULL,
            model_type TEXT NOT NULL DEFAULT 'linear_regression',
            hyperparams TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create training jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_jobs (
            id BLOB PRIMARY KEY,
            owner_sub TEXT NOT NULL,
            configuration_id BLOB NOT NULL REFERENCES configurations(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'queued',
            workload_name TEXT NOT NULL UNIQUE,
            resources TEXT NOT NULL,
            delivery_mode TEXT NOT NULL,
            model_uri TEXT,
            metrics TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for owner-scoped listing and the stuck-job sweep
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_configurations_owner ON configurations(owner_sub, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_jobs_owner ON training_jobs(owner_sub, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_jobs_cfg ON training_jobs(configuration_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_jobs_status ON training_jobs(status, created_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Fresh migrated database in a temporary directory
#[cfg(test)]
pub async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", temp_dir.path().join("podml.db").display());

    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    (pool, temp_dir)
}
