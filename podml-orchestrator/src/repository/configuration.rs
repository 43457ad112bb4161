//! Configuration Repository
//!
//! Handles all database operations related to configurations. Every lookup is
//! scoped by owner.

use podml_core::domain::configuration::{Configuration, DEFAULT_MODEL_TYPE};
use podml_core::dto::configuration::CreateConfiguration;
use podml_core::dto::job::Page;
use sqlx::SqlitePool;
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

/// Create a new configuration in the database
pub async fn create(
    pool: &SqlitePool,
    owner: &str,
    req: CreateConfiguration,
) -> Result<Configuration, sqlx::Error> {
    let configuration = Configuration {
        id: Uuid::new_v4(),
        owner: owner.to_string(),
        name: req.name,
        dataset_uri: req.dataset_uri,
        x_column: req.x_column,
        y_column: req.y_column,
        model_type: req
            .model_type
            .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_string()),
        hyperparams: req.hyperparams,
        created_at: chrono::Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO configurations
            (id, owner_sub, name, dataset_uri, x_column, y_column, model_type, hyperparams, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(configuration.id)
    .bind(&configuration.owner)
    .bind(&configuration.name)
    .bind(&configuration.dataset_uri)
    .bind(&configuration.x_column)
    .bind(&configuration.y_column)
    .bind(&configuration.model_type)
    .bind(configuration.hyperparams.clone().map(Json))
    .bind(configuration.created_at)
    .execute(pool)
    .await?;

    Ok(configuration)
}

/// Find a configuration by ID, visible only to its owner
pub async fn find_by_id(
    pool: &SqlitePool,
    id: Uuid,
    owner: &str,
) -> Result<Option<Configuration>, sqlx::Error> {
    let row = sqlx::query_as::<_, ConfigurationRow>(
        r#"
        SELECT id, owner_sub, name, dataset_uri, x_column, y_column, model_type,
               hyperparams, created_at
        FROM configurations
        WHERE id = ? AND owner_sub = ?
        "#,
    )
    .bind(id)
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List an owner's configurations, newest first
pub async fn list_by_owner(
    pool: &SqlitePool,
    owner: &str,
    page: Page,
) -> Result<Vec<Configuration>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ConfigurationRow>(
        r#"
        SELECT id, owner_sub, name, dataset_uri, x_column, y_column, model_type,
               hyperparams, created_at
        FROM configurations
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

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ConfigurationRow {
    id: Uuid,
    owner_sub: String,
    name: String,
    dataset_uri: String,
    x_column: String,
    y_column: String,
    model_type: String,
    hyperparams: Option<Json<HashMap<String, serde_json::Value>>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ConfigurationRow> for Configuration {
    fn from(row: ConfigurationRow) -> Self {
        Configuration {
            id: row.id,
            owner: row.owner_sub,
            name: row.name,
            dataset_uri: row.dataset_uri,
            x_column: row.x_column,
            y_column: row.y_column,
            model_type: row.model_type,
            hyperparams: row.hyperparams.map(|Json(hp)| hp),
            created_at: row.created_at,
        }
    }
}
