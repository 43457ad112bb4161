//! Configuration Service
//!
//! Business logic for configuration management.

use podml_core::domain::configuration::Configuration;
use podml_core::dto::configuration::CreateConfiguration;
use podml_core::dto::job::Page;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repository::configuration_repository;
use crate::storage::validate_owner;

const MAX_NAME_LEN: usize = 200;

/// Service error type
#[derive(Debug)]
pub enum ConfigurationError {
    NotFound(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for ConfigurationError {
    fn from(err: sqlx::Error) -> Self {
        ConfigurationError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Create a new configuration
pub async fn create_configuration(
    pool: &SqlitePool,
    owner: &str,
    req: CreateConfiguration,
) -> Result<Configuration> {
    validate_owner(owner).map_err(ConfigurationError::ValidationError)?;
    let req = validate_configuration_request(req)?;

    let configuration = configuration_repository::create(pool, owner, req).await?;

    tracing::info!(
        "Configuration created: {} ({}) for {}",
        configuration.name,
        configuration.id,
        owner
    );

    Ok(configuration)
}

/// Get one of the owner's configurations
pub async fn get_configuration(pool: &SqlitePool, id: Uuid, owner: &str) -> Result<Configuration> {
    configuration_repository::find_by_id(pool, id, owner)
        .await?
        .ok_or(ConfigurationError::NotFound(id))
}

/// List the owner's configurations
pub async fn list_configurations(
    pool: &SqlitePool,
    owner: &str,
    page: Page,
) -> Result<Vec<Configuration>> {
    let configurations =
        configuration_repository::list_by_owner(pool, owner, page.clamped()).await?;
    Ok(configurations)
}

// =============================================================================
// Validation
// =============================================================================

/// Trims the text fields and rejects empty or oversized ones
fn validate_configuration_request(req: CreateConfiguration) -> Result<CreateConfiguration> {
    let name = req.name.trim().to_string();
    let dataset_uri = req.dataset_uri.trim().to_string();
    let x_column = req.x_column.trim().to_string();
    let y_column = req.y_column.trim().to_string();

    for (field, value) in [
        ("name", &name),
        ("dataset_uri", &dataset_uri),
        ("x_column", &x_column),
        ("y_column", &y_column),
    ] {
        if value.is_empty() {
            return Err(ConfigurationError::ValidationError(format!(
                "Configuration {} cannot be empty",
                field
            )));
        }
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ConfigurationError::ValidationError(format!(
            "Configuration name is too long (max {} characters)",
            MAX_NAME_LEN
        )));
    }

    let model_type = match req.model_type.map(|m| m.trim().to_string()) {
        Some(m) if m.is_empty() => None,
        other => other,
    };

    Ok(CreateConfiguration {
        name,
        dataset_uri,
        x_column,
        y_column,
        model_type,
        hyperparams: req.hyperparams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use podml_core::domain::configuration::DEFAULT_MODEL_TYPE;

    fn request(name: &str) -> CreateConfiguration {
        CreateConfiguration {
            name: name.to_string(),
            dataset_uri: " file:///srv/podml/uploads/alice/a.csv ".to_string(),
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            model_type: Some("  ".to_string()),
            hyperparams: None,
        }
    }

    #[test]
    fn test_validate_empty_name() {
        let result = validate_configuration_request(request("   "));
        assert!(matches!(result, Err(ConfigurationError::ValidationError(_))));
    }

    #[test]
    fn test_validate_long_name() {
        let result = validate_configuration_request(request(&"n".repeat(201)));
        assert!(matches!(result, Err(ConfigurationError::ValidationError(_))));
    }

    #[test]
    fn test_validate_trims_fields() {
        let req = validate_configuration_request(request(" prices ")).unwrap();
        assert_eq!(req.name, "prices");
        assert_eq!(req.dataset_uri, "file:///srv/podml/uploads/alice/a.csv");
        assert!(req.model_type.is_none());
    }

    #[tokio::test]
    async fn test_create_get_and_list() {
        let (pool, _temp) = db::test_pool().await;

        let created = create_configuration(&pool, "alice", request("prices"))
            .await
            .unwrap();
        assert_eq!(created.model_type, DEFAULT_MODEL_TYPE);

        let fetched = get_configuration(&pool, created.id, "alice").await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.dataset_uri, "file:///srv/podml/uploads/alice/a.csv");

        assert!(matches!(
            get_configuration(&pool, created.id, "bob").await,
            Err(ConfigurationError::NotFound(_))
        ));

        let listed = list_configurations(&pool, "alice", Page::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_unsafe_owner() {
        let (pool, _temp) = db::test_pool().await;
        let result = create_configuration(&pool, "../bob", request("prices")).await;
        assert!(matches!(result, Err(ConfigurationError::ValidationError(_))));
    }
}
