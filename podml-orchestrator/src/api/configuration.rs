//! Configuration API Handlers
//!
//! HTTP endpoints for configuration management.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use podml_core::domain::configuration::Configuration;
use podml_core::dto::configuration::CreateConfiguration;
use podml_core::dto::job::Page;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::owner::Owner;
use crate::service::configuration_service;

/// POST /configurations
pub async fn create_configuration(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(req): Json<CreateConfiguration>,
) -> ApiResult<(StatusCode, Json<Configuration>)> {
    tracing::info!("Creating configuration {:?} for {}", req.name, owner);

    let configuration =
        configuration_service::create_configuration(&state.pool, &owner, req).await?;

    Ok((StatusCode::CREATED, Json(configuration)))
}

/// GET /configurations
pub async fn list_configurations(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<Configuration>>> {
    tracing::debug!("Listing configurations for {}", owner);

    let configurations =
        configuration_service::list_configurations(&state.pool, &owner, page).await?;

    Ok(Json(configurations))
}

/// GET /configurations/{id}
pub async fn get_configuration(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Configuration>> {
    tracing::debug!("Getting configuration: {}", id);

    let configuration = configuration_service::get_configuration(&state.pool, id, &owner).await?;

    Ok(Json(configuration))
}
