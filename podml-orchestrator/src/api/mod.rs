//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod configuration;
pub mod error;
pub mod health;
pub mod job;
pub mod owner;

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::TrainingJobService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jobs: Arc<TrainingJobService>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Configuration endpoints
        .route(
            "/configurations",
            post(configuration::create_configuration).get(configuration::list_configurations),
        )
        .route("/configurations/{id}", get(configuration::get_configuration))
        // Job endpoints
        .route("/jobs", post(job::create_job).get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
