//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::OrchestratorError;
use crate::service::configuration_service::ConfigurationError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    /// Transient failure, the caller may retry
    Unavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidInput(msg) => ApiError::BadRequest(msg),
            OrchestratorError::NotFound => ApiError::NotFound("Not found".to_string()),
            OrchestratorError::SubmissionFailure { job_id, ref source } => {
                tracing::error!("Submission failed (job: {:?}): {}", job_id, source);
                ApiError::InternalError(err.to_string())
            }
            OrchestratorError::ReconciliationFailure { ref source } => {
                tracing::warn!("Reconciliation failed: {}", source);
                ApiError::Unavailable(err.to_string())
            }
            OrchestratorError::Storage(ref source) => {
                tracing::error!("Database error: {:?}", source);
                ApiError::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(err: ConfigurationError) -> Self {
        match err {
            ConfigurationError::ValidationError(msg) => ApiError::BadRequest(msg),
            ConfigurationError::NotFound(id) => {
                ApiError::NotFound(format!("Configuration {} not found", id))
            }
            ConfigurationError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                ApiError::InternalError("Internal server error".to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterError;
    use crate::service::BackendError;

    fn status_of(err: OrchestratorError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_orchestrator_error_status_codes() {
        assert_eq!(
            status_of(OrchestratorError::InvalidInput("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(OrchestratorError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(OrchestratorError::SubmissionFailure {
                job_id: None,
                source: BackendError::Cluster(ClusterError::Rejected("quota".to_string())),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(OrchestratorError::ReconciliationFailure {
                source: BackendError::Cluster(ClusterError::Transient("timeout".to_string())),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_backend_detail_is_not_exposed() {
        let err = OrchestratorError::SubmissionFailure {
            job_id: None,
            source: BackendError::Cluster(ClusterError::Rejected(
                "admission webhook denied secret-thing".to_string(),
            )),
        };
        match ApiError::from(err) {
            ApiError::InternalError(msg) => assert!(!msg.contains("secret-thing")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
