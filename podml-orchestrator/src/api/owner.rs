//! Caller identity
//!
//! The orchestrator sits behind an authenticating proxy that forwards the
//! verified subject in `X-Owner-Sub`. Every configuration and job lookup is
//! scoped by it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::error::ApiError;
use crate::storage::validate_owner;

pub const OWNER_HEADER: &str = "x-owner-sub";

/// Subject of the calling user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing X-Owner-Sub header".to_string()))?;

        let owner = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("Invalid X-Owner-Sub header".to_string()))?
            .trim();

        validate_owner(owner).map_err(ApiError::BadRequest)?;

        Ok(Owner(owner.to_string()))
    }
}
