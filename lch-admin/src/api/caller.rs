//! Caller identity extractor
//!
//! The gateway in front of this service authenticates the admin and forwards
//! their id in the `X-Admin-ID` header. The id is resolved against
//! `admin_users` on every request.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::ApiError;
use crate::claims::{self, AdminClaims};
use crate::AppState;

/// Header carrying the authenticated admin's id
pub const ADMIN_ID_HEADER: &str = "x-admin-id";

/// The acting admin, resolved from `X-Admin-ID`
#[derive(Debug, Clone)]
pub struct Caller(pub AdminClaims);

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let admin_id = parts
            .headers
            .get(ADMIN_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-Admin-ID header".to_string()))?;

        let claims = claims::load_by_id(&state.db, admin_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized(format!("Unknown admin: {}", admin_id)))?;

        Ok(Caller(claims))
    }
}
