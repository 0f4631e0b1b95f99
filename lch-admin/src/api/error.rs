//! API error type
//!
//! Every failure is rendered in the application envelope
//! `{ "success": false, "message": ... }`. Storage failures are logged in full
//! and reported to the caller with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lch_common::api::ApiResponse;
use thiserror::Error;
use tracing::error;

/// Message returned for unexpected server-side failures
pub const GENERIC_FAILURE: &str = "The operation failed due to an internal error";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing/invalid signature or unknown caller (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// lch-common error; status depends on the variant
    #[error(transparent)]
    Common(#[from] lch_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use lch_common::Error;

        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Common(Error::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg),
            ApiError::Common(Error::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            ApiError::Common(Error::InvalidInput(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Common(other) => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
            }
        };

        (status, Json(ApiResponse::failure(message))).into_response()
    }
}
