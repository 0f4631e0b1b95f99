//! Request signature middleware
//!
//! Protected routes accept only requests signed with the shared secret:
//! - POST/PUT/PATCH/DELETE: `timestamp` and `hash` inside the JSON body
//! - GET/HEAD: `timestamp` and `hash` as query parameters
//!
//! A shared secret of 0 disables checking.

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use lch_common::api::{validate_hash, validate_timestamp, AuthQuery, SignatureError};
use serde_json::{json, Value};
use tracing::warn;

use super::ApiError;
use crate::AppState;

/// Largest request body read for signature validation
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Validate the request signature, then hand the request on unchanged
pub async fn signature_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    if matches!(*request.method(), Method::GET | Method::HEAD) {
        let Query(auth) = Query::<AuthQuery>::try_from_uri(request.uri())
            .map_err(|e| ApiError::BadRequest(format!("Missing signature parameters: {}", e)))?;
        let fields = json!({ "timestamp": auth.timestamp, "hash": auth.hash });
        check_signature(auth.timestamp, &auth.hash, &fields, state.shared_secret)?;
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read body: {}", e)))?;

    let fields: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let timestamp = fields
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::BadRequest("Missing timestamp field".to_string()))?;
    let hash = fields
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("Missing hash field".to_string()))?;

    check_signature(timestamp, hash, &fields, state.shared_secret)?;

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

fn check_signature(
    timestamp: i64,
    hash: &str,
    fields: &Value,
    shared_secret: i64,
) -> Result<(), ApiError> {
    validate_timestamp(timestamp).map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    validate_hash(hash, fields, shared_secret).map_err(|e| {
        if let SignatureError::InvalidHash {
            provided,
            calculated,
        } = &e
        {
            warn!(
                "Hash validation failed: provided={}, calculated={}",
                provided, calculated
            );
        }
        ApiError::Unauthorized(e.to_string())
    })
}
