//! Maintenance endpoints
//!
//! Both endpoints are restricted to superadmins. The privilege check runs
//! before the database is touched.

use axum::{body::Bytes, extract::State, Json};
use lch_common::api::ApiResponse;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, Caller};
use crate::reconcile::{self, MemberCodeStatus, ReconcileOptions, ReconcileReport, Reconciler};
use crate::AppState;

/// Optional body of the reformat request
///
/// Signature fields (`timestamp`, `hash`) may share the body and are ignored here.
#[derive(Debug, Default, Deserialize)]
pub struct ReformatRequest {
    #[serde(default, alias = "dryRun")]
    pub dry_run: bool,
}

impl ReformatRequest {
    /// Parse the request body
    ///
    /// Only an empty body means "no options". Anything else must be valid
    /// JSON, with or without a JSON content type, so a requested dry run is
    /// never silently dropped.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
    }
}

/// POST /api/maintenance/reformat-member-codes
pub async fn reformat_member_codes(
    State(state): State<AppState>,
    Caller(claims): Caller,
    body: Bytes,
) -> Result<Json<ApiResponse<ReconcileReport>>, ApiError> {
    let grant = claims.require_superadmin()?;
    let request = ReformatRequest::from_body(&body)?;

    info!(
        "Member code reformat requested by {} (dry_run={})",
        claims.username, request.dry_run
    );

    let report = Reconciler::new(state.db.clone())
        .run(
            &grant,
            ReconcileOptions {
                dry_run: request.dry_run,
            },
        )
        .await?;

    let message = if report.dry_run {
        "Dry run completed; no changes were saved"
    } else {
        "Member codes reformatted and synchronized successfully"
    };

    Ok(Json(ApiResponse::ok(message, report)))
}

/// GET /api/maintenance/member-codes/status
pub async fn member_code_status(
    State(state): State<AppState>,
    Caller(claims): Caller,
) -> Result<Json<ApiResponse<MemberCodeStatus>>, ApiError> {
    claims.require_superadmin()?;

    let status = reconcile::member_code_status(&state.db).await?;
    Ok(Json(ApiResponse::ok("Member code status", status)))
}
