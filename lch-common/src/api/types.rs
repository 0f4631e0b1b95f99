//! Shared API request/response types

use serde::{Deserialize, Serialize};

/// Signature parameters for GET requests (query string)
///
/// ```
/// // GET /api/maintenance/member-codes/status?timestamp=1730000000000&hash=abc123...
/// use lch_common::api::types::AuthQuery;
///
/// let query = AuthQuery { timestamp: 1730000000000, hash: "abc123".to_string() };
/// assert_eq!(query.timestamp, 1730000000000);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthQuery {
    /// Unix epoch time in milliseconds
    pub timestamp: i64,

    /// SHA-256 hash (64 hex chars)
    pub hash: String,
}

/// Application-wide response envelope
///
/// Every endpoint answers `{ "success": bool, "message": string, "data": ... }`;
/// `data` is omitted when there is nothing to return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}
