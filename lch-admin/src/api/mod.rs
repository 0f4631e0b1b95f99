//! HTTP API handlers for lch-admin

pub mod auth;
pub mod caller;
pub mod error;
pub mod health;
pub mod maintenance;

pub use auth::signature_middleware;
pub use caller::{Caller, ADMIN_ID_HEADER};
pub use error::ApiError;
pub use health::health_routes;
pub use maintenance::{member_code_status, reformat_member_codes};
