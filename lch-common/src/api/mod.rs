//! Shared HTTP API pieces
//!
//! Holds only framework-independent code: request signing, the response
//! envelope and authentication parameter types. Each service wraps these in
//! its own axum middleware and extractors.

pub mod auth;
pub mod types;

pub use auth::{
    calculate_hash, current_millis, initialize_shared_secret, load_shared_secret, validate_hash,
    validate_timestamp, SignatureError,
};
pub use types::{ApiResponse, AuthQuery};
