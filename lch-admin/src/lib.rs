//! lch-admin library - parish administration maintenance service
//!
//! Hosts the member-code reconciler behind an authenticated HTTP API and a
//! command-line entry point.

use std::time::Duration;

use axum::http::Method;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod activity;
pub mod api;
pub mod claims;
pub mod reconcile;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Shared secret for request signing (0 disables checking)
    pub shared_secret: i64,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, shared_secret: i64) -> Self {
        Self { db, shared_secret }
    }
}

/// Build application router
///
/// Maintenance routes require a signed request and a resolvable admin
/// caller; `/health` is public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route(
            "/api/maintenance/reformat-member-codes",
            post(api::reformat_member_codes),
        )
        .route(
            "/api/maintenance/member-codes/status",
            get(api::member_code_status),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::signature_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive CORS for the browser client
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .max_age(Duration::from_secs(86400))
}
