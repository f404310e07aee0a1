//! Users Auth Library
//!
//! Session lifecycle core (refresh-token rotation, access tokens, role gate)
//! plus the HTTP surface the binary serves.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;

use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Full application router: auth routes, request logging, tracing and CORS.
pub fn build_app(service: Arc<auth::AuthService>) -> Router {
    auth::router(auth::AuthState::new(service))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
