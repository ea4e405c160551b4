//! # Beacon Server
//!
//! HTTP front end for the incident service plus the wiring shared with the
//! `beacon-notifier` consumer binary.

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Builds the full application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(routes::create_api_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
