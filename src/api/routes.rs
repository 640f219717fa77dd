//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers;
use super::handlers::AppState;

/// Create RESTful API router
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ask", post(handlers::ask))
        .with_state(state)
}
