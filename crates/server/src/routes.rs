//! Route configuration.

use crate::metrics::metrics_handler;
use crate::renderer::handle_render;
use crate::requestid;
use crate::state::AppState;
use crate::status::handle_status;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = match state.config.max_job_size() {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/render", post(handle_render).layer(body_limit))
        .route("/status", get(handle_status))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(requestid::middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
