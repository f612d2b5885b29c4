//! The /status endpoint: a JSON snapshot of the running service.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use platen_core::engine::SUPPORTED_ENGINES;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Status {
    version: &'static str,
    mode: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    /// Job timeout in seconds.
    timeout: f64,
    engines: Vec<&'static str>,
    default_engine: &'static str,
    queue: QueueStatus,
}

#[derive(Debug, Serialize)]
struct QueueStatus {
    length: usize,
    capacity: usize,
}

pub async fn handle_status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        version: env!("CARGO_PKG_VERSION"),
        mode: state.config.mode(),
        images: state.config.images.clone(),
        timeout: state.config.compile_timeout_secs.max(0.0),
        engines: SUPPORTED_ENGINES.iter().map(|e| e.name()).collect(),
        default_engine: state.config.tex_engine.name(),
        queue: QueueStatus {
            length: state.scheduler.in_flight(),
            capacity: state.scheduler.capacity(),
        },
    })
}
