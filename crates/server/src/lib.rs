//! HTTP service for platen: the render pipeline, admission scheduler and
//! the thin surface around them.

pub mod error;
pub mod metrics;
pub mod renderer;
pub mod requestid;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod status;

pub use routes::create_router;
pub use scheduler::Scheduler;
pub use state::AppState;
