//! Application state shared across handlers.

use crate::scheduler::Scheduler;
use platen_core::ServiceConfig;
use platen_exec::Executor;
use platen_refstore::ReferenceStore;
use platen_tex::JobDir;
use std::sync::Arc;

/// Shared, immutable service state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub scheduler: Scheduler,
    pub job_dir: Arc<JobDir>,
    pub refs: Arc<dyn ReferenceStore>,
    pub executor: Arc<dyn Executor>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        job_dir: JobDir,
        refs: Arc<dyn ReferenceStore>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let scheduler = Scheduler::new(config.parallel_jobs, config.queue_wait());
        Self {
            config: Arc::new(config),
            scheduler,
            job_dir: Arc::new(job_dir),
            refs,
            executor,
        }
    }
}
