//! Service configuration.
//!
//! All knobs are fixed at process start and passed through construction;
//! nothing here is mutated in steady state. The binary populates this from
//! an optional TOML file, `PLATEN_` environment variables and CLI flags.

use crate::engine::{Engine, ShellEscape};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What to do with a job's working directory once the request finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepJobs {
    #[default]
    Never,
    Always,
    OnFailure,
}

impl std::str::FromStr for KeepJobs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(KeepJobs::Never),
            "always" => Ok(KeepJobs::Always),
            "on-failure" => Ok(KeepJobs::OnFailure),
            other => Err(format!("unknown keep-jobs value: {other:?}")),
        }
    }
}

/// Which retention policy the reference store runs with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionKind {
    #[default]
    Keep,
    PurgeOnStart,
    Access,
}

impl std::str::FromStr for RetentionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" | "none" => Ok(RetentionKind::Keep),
            "purge" | "purge-on-start" => Ok(RetentionKind::PurgeOnStart),
            "access" => Ok(RetentionKind::Access),
            other => Err(format!("unknown retention policy: {other:?}")),
        }
    }
}

/// Immutable service configuration, shared by reference across the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP bind address.
    pub listen_address: String,

    /// Admission scheduler capacity, i.e. maximum parallel compilations.
    pub parallel_jobs: usize,

    /// Maximum time a request waits for a free scheduler slot, in seconds.
    pub queue_wait_secs: f64,

    /// Per-request compile timeout in seconds; a value <= 0 disables it.
    pub compile_timeout_secs: f64,

    /// HTTP body cap in bytes; a value <= 0 disables the check.
    pub max_job_size_bytes: i64,

    /// Base directory for per-job working directories. Empty means the OS
    /// temporary directory.
    pub job_directory: Option<PathBuf>,

    /// Default TeX engine when the request does not name one.
    pub tex_engine: Engine,

    /// Working-directory keep policy.
    pub keep_jobs: KeepJobs,

    /// Shell-escape policy passed to latexmk.
    pub shell_escape: ShellEscape,

    /// DSN of the reference store backend (e.g. `dir:///var/lib/platen/refs`).
    /// None disables reference support.
    pub reference_store: Option<String>,

    /// Retention policy for the reference store.
    pub retention_policy: RetentionKind,

    /// Access-list item quota; a value <= 0 means unlimited.
    pub rp_access_items: i64,

    /// Access-list total-size quota in bytes; a value <= 0 means unlimited.
    pub rp_access_size_bytes: i64,

    /// Container image allow-list. Non-empty switches the service into
    /// container mode; the first entry is the default image.
    pub images: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:2201".to_string(),
            parallel_jobs: default_parallel_jobs(),
            queue_wait_secs: 10.0,
            compile_timeout_secs: 60.0,
            max_job_size_bytes: 50 * 1024 * 1024,
            job_directory: None,
            tex_engine: Engine::default(),
            keep_jobs: KeepJobs::default(),
            shell_escape: ShellEscape::default(),
            reference_store: None,
            retention_policy: RetentionKind::default(),
            rp_access_items: 1000,
            rp_access_size_bytes: 100 * 1024 * 1024,
            images: Vec::new(),
        }
    }
}

fn default_parallel_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl ServiceConfig {
    /// Queue-acquire timeout. Non-positive values fall back to one second.
    pub fn queue_wait(&self) -> Duration {
        if self.queue_wait_secs > 0.0 {
            Duration::from_secs_f64(self.queue_wait_secs)
        } else {
            Duration::from_secs(1)
        }
    }

    /// Per-request compile timeout, if enabled.
    pub fn compile_timeout(&self) -> Option<Duration> {
        (self.compile_timeout_secs > 0.0).then(|| Duration::from_secs_f64(self.compile_timeout_secs))
    }

    /// Body cap for /render, if enabled.
    pub fn max_job_size(&self) -> Option<usize> {
        usize::try_from(self.max_job_size_bytes).ok().filter(|n| *n > 0)
    }

    /// Execution mode, derived from the image allow-list.
    pub fn mode(&self) -> &'static str {
        if self.images.is_empty() { "local" } else { "container" }
    }

    /// A small configuration suitable for tests.
    pub fn for_testing() -> Self {
        Self {
            parallel_jobs: 2,
            queue_wait_secs: 0.25,
            compile_timeout_secs: 5.0,
            ..Self::default()
        }
    }
}
