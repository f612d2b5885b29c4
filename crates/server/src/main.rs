//! platend server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use platen_core::config::{KeepJobs, RetentionKind, ServiceConfig};
use platen_core::{Engine, ShellEscape};
use platen_exec::{ContainerExecutor, Executor, LocalExecutor};
use platen_refstore::{AccessList, NopStore, ReferenceStore, RetentionPolicy};
use platen_server::{AppState, Scheduler, create_router};
use platen_tex::JobDir;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// platen - a LaTeX compilation service
#[derive(Parser, Debug)]
#[command(name = "platend")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to an optional TOML configuration file
    #[arg(short, long, env = "PLATEN_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address for the HTTP API
    #[arg(short = 'b', long)]
    listen_address: Option<String>,

    /// Maximum number of parallel rendering jobs
    #[arg(short = 'P', long)]
    parallel_jobs: Option<usize>,

    /// Maximum wait time in a full rendering queue, in seconds
    #[arg(short = 'w', long)]
    queue_wait: Option<f64>,

    /// Maximum rendering time per job, in seconds; a value <= 0 disables
    /// the timeout
    #[arg(short = 't', long)]
    compile_timeout: Option<f64>,

    /// Maximum size of a render request in bytes; a value <= 0 disables
    /// the check
    #[arg(long)]
    max_job_size: Option<i64>,

    /// Base directory to place working directories into (must exist and be
    /// writable; defaults to the OS temp directory)
    #[arg(short = 'D', long)]
    job_directory: Option<PathBuf>,

    /// Name of the default TeX engine [xelatex, pdflatex, lualatex]
    #[arg(short = 'X', long)]
    tex_engine: Option<Engine>,

    /// Keep job working directories [never, on-failure, always]
    #[arg(long)]
    keep_jobs: Option<KeepJobs>,

    /// Shell-escape policy for latexmk [restricted, allowed, forbidden]
    #[arg(long)]
    shell_escape: Option<ShellEscape>,

    /// Enable the reference store and configure it with a DSN; available
    /// adapters are dir:// and memory://
    #[arg(long)]
    reference_store: Option<String>,

    /// How to handle reference store quota [keep, purge-on-start, access]
    #[arg(short = 'R', long)]
    retention_policy: Option<RetentionKind>,

    /// For retention-policy=access: maximum number of items to keep in the
    /// access list before evicting files
    #[arg(long)]
    rp_access_items: Option<i64>,

    /// For retention-policy=access: maximum total size of items in the
    /// access list before evicting files, in bytes
    #[arg(long)]
    rp_access_size: Option<i64>,

    /// Container image allow-list; a non-empty list enables container mode
    images: Vec<String>,
}

fn load_config(args: Args) -> Result<ServiceConfig> {
    let mut figment = Figment::new();
    if let Some(path) = &args.config {
        if !path.exists() {
            anyhow::bail!("configuration file {} does not exist", path.display());
        }
        tracing::info!(config = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    let mut config: ServiceConfig = figment
        .merge(Env::prefixed("PLATEN_"))
        .extract()
        .context("failed to load configuration")?;

    // explicit CLI flags win over file and environment
    if let Some(v) = args.listen_address {
        config.listen_address = v;
    }
    if let Some(v) = args.parallel_jobs {
        config.parallel_jobs = v;
    }
    if let Some(v) = args.queue_wait {
        config.queue_wait_secs = v;
    }
    if let Some(v) = args.compile_timeout {
        config.compile_timeout_secs = v;
    }
    if let Some(v) = args.max_job_size {
        config.max_job_size_bytes = v;
    }
    if let Some(v) = args.job_directory {
        config.job_directory = Some(v);
    }
    if let Some(v) = args.tex_engine {
        config.tex_engine = v;
    }
    if let Some(v) = args.keep_jobs {
        config.keep_jobs = v;
    }
    if let Some(v) = args.shell_escape {
        config.shell_escape = v;
    }
    if let Some(v) = args.reference_store {
        config.reference_store = Some(v);
    }
    if let Some(v) = args.retention_policy {
        config.retention_policy = v;
    }
    if let Some(v) = args.rp_access_items {
        config.rp_access_items = v;
    }
    if let Some(v) = args.rp_access_size {
        config.rp_access_size_bytes = v;
    }
    if !args.images.is_empty() {
        config.images = args.images;
    }

    Ok(config)
}

fn retention_policy(config: &ServiceConfig) -> Result<RetentionPolicy> {
    Ok(match config.retention_policy {
        RetentionKind::Keep => RetentionPolicy::KeepForever,
        RetentionKind::PurgeOnStart => RetentionPolicy::PurgeOnStart,
        RetentionKind::Access => RetentionPolicy::AccessList(
            AccessList::new(config.rp_access_items, config.rp_access_size_bytes)
                .context("error initializing retention policy")?,
        ),
    })
}

async fn reference_store(config: &ServiceConfig) -> Result<Arc<dyn ReferenceStore>> {
    match &config.reference_store {
        Some(dsn) => {
            let policy = retention_policy(config)?;
            platen_refstore::from_dsn(dsn, policy)
                .await
                .context("error initializing reference store")
        }
        None => Ok(Arc::new(NopStore)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("platen v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args)?;

    platen_server::metrics::register_metrics();

    let job_dir =
        JobDir::new(config.job_directory.as_deref()).context("error setting job directory")?;
    tracing::info!(dir = %job_dir.base().display(), "job directory initialized");

    let refs = reference_store(&config).await?;

    let executor: Arc<dyn Executor> = if config.images.is_empty() {
        Arc::new(LocalExecutor::new(config.shell_escape))
    } else {
        tracing::info!(images = %config.images.join(","), "using container mode");
        Arc::new(ContainerExecutor::new(config.shell_escape))
    };

    let state = AppState::new(config, job_dir, refs, executor);
    let scheduler = state.scheduler.clone();
    let addr = state.config.listen_address.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!(addr = %addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then stop admitting new jobs. Jobs holding
/// a slot finish normally under axum's graceful shutdown.
async fn shutdown_signal(scheduler: Scheduler) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("performing graceful shutdown");
    scheduler.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "platend",
            "--parallel-jobs",
            "4",
            "--queue-wait",
            "2.5",
            "--tex-engine",
            "lualatex",
            "--keep-jobs",
            "on-failure",
            "--retention-policy",
            "access",
        ]);
        let config = load_config(args).unwrap();
        assert_eq!(config.parallel_jobs, 4);
        assert_eq!(config.queue_wait_secs, 2.5);
        assert_eq!(config.tex_engine, Engine::LuaLaTeX);
        assert_eq!(config.keep_jobs, KeepJobs::OnFailure);
        assert_eq!(config.retention_policy, RetentionKind::Access);
    }

    #[test]
    fn trailing_arguments_become_the_image_allow_list() {
        let args = parse(&["platend", "registry.example.org/tex:5", "registry.example.org/tex:6"]);
        let config = load_config(args).unwrap();
        assert_eq!(config.mode(), "container");
        assert_eq!(config.images.len(), 2);
    }

    #[test]
    fn unknown_engine_is_rejected_at_parse_time() {
        assert!(Args::try_parse_from(["platend", "--tex-engine", "teximpact"]).is_err());
    }

    #[test]
    fn access_list_policy_validates_quotas() {
        let config = ServiceConfig {
            retention_policy: RetentionKind::Access,
            rp_access_items: 0,
            rp_access_size_bytes: 0,
            ..ServiceConfig::default()
        };
        assert!(retention_policy(&config).is_err());

        let config = ServiceConfig {
            retention_policy: RetentionKind::Access,
            ..ServiceConfig::default()
        };
        assert!(retention_policy(&config).is_ok());
    }
}
