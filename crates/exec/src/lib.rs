//! Executors run the TeX compiler against a staged [`Document`].
//!
//! An executor reads the document's working directory and main input,
//! invokes latexmk with the engine's command vector, honours cancellation,
//! and leaves `<main-stem>.pdf` and/or `<main-stem>.log` behind for
//! harvesting.

pub mod container;
pub mod local;
pub mod mock;

pub use container::ContainerExecutor;
pub use local::LocalExecutor;
pub use mock::MockExecutor;

use async_trait::async_trait;
use platen_core::RenderError;
use platen_tex::Document;
use tokio_util::sync::CancellationToken;

/// The contract between the render pipeline and compiler backends.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run one compilation. Cancellation of `cancel` must terminate the
    /// compiler; stderr is captured into the error's extras on failure.
    async fn run(&self, doc: &Document, cancel: &CancellationToken) -> Result<(), RenderError>;
}

/// Resolve working directory and command vector for a document.
pub(crate) async fn extract(
    doc: &Document,
    shell_escape: platen_core::ShellEscape,
) -> Result<(std::path::PathBuf, Vec<String>), RenderError> {
    let main = doc
        .main_input()
        .map_err(|e| RenderError::compilation("invalid document").with_cause(e))?;
    let cmd = doc.engine().latexmk_cmd(main, shell_escape);
    let dir = doc.working_directory().await?.to_path_buf();
    Ok((dir, cmd))
}
