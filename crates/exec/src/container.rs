//! Executor running latexmk inside a short-lived, network-isolated
//! container.
//!
//! The service does not manage container lifecycle: it issues exactly one
//! "run this command in this directory with this image" request through the
//! container CLI and waits for it. The working directory is bind-mounted at
//! `/texd`; the container is removed when the compiler exits.

use crate::Executor;
use async_trait::async_trait;
use platen_core::{RenderError, ShellEscape};
use platen_tex::Document;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Mount point of the working directory inside the container.
const CONTAINER_WORKDIR: &str = "/texd";

pub struct ContainerExecutor {
    shell_escape: ShellEscape,
    /// The container CLI binary, normally `docker`.
    runtime: String,
}

impl ContainerExecutor {
    pub fn new(shell_escape: ShellEscape) -> Self {
        Self {
            shell_escape,
            runtime: "docker".to_string(),
        }
    }
}

#[async_trait]
impl Executor for ContainerExecutor {
    async fn run(&self, doc: &Document, cancel: &CancellationToken) -> Result<(), RenderError> {
        let (dir, compile_cmd) = crate::extract(doc, self.shell_escape).await?;
        let image = doc
            .image()
            .ok_or_else(|| RenderError::compilation("no container image selected"))?;

        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--network".into(),
            "none".into(),
            "--volume".into(),
            format!("{}:{CONTAINER_WORKDIR}", dir.display()),
            "--workdir".into(),
            CONTAINER_WORKDIR.into(),
            image.to_string(),
        ];
        args.extend(compile_cmd);

        tracing::debug!(image = %image, args = ?args, "running containerised latexmk");
        let child = Command::new(&self.runtime)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RenderError::compilation("compilation failed")
                    .with_cause(e)
                    .with_extra("cmd", self.runtime.clone())
            })?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output
                    .map_err(|e| RenderError::compilation("compilation failed").with_cause(e))?;
                if output.status.success() {
                    return Ok(());
                }
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                tracing::error!(stderr = %stderr, status = ?output.status, image = %image,
                    "containerised compilation failed");
                Err(RenderError::compilation("compilation failed")
                    .with_extra("image", image.to_string())
                    .with_extra("output", stderr))
            }
            _ = cancel.cancelled() => {
                tracing::warn!(image = %image, "compilation cancelled, killing container");
                Err(RenderError::compilation("compilation aborted"))
            }
        }
    }
}
