//! Executor running latexmk from a locally installed TeX toolchain.

use crate::Executor;
use async_trait::async_trait;
use platen_core::{RenderError, ShellEscape};
use platen_tex::Document;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

pub struct LocalExecutor {
    shell_escape: ShellEscape,
    /// Overrides the compiler binary in tests.
    driver_override: Option<std::path::PathBuf>,
}

impl LocalExecutor {
    pub fn new(shell_escape: ShellEscape) -> Self {
        Self {
            shell_escape,
            driver_override: None,
        }
    }

    #[cfg(test)]
    fn with_driver(shell_escape: ShellEscape, driver: std::path::PathBuf) -> Self {
        Self {
            shell_escape,
            driver_override: Some(driver),
        }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn run(&self, doc: &Document, cancel: &CancellationToken) -> Result<(), RenderError> {
        let (dir, mut args) = crate::extract(doc, self.shell_escape).await?;
        if let Some(driver) = &self.driver_override {
            args[0] = driver.display().to_string();
        }

        tracing::debug!(args = ?args[1..], "running latexmk");
        let child = Command::new(&args[0])
            .args(&args[1..])
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RenderError::compilation("compilation failed")
                    .with_cause(e)
                    .with_extra("cmd", args[0].clone())
            })?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output
                    .map_err(|e| RenderError::compilation("compilation failed").with_cause(e))?;
                if output.status.success() {
                    return Ok(());
                }
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                tracing::error!(stderr = %stderr, status = ?output.status, "compilation failed");
                Err(RenderError::compilation("compilation failed")
                    .with_extra("cmd", args[0].clone())
                    .with_extra("args", args[1..].to_vec())
                    .with_extra("output", stderr))
            }
            // dropping the child kills the compiler
            _ = cancel.cancelled() => {
                tracing::warn!("compilation cancelled, killing compiler");
                Err(RenderError::compilation("compilation aborted"))
            }
        }
    }
}
