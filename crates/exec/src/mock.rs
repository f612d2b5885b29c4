//! A fake executor for tests: fabricates compiler output files without
//! running latexmk.

use crate::Executor;
use async_trait::async_trait;
use platen_core::RenderError;
use platen_tex::Document;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A PDF-shaped result body, enough to satisfy content sniffing.
const FAKE_PDF: &[u8] = b"%PDF-1.5\n%fake document, rendered by the mock executor\n%%EOF\n";

const SUCCESS_LOG: &[u8] = b"This is a transcript.\nOutput written on output.pdf (1 page).\n";

const FAILURE_LOG: &[u8] = b"This is a transcript.\n\
! Undefined control sequence.\n\
l.3 \\startdocument\n\
! Emergency stop.\nNo pages of output.\n";

/// Test stand-in for a compiler. Writes `<stem>.pdf` and `<stem>.log` (or
/// only the log when failing) into the working directory.
pub struct MockExecutor {
    fail: bool,
    delay: Option<Duration>,
}

impl MockExecutor {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            delay: None,
        }
    }

    /// Pretend the compilation takes this long. Useful for queue tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn run(&self, doc: &Document, cancel: &CancellationToken) -> Result<(), RenderError> {
        let main = doc
            .main_input()
            .map_err(|e| RenderError::compilation("invalid document").with_cause(e))?;
        let stem = main.rsplit_once('.').map(|(s, _)| s).unwrap_or(main).to_string();
        let dir = doc.working_directory().await?.to_path_buf();

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(RenderError::compilation("compilation aborted"));
                }
            }
        }

        if self.fail {
            tokio::fs::write(dir.join(format!("{stem}.log")), FAILURE_LOG)
                .await
                .map_err(|e| RenderError::compilation("compilation failed").with_cause(e))?;
            return Err(RenderError::compilation("compilation failed")
                .with_extra("output", "latexmk: giving up"));
        }

        tokio::fs::write(dir.join(format!("{stem}.pdf")), FAKE_PDF)
            .await
            .map_err(|e| RenderError::compilation("compilation failed").with_cause(e))?;
        tokio::fs::write(dir.join(format!("{stem}.log")), SUCCESS_LOG)
            .await
            .map_err(|e| RenderError::compilation("compilation failed").with_cause(e))?;
        Ok(())
    }
}
