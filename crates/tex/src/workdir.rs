//! The process-wide base directory under which per-job working
//! directories are created.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Prefix for per-job working directories under the base.
const WORKDIR_PREFIX: &str = "texd-";

/// Error raised when the configured job directory is unusable.
#[derive(Debug, Error)]
#[error("invalid working directory {dir:?}: {source}")]
pub struct InvalidJobDir {
    dir: PathBuf,
    #[source]
    source: io::Error,
}

/// Validated base directory for job working directories. Fixed at startup.
#[derive(Debug, Clone)]
pub struct JobDir {
    base: PathBuf,
}

impl JobDir {
    /// Validate and pin the base directory. `None` falls back to the OS
    /// temporary directory; anything else must resolve to an existing,
    /// writable directory.
    pub fn new(dir: Option<&Path>) -> Result<Self, InvalidJobDir> {
        let base = match dir {
            None => std::env::temp_dir(),
            Some(dir) => {
                platen_core::fsutil::ensure_writable(dir).map_err(|source| InvalidJobDir {
                    dir: dir.to_path_buf(),
                    source,
                })?
            }
        };
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create a uniquely named working directory under the base.
    pub(crate) async fn create_unique(&self) -> io::Result<PathBuf> {
        let path = self
            .base
            .join(format!("{WORKDIR_PREFIX}{}", Uuid::new_v4().simple()));

        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&path).await?;
        Ok(path)
    }
}
