//! Content-addressed storage for reusable input blobs (fonts, logos,
//! shared preambles), shared across compilation jobs.
//!
//! Backends implement the small [`ReferenceStore`] protocol and are chosen
//! by DSN scheme at construction time. Each backend runs a
//! [`RetentionPolicy`] deciding which blobs survive.

pub mod backends;
pub mod retention;

pub use backends::dir::DirStore;
pub use backends::memory::MemoryStore;
pub use backends::nop::NopStore;
pub use retention::{AccessList, FileRef, InvalidAccessListConfig, RetentionPolicy};

use async_trait::async_trait;
use platen_core::Identifier;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Errors from reference store operations.
#[derive(Debug, Error)]
pub enum RefStoreError {
    /// The requested identifier is not present in the store.
    #[error("unknown reference")]
    UnknownReference,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reference store configuration error: {0}")]
    Config(String),

    /// A file in the store directory does not look like a reference blob.
    #[error("file {path} does not look like a reference file: {source}")]
    ForeignFile {
        path: String,
        #[source]
        source: platen_core::InvalidIdentifier,
    },
}

pub type RefStoreResult<T> = Result<T, RefStoreError>;

/// The protocol every reference store backend implements.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Whether a blob with this identifier exists.
    async fn exists(&self, id: &Identifier) -> bool;

    /// Copy the blob to `dst`. Returns [`RefStoreError::UnknownReference`]
    /// for ids not in the store. On success the blob counts as used for
    /// retention purposes.
    async fn copy_file(
        &self,
        id: &Identifier,
        dst: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> RefStoreResult<()>;

    /// Read `src` to completion, persisting the content and computing its
    /// identifier in one pass. The new ref is registered with the retention
    /// policy; evicted blobs are deleted before returning.
    async fn store(&self, src: &mut (dyn AsyncRead + Send + Unpin)) -> RefStoreResult<Identifier>;
}

/// Construct a reference store from a DSN.
///
/// The scheme selects the backend; the set is closed at build time:
///
/// - `dir:///path/to/blobs` stores one file per blob in an existing,
///   writable directory,
/// - `memory://` keeps blobs in process memory (tests, or strictly
///   size-bounded configurations only).
pub async fn from_dsn(dsn: &str, policy: RetentionPolicy) -> RefStoreResult<Arc<dyn ReferenceStore>> {
    let Some((scheme, rest)) = dsn.split_once("://") else {
        return Err(RefStoreError::Config(format!("invalid DSN: {dsn:?}")));
    };

    match scheme {
        "dir" => Ok(Arc::new(
            DirStore::open(std::path::Path::new(rest), policy).await?,
        )),
        "memory" => Ok(Arc::new(MemoryStore::new(policy))),
        other => Err(RefStoreError::Config(format!(
            "unknown storage adapter {other:?}, available adapters are: dir, memory"
        ))),
    }
}
