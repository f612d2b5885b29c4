//! A no-op reference store: every lookup misses, stored content is
//! discarded. Used when no reference store is configured.

use crate::{RefStoreError, RefStoreResult, ReferenceStore};
use async_trait::async_trait;
use platen_core::Identifier;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Default)]
pub struct NopStore;

#[async_trait]
impl ReferenceStore for NopStore {
    async fn exists(&self, _id: &Identifier) -> bool {
        false
    }

    async fn copy_file(
        &self,
        _id: &Identifier,
        _dst: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> RefStoreResult<()> {
        Err(RefStoreError::UnknownReference)
    }

    async fn store(&self, src: &mut (dyn AsyncRead + Send + Unpin)) -> RefStoreResult<Identifier> {
        // drain the source, discarding content but reporting its identifier
        let mut hasher = Identifier::hasher();
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            use tokio::io::AsyncReadExt;
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookups_always_miss() {
        let store = NopStore;
        let id = store.store(&mut &b"anything"[..]).await.unwrap();
        assert_eq!(id, Identifier::digest(b"anything"));
        assert!(!store.exists(&id).await);

        let mut out = Vec::new();
        assert!(matches!(
            store.copy_file(&id, &mut out).await,
            Err(RefStoreError::UnknownReference)
        ));
    }
}
