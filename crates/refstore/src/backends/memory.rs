//! In-process reference store. Suitable for tests or strictly
//! size-bounded configurations; blobs live on the heap.

use crate::retention::{FileRef, RetentionPolicy};
use crate::{RefStoreError, RefStoreResult, ReferenceStore};
use async_trait::async_trait;
use bytes::Bytes;
use platen_core::Identifier;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub struct MemoryStore {
    blobs: Mutex<HashMap<Identifier, Bytes>>,
    policy: RetentionPolicy,
}

impl MemoryStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            policy,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::KeepForever)
    }
}

#[async_trait]
impl ReferenceStore for MemoryStore {
    async fn exists(&self, id: &Identifier) -> bool {
        self.blobs.lock().expect("memory store poisoned").contains_key(id)
    }

    async fn copy_file(
        &self,
        id: &Identifier,
        dst: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> RefStoreResult<()> {
        let blob = self
            .blobs
            .lock()
            .expect("memory store poisoned")
            .get(id)
            .cloned()
            .ok_or(RefStoreError::UnknownReference)?;

        dst.write_all(&blob).await?;
        self.policy.touch(id);
        Ok(())
    }

    async fn store(&self, src: &mut (dyn AsyncRead + Send + Unpin)) -> RefStoreResult<Identifier> {
        let mut content = Vec::new();
        src.read_to_end(&mut content).await?;

        let id = Identifier::digest(&content);
        let size = content.len() as u64;

        let mut blobs = self.blobs.lock().expect("memory store poisoned");
        blobs.insert(id, Bytes::from(content));
        for evicted in self.policy.add(FileRef { id, size }) {
            blobs.remove(&evicted.id);
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::AccessList;

    #[tokio::test]
    async fn roundtrip() {
        let store = MemoryStore::default();
        let id = store.store(&mut &b"shared preamble"[..]).await.unwrap();
        assert!(store.exists(&id).await);

        let mut out = Vec::new();
        store.copy_file(&id, &mut out).await.unwrap();
        assert_eq!(out, b"shared preamble");
    }

    #[tokio::test]
    async fn unknown_reference() {
        let store = MemoryStore::default();
        let id = Identifier::digest(b"ghost");
        let mut out = Vec::new();
        assert!(matches!(
            store.copy_file(&id, &mut out).await,
            Err(RefStoreError::UnknownReference)
        ));
    }

    #[tokio::test]
    async fn eviction_frees_blobs() {
        let policy = RetentionPolicy::AccessList(AccessList::new(1, 0).unwrap());
        let store = MemoryStore::new(policy);

        let first = store.store(&mut &b"one"[..]).await.unwrap();
        let second = store.store(&mut &b"two"[..]).await.unwrap();

        assert!(!store.exists(&first).await);
        assert!(store.exists(&second).await);
    }
}
