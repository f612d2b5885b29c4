//! On-disk reference store: one file per blob, named by the identifier's
//! raw encoding, no subdirectory fan-out.

use crate::retention::{FileRef, RetentionPolicy};
use crate::{RefStoreError, RefStoreResult, ReferenceStore};
use async_trait::async_trait;
use platen_core::Identifier;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct DirStore {
    path: PathBuf,
    policy: RetentionPolicy,
}

impl DirStore {
    /// Open a store rooted at an existing, writable directory.
    ///
    /// The retention policy is applied immediately: existing blobs are
    /// enumerated, ordered by modification time (oldest first) and primed
    /// into the policy; whatever the policy evicts is deleted. Files whose
    /// names do not parse as identifiers abort construction.
    pub async fn open(path: &Path, policy: RetentionPolicy) -> RefStoreResult<Self> {
        let path = platen_core::fsutil::ensure_writable(path)
            .map_err(|e| RefStoreError::Config(format!("path {path:?} not writable: {e}")))?;

        let store = Self { path, policy };
        store.prime_retention().await?;
        Ok(store)
    }

    async fn prime_retention(&self) -> RefStoreResult<()> {
        let mut files: Vec<(SystemTime, FileRef)> = Vec::new();

        let mut entries = fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = Identifier::parse(&format!("sha256:{name}")).map_err(|source| {
                RefStoreError::ForeignFile {
                    path: entry.path().display().to_string(),
                    source,
                }
            })?;
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((mtime, FileRef { id, size: meta.len() }));
        }

        files.sort_by_key(|(mtime, _)| *mtime);
        let refs = files.into_iter().map(|(_, f)| f).collect();

        for evicted in self.policy.prime(refs) {
            self.remove(&evicted.id).await?;
        }
        Ok(())
    }

    fn id_path(&self, id: &Identifier) -> PathBuf {
        self.path.join(id.raw())
    }

    async fn remove(&self, id: &Identifier) -> RefStoreResult<()> {
        fs::remove_file(self.id_path(id)).await?;
        Ok(())
    }
}

#[async_trait]
impl ReferenceStore for DirStore {
    async fn exists(&self, id: &Identifier) -> bool {
        fs::try_exists(self.id_path(id)).await.unwrap_or(false)
    }

    async fn copy_file(
        &self,
        id: &Identifier,
        dst: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> RefStoreResult<()> {
        let mut src = match fs::File::open(self.id_path(id)).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RefStoreError::UnknownReference);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(refstore = "dir", id = %id.raw(), "copy file");
        tokio::io::copy(&mut src, dst).await?;
        self.policy.touch(id);
        Ok(())
    }

    async fn store(&self, src: &mut (dyn AsyncRead + Send + Unpin)) -> RefStoreResult<Identifier> {
        let tmp_path = self.path.join(format!("tmp-{}", Uuid::new_v4()));
        let mut tmp = fs::File::create(&tmp_path).await?;

        // tee: hash while spooling to the temp file
        let mut hasher = Identifier::hasher();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        loop {
            let n = match src.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    drop(tmp);
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(e.into());
                }
            };
            hasher.update(&buf[..n]);
            size += n as u64;
            if let Err(e) = tmp.write_all(&buf[..n]).await {
                drop(tmp);
                let _ = fs::remove_file(&tmp_path).await;
                return Err(e.into());
            }
        }
        if let Err(e) = tmp.sync_all().await {
            drop(tmp);
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        drop(tmp);

        let id = hasher.finalize();
        tracing::debug!(refstore = "dir", id = %id.raw(), size, "store file");

        if let Err(e) = fs::rename(&tmp_path, self.id_path(&id)).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        for evicted in self.policy.add(FileRef { id, size }) {
            self.remove(&evicted.id).await?;
        }
        Ok(id)
    }
}
