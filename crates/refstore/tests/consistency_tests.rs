//! Cross-backend consistency tests for the reference store protocol.

use platen_core::Identifier;
use platen_refstore::{
    AccessList, DirStore, MemoryStore, RefStoreError, ReferenceStore, RetentionPolicy, from_dsn,
};
use std::sync::Arc;

async fn roundtrip(store: &dyn ReferenceStore) {
    let content = b"\\usepackage{platen}";
    let id = store.store(&mut &content[..]).await.unwrap();
    assert_eq!(id, Identifier::digest(content));
    assert!(store.exists(&id).await);

    let mut out = Vec::new();
    store.copy_file(&id, &mut out).await.unwrap();
    assert_eq!(out, content);

    let unknown = Identifier::digest(b"never stored");
    assert!(!store.exists(&unknown).await);
    let mut sink = Vec::new();
    assert!(matches!(
        store.copy_file(&unknown, &mut sink).await,
        Err(RefStoreError::UnknownReference)
    ));
}

#[tokio::test]
async fn every_backend_honours_the_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let dir_store = DirStore::open(dir.path(), RetentionPolicy::KeepForever)
        .await
        .unwrap();
    roundtrip(&dir_store).await;

    let memory = MemoryStore::new(RetentionPolicy::KeepForever);
    roundtrip(&memory).await;
}

#[tokio::test]
async fn stored_blobs_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"persistent preamble";

    let id = {
        let store = DirStore::open(dir.path(), RetentionPolicy::KeepForever)
            .await
            .unwrap();
        store.store(&mut &content[..]).await.unwrap()
    };

    let store = DirStore::open(dir.path(), RetentionPolicy::KeepForever)
        .await
        .unwrap();
    assert!(store.exists(&id).await);

    let mut out = Vec::new();
    store.copy_file(&id, &mut out).await.unwrap();
    assert_eq!(out, content);
}

#[tokio::test]
async fn reopen_with_access_list_prunes_oldest_blobs() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = DirStore::open(dir.path(), RetentionPolicy::KeepForever)
            .await
            .unwrap();
        for i in 0u8..4 {
            store.store(&mut &[i][..]).await.unwrap();
            // distinct mtimes so the prime order is well-defined
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    let policy = RetentionPolicy::AccessList(AccessList::new(2, 0).unwrap());
    let store = DirStore::open(dir.path(), policy).await.unwrap();

    // the two oldest blobs were evicted and deleted on open
    assert!(!store.exists(&Identifier::digest(&[0])).await);
    assert!(!store.exists(&Identifier::digest(&[1])).await);
    assert!(store.exists(&Identifier::digest(&[2])).await);
    assert!(store.exists(&Identifier::digest(&[3])).await);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn dsn_constructed_store_works_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("dir://{}", dir.path().display());

    let store: Arc<dyn ReferenceStore> = from_dsn(&dsn, RetentionPolicy::KeepForever)
        .await
        .unwrap();
    roundtrip(store.as_ref()).await;
}
