use super::*;
use tempfile::TempDir;

async fn store() -> (TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(FileStoreConfig::new(dir.path().join("data")))
        .await
        .unwrap();
    (dir, store)
}

async fn write_local(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path
}

#[tokio::test]
async fn upload_and_get_roundtrip() {
    let (dir, store) = store().await;
    let local = write_local(&dir, "hello.txt", "hi").await;

    let record = store.upload(&local, "alice", vec![], false).await.unwrap();
    assert_eq!(record.name, "hello.txt");
    assert_eq!(record.size, 2);
    assert_eq!(record.category, FileCategory::Document);
    assert_eq!(record.mime_type, "text/plain");

    let fetched = store.get(&record.id).await.unwrap();
    assert_eq!(fetched.checksum, record.checksum);
}

#[tokio::test]
async fn duplicate_content_shares_one_blob() {
    let (dir, store) = store().await;
    let a = write_local(&dir, "a.txt", "hi").await;
    let b = write_local(&dir, "b.txt", "hi").await;

    let first = store.upload(&a, "alice", vec![], false).await.unwrap();
    let second = store.upload(&b, "bob", vec![], false).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.checksum, second.checksum);

    let blobs = std::fs::read_dir(dir.path().join("data/files"))
        .unwrap()
        .count();
    assert_eq!(blobs, 1);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FileStoreConfig::new(dir.path().join("data"));
    config.max_bytes = 4;
    let store = FileStore::open(config).await.unwrap();

    let local = write_local(&dir, "big.txt", "way past the limit").await;
    let err = store.upload(&local, "alice", vec![], false).await.unwrap_err();
    assert!(matches!(err, Error::SizeExceeded { .. }));
}

#[tokio::test]
async fn disallowed_extension_is_rejected() {
    let (dir, store) = store().await;
    let local = write_local(&dir, "tool.exe", "MZ").await;
    let err = store.upload(&local, "alice", vec![], false).await.unwrap_err();
    assert!(matches!(err, Error::TypeDisallowed(_)));
}

#[tokio::test]
async fn download_checks_rights_and_counts() {
    let (dir, store) = store().await;
    let local = write_local(&dir, "hello.txt", "hi").await;
    let record = store.upload(&local, "alice", vec![], false).await.unwrap();

    let err = store.download(&record.id, "mallory").await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let path = store.download(&record.id, "alice").await.unwrap();
    assert_eq!(tokio::fs::read_to_string(path).await.unwrap(), "hi");
    assert_eq!(store.get(&record.id).await.unwrap().download_count, 1);
}

#[tokio::test]
async fn delete_keeps_shared_blob_until_orphaned() {
    let (dir, store) = store().await;
    let a = write_local(&dir, "a.txt", "hi").await;
    let b = write_local(&dir, "b.txt", "hi").await;
    let first = store.upload(&a, "alice", vec![], false).await.unwrap();
    let second = store.upload(&b, "alice", vec![], false).await.unwrap();
    let blob = dir.path().join("data/files").join(&first.checksum);

    store.delete(&first.id, "alice").await.unwrap();
    assert!(blob.exists());

    store.delete(&second.id, "alice").await.unwrap();
    assert!(!blob.exists());
}

#[tokio::test]
async fn index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = FileStoreConfig::new(dir.path().join("data"));
    let local = write_local(&dir, "hello.txt", "hi").await;

    let id = {
        let store = FileStore::open(config.clone()).await.unwrap();
        store.upload(&local, "alice", vec![], false).await.unwrap().id
    };

    let store = FileStore::open(config).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap().name, "hello.txt");
}

#[tokio::test]
async fn list_applies_filters() {
    let (dir, store) = store().await;
    let doc = write_local(&dir, "a.txt", "doc").await;
    let code = write_local(&dir, "b.rs", "fn main() {}").await;
    store.upload(&doc, "alice", vec![], true).await.unwrap();
    store.upload(&code, "bob", vec![], false).await.unwrap();

    let all = store.list(&FileFilter::default()).await;
    assert_eq!(all.len(), 2);

    let code_only = store
        .list(&FileFilter {
            category: Some(FileCategory::Code),
            ..FileFilter::default()
        })
        .await;
    assert_eq!(code_only.len(), 1);
    assert_eq!(code_only[0].owner_id, "bob");

    let public = store
        .list(&FileFilter {
            public_only: true,
            ..FileFilter::default()
        })
        .await;
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].owner_id, "alice");
}

#[tokio::test]
async fn share_link_carries_expiry() {
    let (dir, store) = store().await;
    let local = write_local(&dir, "hello.txt", "hi").await;
    let record = store.upload(&local, "alice", vec![], false).await.unwrap();

    let link = store
        .share(&record.id, "alice", Duration::from_secs(3600))
        .await
        .unwrap();
    assert!(link.starts_with(&format!("agora://share/{}", record.id)));
    assert!(link.contains("expires="));

    let err = store
        .share(&record.id, "mallory", Duration::from_secs(3600))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
}
