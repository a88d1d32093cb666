use ozb::chunk::RetryPolicy;
use ozb::crypto::{Authentication, Encryption};
use ozb::downloader::download;
use ozb::metadata::{TAG_TYPE, TAG_UUID, TYPE_DATA};
use ozb::object_store::{LocalFsBackend, ObjectStoreBackend, Query};
use ozb::uploader::upload;
use std::sync::Arc;

/// §8 scenario 1: a multi-chunk upload round-trips byte-exactly under a
/// real cipher and MAC, and the chunk set matches `metadata.total_size`.
#[tokio::test]
async fn ten_megabytes_round_trips_across_three_chunks() {
    let store_dir = tempfile::tempdir().unwrap();
    let tmp_dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStoreBackend> = Arc::new(LocalFsBackend::new(store_dir.path()));
    let folder = store.find_or_create_folder("backup").await.unwrap();

    let mut data = vec![0u8; 10 * 1024 * 1024];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }

    let metadata = upload(
        store.clone(),
        folder.clone(),
        &data,
        "zfs",
        "tank/data",
        "tank/data@1",
        Some("a fresh passphrase"),
        Encryption::AesCtr,
        Authentication::HmacSha256,
        4,
        tmp_dir.path(),
        None,
        RetryPolicy::fast_test(),
        RetryPolicy::fast_test(),
    )
    .await
    .unwrap();

    assert_eq!(metadata.total_size_in, data.len() as u64);
    assert_eq!(metadata.chunks, 3);

    let query = Query::new().with(TAG_UUID, metadata.uuid.to_string()).with(TAG_TYPE, TYPE_DATA);
    let chunks = store.list(&folder, &query).await.unwrap();
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert!(chunk.size <= 4 * 1024 * 1024);
    }
    let total: u64 = chunks.iter().map(|c| c.size).sum();
    assert_eq!(total, metadata.total_size);

    let (_, restored) = download(
        store,
        folder,
        metadata.uuid,
        Some("a fresh passphrase"),
        tmp_dir.path(),
        RetryPolicy::fast_test(),
    )
    .await
    .unwrap();

    assert_eq!(restored, data);
}
