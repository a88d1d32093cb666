//! The latest-pointer and backup chain (§4.8): which backup is current for
//! a subvolume, the root-to-leaf sequence of backups it is built from, and
//! garbage collection of anything the chain no longer reaches.

use crate::error::Error;
use crate::metadata::{self, Metadata};
use crate::object_store::{ObjectStoreBackend, Query};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

fn latest_object_name(subvolume: &str) -> String {
    format!("latest-{}", subvolume.trim_matches('/').replace('/', "_"))
}

/// Atomically (last-writer-wins, §5) replaces the `(folder, subvolume)`
/// latest pointer with `uuid`. Called by the upload orchestrator once a
/// backup's metadata record has been durably written.
pub async fn set_latest(
    store: &Arc<dyn ObjectStoreBackend>,
    folder: &str,
    subvolume: &str,
    uuid: Uuid,
) -> Result<(), Error> {
    let tags = metadata::latest_tags(uuid, subvolume);
    store
        .create(folder, &latest_object_name(subvolume), tags, uuid.to_string().as_bytes())
        .await?;
    debug!(subvolume, %uuid, "chain: updated latest pointer");
    Ok(())
}

/// The `uuid` of the current latest backup for `(folder, subvolume)`, or
/// `None` if no backup has ever completed for it.
pub async fn find_latest(
    store: &Arc<dyn ObjectStoreBackend>,
    folder: &str,
    subvolume: &str,
) -> Result<Option<Uuid>, Error> {
    let query = Query::new()
        .with(metadata::TAG_TYPE, metadata::TYPE_LATEST)
        .with(metadata::TAG_SUBVOLUME, subvolume);
    let matches = store.list(folder, &query).await?;
    let Some(object) = matches.into_iter().next() else {
        return Ok(None);
    };
    let body = store.get(&object.id).await?;
    let uuid_str = String::from_utf8_lossy(&body);
    Uuid::parse_str(uuid_str.trim())
        .map(Some)
        .map_err(|e| Error::InvalidSnapshot(format!("latest pointer is not a uuid: {e}")))
}

/// Walks `parent` links backwards from `uuid`, returning the chain in
/// root-to-leaf order (§4.8). Each step fetches the backup's metadata
/// record via `crate::downloader::fetch_metadata`.
pub async fn build_chain(
    store: &Arc<dyn ObjectStoreBackend>,
    folder: &str,
    uuid: Uuid,
    retry: crate::chunk::RetryPolicy,
) -> Result<Vec<Metadata>, Error> {
    let mut chain = Vec::new();
    let mut current = Some(uuid);
    while let Some(id) = current {
        let record = crate::downloader::fetch_metadata(store, folder, id, retry).await?;
        current = record.parent_uuid();
        chain.push(record);
    }
    chain.reverse();
    Ok(chain)
}

/// Deletes every object under `folder` whose `uuid` tag is not reachable
/// from the current latest pointer for `subvolume`. Objects without a
/// `uuid` tag (the latest pointer itself, or anything else) are left
/// untouched — the garbage collector only ever removes what it can prove
/// is unreachable (§4.8, §8 "GC safety").
pub async fn cleanup(
    store: &Arc<dyn ObjectStoreBackend>,
    folder: &str,
    subvolume: &str,
    retry: crate::chunk::RetryPolicy,
) -> Result<usize, Error> {
    let reachable: std::collections::HashSet<Uuid> = match find_latest(store, folder, subvolume).await? {
        Some(latest) => build_chain(store, folder, latest, retry)
            .await?
            .into_iter()
            .map(|m| m.uuid)
            .collect(),
        None => std::collections::HashSet::new(),
    };

    let all = store.list(folder, &Query::new()).await?;
    let mut deleted = 0usize;
    for object in all {
        if object.tags.get(metadata::TAG_TYPE).map(String::as_str) == Some(metadata::TYPE_LATEST) {
            continue;
        }
        let Some(uuid_str) = object.tags.get(metadata::TAG_UUID) else {
            continue;
        };
        let Ok(uuid) = Uuid::parse_str(uuid_str) else {
            continue;
        };
        if reachable.contains(&uuid) {
            continue;
        }
        store.delete(&object.id).await?;
        deleted += 1;
    }

    info!(subvolume, deleted, "chain: cleanup reclaimed orphaned objects");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::RetryPolicy;
    use crate::object_store::LocalFsBackend;
    use crate::uploader::upload;

    async fn store() -> (Arc<dyn ObjectStoreBackend>, String, tempfile::TempDir) {
        let store_dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStoreBackend> = Arc::new(LocalFsBackend::new(store_dir.path()));
        let folder = store.find_or_create_folder("backup").await.unwrap();
        (store, folder, store_dir)
    }

    #[tokio::test]
    async fn build_chain_returns_root_to_leaf_order() {
        let (store, folder, _dir) = store().await;
        let tmp_dir = tempfile::tempdir().unwrap();

        let b1 = upload(
            store.clone(),
            folder.clone(),
            b"root",
            "zfs",
            "tank/data",
            "tank/data@1",
            None,
            crate::crypto::Encryption::None,
            crate::crypto::Authentication::None,
            64,
            tmp_dir.path(),
            None,
            RetryPolicy::fast_test(),
            RetryPolicy::fast_test(),
        )
        .await
        .unwrap();
        set_latest(&store, &folder, "tank/data", b1.uuid).await.unwrap();

        let b2 = upload(
            store.clone(),
            folder.clone(),
            b"leaf",
            "zfs",
            "tank/data",
            "tank/data@2",
            None,
            crate::crypto::Encryption::None,
            crate::crypto::Authentication::None,
            64,
            tmp_dir.path(),
            Some(b1.uuid),
            RetryPolicy::fast_test(),
            RetryPolicy::fast_test(),
        )
        .await
        .unwrap();
        set_latest(&store, &folder, "tank/data", b2.uuid).await.unwrap();

        let latest = find_latest(&store, &folder, "tank/data").await.unwrap().unwrap();
        assert_eq!(latest, b2.uuid);

        let chain = build_chain(&store, &folder, latest, RetryPolicy::fast_test()).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].uuid, b1.uuid);
        assert_eq!(chain[1].uuid, b2.uuid);
        assert_eq!(chain[1].parent, b1.uuid.to_string());
    }

    #[tokio::test]
    async fn cleanup_deletes_orphaned_backup_and_keeps_reachable_chain() {
        let (store, folder, _dir) = store().await;
        let tmp_dir = tempfile::tempdir().unwrap();

        let orphan = upload(
            store.clone(),
            folder.clone(),
            b"abandoned",
            "zfs",
            "tank/data",
            "tank/data@orphan",
            None,
            crate::crypto::Encryption::None,
            crate::crypto::Authentication::None,
            64,
            tmp_dir.path(),
            None,
            RetryPolicy::fast_test(),
            RetryPolicy::fast_test(),
        )
        .await
        .unwrap();

        let kept = upload(
            store.clone(),
            folder.clone(),
            b"kept",
            "zfs",
            "tank/data",
            "tank/data@1",
            None,
            crate::crypto::Encryption::None,
            crate::crypto::Authentication::None,
            64,
            tmp_dir.path(),
            None,
            RetryPolicy::fast_test(),
            RetryPolicy::fast_test(),
        )
        .await
        .unwrap();
        set_latest(&store, &folder, "tank/data", kept.uuid).await.unwrap();

        let deleted = cleanup(&store, &folder, "tank/data", RetryPolicy::fast_test()).await.unwrap();
        assert!(deleted > 0);

        let query = Query::new().with(metadata::TAG_UUID, orphan.uuid.to_string());
        assert!(store.list(&folder, &query).await.unwrap().is_empty());

        let query = Query::new().with(metadata::TAG_UUID, kept.uuid.to_string());
        assert!(!store.list(&folder, &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_latest_is_none_before_any_backup() {
        let (store, folder, _dir) = store().await;
        assert!(find_latest(&store, &folder, "tank/data").await.unwrap().is_none());
    }
}
