use super::{ObjectId, ObjectInfo, Query, Quota};
use crate::error::Error;
use crate::metadata::Tags;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sidecar document describing one stored blob: its tags, size, and the
/// server-computed content hash the reader polls for (§4.1). Written
/// alongside the blob itself under the same folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    name: String,
    tags: Tags,
    size: u64,
    content_hash: String,
    blob_path: String,
}

/// Filesystem-rooted `ObjectStoreBackend`: the default, testable
/// implementation of the pluggable object-store adapter (§4.1, §9).
///
/// Each "folder" is a directory under `root`; each object is a
/// `<name>.blob` file plus a `<name>.tags.json` sidecar written via a
/// write-temp-then-rename so that a reader never observes a partially
/// written object (the atomic-creation contract §4.1 requires).
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFsBackend { root: root.into() }
    }

    fn sanitize(path: &str) -> PathBuf {
        let mut out = PathBuf::new();
        for part in path.split('/') {
            match part {
                "" | "." | ".." => continue,
                other => out.push(other),
            }
        }
        out
    }

    fn sidecar_path(blob_path: &str) -> PathBuf {
        PathBuf::from(format!("{}.tags.json", strip_blob_suffix(blob_path)))
    }
}

fn strip_blob_suffix(blob_path: &str) -> &str {
    blob_path.strip_suffix(".blob").unwrap_or(blob_path)
}

#[async_trait]
impl super::ObjectStoreBackend for LocalFsBackend {
    async fn find_or_create_folder(&self, path: &str) -> Result<String, Error> {
        let dir = self.root.join(Self::sanitize(path));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir.to_string_lossy().into_owned())
    }

    async fn create(
        &self,
        folder: &str,
        name: &str,
        tags: Tags,
        body: &[u8],
    ) -> Result<ObjectId, Error> {
        let blob_path = Path::new(folder).join(format!("{name}.blob"));
        let blob_tmp = Path::new(folder).join(format!("{name}.blob.tmp"));
        tokio::fs::write(&blob_tmp, body).await?;
        tokio::fs::rename(&blob_tmp, &blob_path).await?;

        let content_hash = hex::encode(Sha256::digest(body));
        let blob_path_str = blob_path.to_string_lossy().into_owned();
        let sidecar = Sidecar {
            name: name.to_string(),
            tags,
            size: body.len() as u64,
            content_hash,
            blob_path: blob_path_str.clone(),
        };

        let sidecar_path = Self::sidecar_path(&blob_path_str);
        let sidecar_tmp =
            PathBuf::from(format!("{}.tmp", sidecar_path.to_string_lossy()));
        tokio::fs::write(&sidecar_tmp, serde_json::to_vec(&sidecar)?).await?;
        tokio::fs::rename(&sidecar_tmp, &sidecar_path).await?;

        debug!(object = %blob_path_str, bytes = body.len(), "object_store: created object");
        Ok(blob_path_str)
    }

    async fn list(&self, folder: &str, query: &Query) -> Result<Vec<ObjectInfo>, Error> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !file_name.ends_with(".tags.json") || file_name.ends_with(".tmp") {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            let sidecar: Sidecar = serde_json::from_slice(&bytes)?;
            if query.matches(&sidecar.tags) {
                out.push(ObjectInfo {
                    id: sidecar.blob_path.clone(),
                    name: sidecar.name,
                    tags: sidecar.tags,
                    size: sidecar.size,
                    content_hash: Some(sidecar.content_hash),
                });
            }
        }

        Ok(out)
    }

    async fn content_hash(&self, id: &ObjectId) -> Result<Option<String>, Error> {
        let sidecar_path = Self::sidecar_path(id);
        let bytes = tokio::fs::read(&sidecar_path).await?;
        let sidecar: Sidecar = serde_json::from_slice(&bytes)?;
        Ok(Some(sidecar.content_hash))
    }

    async fn get(&self, id: &ObjectId) -> Result<Vec<u8>, Error> {
        tokio::fs::read(id).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(id.clone())
            } else {
                e.into()
            }
        })
    }

    async fn delete(&self, id: &ObjectId) -> Result<(), Error> {
        let sidecar_path = Self::sidecar_path(id);
        let _ = tokio::fs::remove_file(&sidecar_path).await;
        match tokio::fs::remove_file(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn quota(&self) -> Result<Quota, Error> {
        let used = dir_size(&self.root).await?;
        Ok(Quota { used, limit: None })
    }
}

async fn dir_size(dir: &Path) -> Result<u64, Error> {
    let mut total = 0u64;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::ObjectStoreBackend;

    #[tokio::test]
    async fn create_then_get_roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path());
        let folder = backend.find_or_create_folder("demo").await.unwrap();

        let mut tags = Tags::new();
        tags.insert("type".into(), "data".into());
        let id = backend
            .create(&folder, "chunk0", tags.clone(), b"hello world")
            .await
            .unwrap();

        assert_eq!(backend.get(&id).await.unwrap(), b"hello world");
        assert!(backend.content_hash(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_filters_by_tag_equality() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path());
        let folder = backend.find_or_create_folder("demo").await.unwrap();

        let mut data_tags = Tags::new();
        data_tags.insert("type".into(), "data".into());
        data_tags.insert("uuid".into(), "u1".into());
        backend.create(&folder, "a", data_tags, b"a").await.unwrap();

        let mut latest_tags = Tags::new();
        latest_tags.insert("type".into(), "latest".into());
        backend
            .create(&folder, "b", latest_tags, b"b")
            .await
            .unwrap();

        let query = Query::new().with("type", "data");
        let found = backend.list(&folder, &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");
    }

    #[tokio::test]
    async fn delete_removes_blob_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path());
        let folder = backend.find_or_create_folder("demo").await.unwrap();
        let id = backend
            .create(&folder, "a", Tags::new(), b"data")
            .await
            .unwrap();

        backend.delete(&id).await.unwrap();
        assert!(backend.get(&id).await.is_err());

        let query = Query::new();
        assert_eq!(backend.list(&folder, &query).await.unwrap().len(), 0);
    }
}
