use super::{retry, RetryPolicy};
use crate::error::Error;
use crate::metadata;
use crate::object_store::ObjectStoreBackend;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Presents a continuous append-only stream as a sequence of `chunk_size`
/// objects, uploaded as they fill (§4.3). The current chunk's bytes are
/// staged in a scratch file under `tmp_dir` so that the writer never holds
/// more than one chunk's worth of memory.
pub struct ChunkedWriter {
    store: Arc<dyn ObjectStoreBackend>,
    folder: String,
    uuid: Uuid,
    chunk_size: u64,
    retry: RetryPolicy,
    poll_delay: std::time::Duration,
    stage_path: PathBuf,
    stage: tokio::fs::File,
    staged: u64,
    rolling_hash: Sha256,
    chunk_index: u64,
    total_bytes: u64,
    closed: bool,
}

impl ChunkedWriter {
    pub async fn new(
        store: Arc<dyn ObjectStoreBackend>,
        folder: String,
        uuid: Uuid,
        chunk_size_mib: u64,
        tmp_dir: &Path,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let chunk_size = chunk_size_mib.max(1) * 1024 * 1024;
        let stage_path = tmp_dir.join(format!("ozb-{uuid}.stage"));
        let stage = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&stage_path)
            .await?;

        Ok(ChunkedWriter {
            store,
            folder,
            uuid,
            chunk_size,
            retry,
            poll_delay: std::time::Duration::from_secs(5),
            stage_path,
            stage,
            staged: 0,
            rolling_hash: Sha256::new(),
            chunk_index: 0,
            total_bytes: 0,
            closed: false,
        })
    }

    #[cfg(test)]
    pub fn with_poll_delay(mut self, delay: std::time::Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Test-only constructor taking an exact byte chunk size rather than
    /// MiB, so splitting behavior can be exercised without megabyte-scale
    /// fixtures.
    #[cfg(test)]
    pub async fn new_with_byte_chunk_size(
        store: Arc<dyn ObjectStoreBackend>,
        folder: String,
        uuid: Uuid,
        chunk_size: u64,
        tmp_dir: &Path,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let stage_path = tmp_dir.join(format!("ozb-{uuid}.stage"));
        let stage = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&stage_path)
            .await?;
        Ok(ChunkedWriter {
            store,
            folder,
            uuid,
            chunk_size: chunk_size.max(1),
            retry,
            poll_delay: std::time::Duration::from_secs(5),
            stage_path,
            stage,
            staged: 0,
            rolling_hash: Sha256::new(),
            chunk_index: 0,
            total_bytes: 0,
            closed: false,
        })
    }

    pub async fn write(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::WriterClosed);
        }
        while (buf.len() as u64) + self.staged > self.chunk_size {
            let take = (self.chunk_size - self.staged) as usize;
            let (head, tail) = buf.split_at(take);
            self.append_to_stage(head).await?;
            self.emit_chunk().await?;
            buf = tail;
        }
        self.append_to_stage(buf).await?;
        Ok(())
    }

    async fn append_to_stage(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        self.stage.write_all(data).await?;
        self.rolling_hash.update(data);
        self.staged += data.len() as u64;
        self.total_bytes += data.len() as u64;
        Ok(())
    }

    async fn emit_chunk(&mut self) -> Result<(), Error> {
        self.stage.flush().await?;
        self.stage.seek(std::io::SeekFrom::Start(0)).await?;
        let mut body = Vec::with_capacity(self.staged as usize);
        self.stage.read_to_end(&mut body).await?;

        let expected_hash =
            hex::encode(std::mem::replace(&mut self.rolling_hash, Sha256::new()).finalize());
        let name = metadata::chunk_object_name(self.uuid, self.chunk_index);
        let tags = metadata::chunk_tags(self.uuid, self.chunk_index);
        let index = self.chunk_index;
        let staged = self.staged;

        let store = Arc::clone(&self.store);
        let folder = self.folder.clone();
        let poll_delay = self.poll_delay;

        retry(self.retry, || {
            let store = Arc::clone(&store);
            let folder = folder.clone();
            let name = name.clone();
            let tags = tags.clone();
            let body = body.clone();
            let expected_hash = expected_hash.clone();
            async move {
                let id = store.create(&folder, &name, tags, &body).await?;
                let actual = poll_content_hash(store.as_ref(), &id, poll_delay).await?;
                if actual != expected_hash {
                    let _ = store.delete(&id).await;
                    return Err(Error::ContentHashMismatch {
                        object: name.clone(),
                        expected: expected_hash.clone(),
                        actual,
                    });
                }
                Ok(())
            }
        })
        .await?;

        debug!(uuid = %self.uuid, chunk = index, bytes = staged, "chunk uploaded");

        self.chunk_index += 1;
        self.staged = 0;
        self.stage.set_len(0).await?;
        self.stage.seek(std::io::SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Flushes the tail chunk (possibly empty — a zero-byte input still
    /// produces exactly one chunk, per §4.3 and the §9 ambiguity
    /// resolution) and returns `(total_bytes, chunk_count)`.
    pub async fn close(mut self) -> Result<(u64, u64), Error> {
        if self.closed {
            return Err(Error::WriterClosed);
        }
        if self.staged > 0 || self.chunk_index == 0 {
            self.emit_chunk().await?;
        }
        self.closed = true;
        let _ = tokio::fs::remove_file(&self.stage_path).await;
        Ok((self.total_bytes, self.chunk_index))
    }
}

impl Drop for ChunkedWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = std::fs::remove_file(&self.stage_path);
        }
    }
}

async fn poll_content_hash(
    store: &dyn ObjectStoreBackend,
    id: &str,
    delay: std::time::Duration,
) -> Result<String, Error> {
    loop {
        if let Some(hash) = store.content_hash(&id.to_string()).await? {
            return Ok(hash);
        }
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{LocalFsBackend, Query};

    #[tokio::test]
    async fn close_on_empty_input_still_produces_one_chunk() {
        let store_dir = tempfile::tempdir().unwrap();
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalFsBackend::new(store_dir.path()));
        let folder = store.find_or_create_folder("backup").await.unwrap();
        let uuid = Uuid::new_v4();

        let writer = ChunkedWriter::new(
            store.clone(),
            folder.clone(),
            uuid,
            1,
            tmp_dir.path(),
            RetryPolicy::fast_test(),
        )
        .await
        .unwrap();

        let (total_bytes, chunks) = writer.close().await.unwrap();
        assert_eq!(total_bytes, 0);
        assert_eq!(chunks, 1);

        let query = Query::new().with("uuid", uuid.to_string());
        let objects = store.list(&folder, &query).await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].size, 0);
    }

    #[tokio::test]
    async fn write_spanning_multiple_chunks_splits_at_chunk_size() {
        let store_dir = tempfile::tempdir().unwrap();
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalFsBackend::new(store_dir.path()));
        let folder = store.find_or_create_folder("backup").await.unwrap();
        let uuid = Uuid::new_v4();

        let mut writer = ChunkedWriter::new_with_byte_chunk_size(
            store.clone(),
            folder.clone(),
            uuid,
            4,
            tmp_dir.path(),
            RetryPolicy::fast_test(),
        )
        .await
        .unwrap();

        writer.write(b"hello world").await.unwrap(); // 11 bytes / 4-byte chunks -> 3 chunks
        let (total_bytes, chunks) = writer.close().await.unwrap();
        assert_eq!(total_bytes, 11);
        assert_eq!(chunks, 3);

        let query = Query::new().with("uuid", uuid.to_string());
        let mut objects = store.list(&folder, &query).await.unwrap();
        objects.sort_by_key(|o| o.tags.get("chunk").cloned());
        assert_eq!(objects.len(), 3);
        let sizes: Vec<u64> = objects.iter().map(|o| o.size).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
    }
}
