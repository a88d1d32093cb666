use super::{retry, RetryPolicy};
use crate::error::Error;
use crate::metadata;
use crate::object_store::{ObjectInfo, ObjectStoreBackend, Query};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

/// Reassembles a backup's data objects into one continuous read stream
/// (§4.4). Construction lists and indexes every `type=data` object tagged
/// with `uuid`, verifying the chunk set is dense before any byte is read.
pub struct ChunkedReader {
    store: Arc<dyn ObjectStoreBackend>,
    uuid: Uuid,
    retry: RetryPolicy,
    index: BTreeMap<u64, ObjectInfo>,
    chunk_count: u64,
    scratch_path: PathBuf,
    scratch: tokio::fs::File,
    cur: u64,
    pos: u64,
    cur_size: u64,
    eof: bool,
    closed: bool,
}

impl ChunkedReader {
    pub async fn new(
        store: Arc<dyn ObjectStoreBackend>,
        folder: String,
        uuid: Uuid,
        tmp_dir: &Path,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let query = Query::new()
            .with(metadata::TAG_UUID, uuid.to_string())
            .with(metadata::TAG_TYPE, metadata::TYPE_DATA);
        let objects = store.list(&folder, &query).await?;

        let mut index = BTreeMap::new();
        for object in objects {
            let chunk_str = object
                .tags
                .get(metadata::TAG_CHUNK)
                .ok_or_else(|| Error::ChunksMissing { uuid, expected: 0, found: 0 })?;
            let chunk_index: u64 = chunk_str
                .parse()
                .map_err(|_| Error::ChunksMissing { uuid, expected: 0, found: 0 })?;
            index.insert(chunk_index, object);
        }

        let chunk_count = index.len() as u64;
        if chunk_count == 0 {
            return Err(Error::ChunksMissing { uuid, expected: 1, found: 0 });
        }
        for i in 0..chunk_count {
            if !index.contains_key(&i) {
                return Err(Error::ChunksMissing {
                    uuid,
                    expected: chunk_count,
                    found: index.len() as u64,
                });
            }
        }

        let scratch_path = tmp_dir.join(format!("ozb-{uuid}.read"));
        let scratch = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&scratch_path)
            .await?;

        let mut reader = ChunkedReader {
            store,
            uuid,
            retry,
            index,
            chunk_count,
            scratch_path,
            scratch,
            cur: 0,
            pos: 0,
            cur_size: 0,
            eof: false,
            closed: false,
        };
        reader.fetch_chunk(0).await?;
        Ok(reader)
    }

    async fn fetch_chunk(&mut self, chunk_index: u64) -> Result<(), Error> {
        let info = self.index.get(&chunk_index).cloned().ok_or(Error::ChunksMissing {
            uuid: self.uuid,
            expected: self.chunk_count,
            found: self.index.len() as u64,
        })?;

        let store = Arc::clone(&self.store);
        let id = info.id.clone();
        let expected_hash = info.content_hash.clone();
        let bytes = retry(self.retry, || {
            let store = Arc::clone(&store);
            let id = id.clone();
            let expected_hash = expected_hash.clone();
            async move {
                let bytes = store.get(&id).await?;
                if let Some(expected) = expected_hash {
                    let actual = hex::encode(Sha256::digest(&bytes));
                    if actual != expected {
                        return Err(Error::ContentHashMismatch {
                            object: id.clone(),
                            expected,
                            actual,
                        });
                    }
                }
                Ok(bytes)
            }
        })
        .await?;

        self.scratch.set_len(0).await?;
        self.scratch.seek(std::io::SeekFrom::Start(0)).await?;
        self.scratch.write_all(&bytes).await?;
        self.scratch.flush().await?;
        self.scratch.seek(std::io::SeekFrom::Start(0)).await?;

        self.cur = chunk_index;
        self.cur_size = bytes.len() as u64;
        self.pos = 0;
        Ok(())
    }

    /// Reads into `buf`, returning the number of bytes read (0 at EOF),
    /// transparently crossing chunk boundaries (§4.4).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.closed {
            return Err(Error::ReaderClosed);
        }
        if self.eof || buf.is_empty() {
            return Ok(0);
        }

        let remaining_in_chunk = self.cur_size - self.pos;
        let requested = buf.len() as u64;

        if requested <= remaining_in_chunk {
            let n = self.scratch.read(&mut buf[..requested as usize]).await?;
            self.pos += n as u64;
            return Ok(n);
        }

        let mut written = 0usize;
        if remaining_in_chunk > 0 {
            let n = self.scratch.read(&mut buf[..remaining_in_chunk as usize]).await?;
            self.pos += n as u64;
            written += n;
        }

        if self.cur + 1 >= self.chunk_count {
            self.eof = true;
            return Ok(written);
        }

        self.fetch_chunk(self.cur + 1).await?;
        let outstanding = ((buf.len() - written) as u64).min(self.cur_size) as usize;
        if outstanding > 0 {
            let n = self.scratch.read(&mut buf[written..written + outstanding]).await?;
            self.pos += n as u64;
            written += n;
        }
        Ok(written)
    }

    /// Reads the whole remaining stream into `out`. Used by the downloader
    /// to buffer the full ciphertext before running the synchronous
    /// decompress/decrypt pass — see the downloader's module doc comment
    /// for why.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, Error> {
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0usize;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
        Ok(total)
    }

    pub async fn close(mut self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::ReaderClosed);
        }
        self.closed = true;
        let _ = tokio::fs::remove_file(&self.scratch_path).await;
        Ok(())
    }
}

impl Drop for ChunkedReader {
    fn drop(&mut self) {
        if !self.closed {
            let _ = std::fs::remove_file(&self.scratch_path);
        }
    }
}
