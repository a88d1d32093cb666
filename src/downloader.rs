//! End-to-end restore orchestration (§4.7): fetches the metadata record,
//! reassembles the chunk stream, and runs the reverse pipeline
//! `ChunkedReader → [cipher] → lz4_decompress → tee(mac)`.
//!
//! `lz4_flex::frame::FrameDecoder` is a synchronous, pull-based `Read`
//! adapter, while chunk fetching is async — composing them as a true
//! streaming chain would need a `block_on` nested inside an async task, a
//! known deadlock hazard. Instead the full ciphertext is buffered via
//! `ChunkedReader::read_to_end` (itself driven by the per-call algorithm
//! in §4.4, so it stays unit-testable one read at a time) and the
//! decrypt/decompress/MAC pass runs once, synchronously, over the
//! in-memory buffer. `ChunkedReader::read` is still exercised directly in
//! its own tests; this is a property of how the downloader composes it.

use crate::chunk::{ChunkedReader, RetryPolicy};
use crate::crypto::{self, Authentication, Direction, Encryption};
use crate::error::Error;
use crate::metadata::{self, Metadata};
use crate::object_store::{ObjectStoreBackend, Query};
use std::io::Read as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub async fn download(
    store: Arc<dyn ObjectStoreBackend>,
    folder: String,
    uuid: Uuid,
    passphrase: Option<&str>,
    tmp_dir: &Path,
    retry: RetryPolicy,
) -> Result<(Metadata, Vec<u8>), Error> {
    let record = fetch_metadata(&store, &folder, uuid, retry).await?;
    if record.total_size_in == 0 {
        return Err(Error::NoData(uuid));
    }

    let encryption = Encryption::parse(&record.encryption)?;
    let authentication = Authentication::parse(&record.authentication)?;
    let iv = parse_iv(&record.iv)?;
    let (aes_key, hmac_key) = crypto::resolve_keys(passphrase);

    let mut reader = ChunkedReader::new(store, folder, uuid, tmp_dir, retry).await?;
    let mut payload = Vec::with_capacity(record.total_size as usize);
    reader.read_to_end(&mut payload).await?;
    reader.close().await?;

    let mut cipher = crypto::build_cipher(encryption, &aes_key, &iv, Direction::Decrypt)?;
    cipher.apply(&mut payload);

    let mut plaintext = Vec::with_capacity(record.total_size_in as usize);
    lz4_flex::frame::FrameDecoder::new(std::io::Cursor::new(payload)).read_to_end(&mut plaintext)?;

    // The MAC tee sits after decompression (§4.7) — it must match the
    // upload-side tee, which observes plaintext before compression.
    let mut mac = crypto::build_mac(authentication, &hmac_key)?;
    mac.update(&plaintext);
    if mac.finalize_hex() != record.hmac {
        return Err(Error::HmacMismatch);
    }

    info!(uuid = %uuid, bytes = plaintext.len(), "restored backup");
    Ok((record, plaintext))
}

pub async fn fetch_metadata(
    store: &Arc<dyn ObjectStoreBackend>,
    folder: &str,
    uuid: Uuid,
    retry: RetryPolicy,
) -> Result<Metadata, Error> {
    let query = Query::new()
        .with(metadata::TAG_UUID, uuid.to_string())
        .with(metadata::TAG_TYPE, metadata::TYPE_METADATA);

    crate::chunk::retry(retry, || {
        let store = store.clone();
        let folder = folder.to_string();
        let query = query.clone();
        async move {
            let matches = store.list(&folder, &query).await?;
            let object = matches
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound(format!("metadata record for {uuid}")))?;
            let body = store.get(&object.id).await?;
            serde_json::from_slice(&body).map_err(Error::from)
        }
    })
    .await
}

fn parse_iv(hex_iv: &str) -> Result<[u8; crypto::IV_LEN], Error> {
    if hex_iv.is_empty() {
        return Ok([0u8; crypto::IV_LEN]);
    }
    let bytes = hex::decode(hex_iv).map_err(|e| Error::InvalidSnapshot(format!("bad iv: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidSnapshot("iv is not 16 bytes".to_string()))
}
