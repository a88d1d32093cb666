//! End-to-end upload orchestration (§4.6): glues a fully buffered snapshot
//! stream to `tee(mac) → lz4_compress → [cipher] → ChunkedWriter` and
//! assembles the resulting metadata record.
//!
//! The snapshot source (`SnapshotBackend::stream_send`) already returns the
//! whole send stream as one buffer, so — unlike a true streaming pipeline —
//! compression and encryption run once over the complete plaintext rather
//! than incrementally. This keeps the upload and download paths symmetric:
//! both buffer the compressed/encrypted payload fully and only stream at
//! the `ChunkedWriter`/`ChunkedReader` boundary (see `downloader` for the
//! matching rationale on the restore side).

use crate::chunk::{ChunkedWriter, RetryPolicy};
use crate::crypto::{self, Authentication, Direction, Encryption};
use crate::error::Error;
use crate::metadata::Metadata;
use crate::object_store::{ObjectStoreBackend, Query};
use chrono::Utc;
use rand::RngCore;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn upload(
    store: Arc<dyn ObjectStoreBackend>,
    folder: String,
    source: &[u8],
    file_type: &str,
    subvolume: &str,
    file_name: &str,
    passphrase: Option<&str>,
    encryption: Encryption,
    authentication: Authentication,
    chunk_size_mib: u64,
    tmp_dir: &Path,
    parent_uuid: Option<Uuid>,
    chunk_retry: RetryPolicy,
    metadata_retry: RetryPolicy,
) -> Result<Metadata, Error> {
    let uuid = Uuid::new_v4();

    let mut iv = [0u8; crypto::IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let (aes_key, hmac_key) = crypto::resolve_keys(passphrase);

    // The MAC observes the plaintext before compression (§4.5, §9 "metadata
    // not under MAC" / "silent-corruption bug").
    let mut mac = crypto::build_mac(authentication, &hmac_key)?;
    mac.update(source);
    let hmac_hex = mac.finalize_hex();

    let mut payload = Vec::new();
    {
        let mut encoder = lz4_flex::frame::FrameEncoder::new(&mut payload);
        encoder.write_all(source)?;
        encoder
            .finish()
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    }

    let mut cipher = crypto::build_cipher(encryption, &aes_key, &iv, Direction::Encrypt)?;
    cipher.apply(&mut payload);

    let mut writer =
        ChunkedWriter::new(store.clone(), folder.clone(), uuid, chunk_size_mib, tmp_dir, chunk_retry).await?;
    writer.write(&payload).await?;
    let (total_size, chunks) = writer.close().await?;

    let metadata = Metadata {
        uuid,
        file_name: file_name.to_string(),
        encryption: encryption.as_str().to_string(),
        authentication: authentication.as_str().to_string(),
        hmac: hmac_hex,
        iv: hex::encode(iv),
        total_size_in: source.len() as u64,
        total_size,
        chunks,
        file_type: file_type.to_string(),
        subvolume: subvolume.to_string(),
        date: Utc::now().timestamp(),
        parent: parent_uuid.map(|u| u.to_string()).unwrap_or_default(),
    };

    upload_metadata(&store, &folder, &metadata, metadata_retry).await?;
    info!(uuid = %uuid, chunks, total_size, "uploaded backup");
    Ok(metadata)
}

async fn upload_metadata(
    store: &Arc<dyn ObjectStoreBackend>,
    folder: &str,
    metadata: &Metadata,
    retry: RetryPolicy,
) -> Result<(), Error> {
    let body = serde_json::to_vec(metadata)?;
    let name = metadata.uuid.to_string();
    let tags = metadata.object_tags();
    crate::chunk::retry(retry, || {
        let body = body.clone();
        let tags = tags.clone();
        async move {
            store.create(folder, &name, tags, &body).await?;
            Ok(())
        }
    })
    .await
}
