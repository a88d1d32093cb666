use super::{require_snapshot_separator, snapshot_name, SnapshotBackend};
use crate::error::Error;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

/// Sinks restore output to nowhere and never touches a real filesystem —
/// used for dry-run restores and round-trip tests that only care about
/// the byte stream, not an actual `btrfs`/`zfs` volume (§4.2).
#[derive(Debug, Default)]
pub struct DiscardBackend;

impl DiscardBackend {
    pub fn new() -> Self {
        DiscardBackend
    }
}

#[async_trait]
impl SnapshotBackend for DiscardBackend {
    fn file_type(&self) -> &'static str {
        "discard"
    }

    async fn list_local(&self, _subvolume: &str) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }

    async fn create(&self, subvolume: &str) -> Result<String, Error> {
        Ok(snapshot_name(subvolume, Utc::now().timestamp()))
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        require_snapshot_separator(name)?;
        Ok(())
    }

    async fn stream_send(&self, name: &str, _parent: Option<&str>) -> Result<Vec<u8>, Error> {
        info!(%name, "discard: stream_send produces no bytes");
        Ok(Vec::new())
    }

    async fn stream_receive(&self, target: &str, data: &[u8]) -> Result<(), Error> {
        info!(%target, bytes = data.len(), "discard: dropping restored stream");
        Ok(())
    }

    async fn cleanup(&self, _subvolume: &str, _keep: &str) -> Result<(), Error> {
        Ok(())
    }
}
