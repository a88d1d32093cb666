//! The local volume-manager integration (§4.2, §9 "Polymorphism"):
//! enumerate, create, delete, and stream snapshots of a copy-on-write
//! subvolume. Concrete backends are tagged variants behind one trait,
//! never subclasses.

pub mod btrfs;
pub mod discard;
pub mod zfs;

pub use btrfs::BtrfsBackend;
pub use discard::DiscardBackend;
pub use zfs::ZfsBackend;

use crate::error::Error;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

#[async_trait]
pub trait SnapshotBackend: Send + Sync + Debug {
    /// The `file_type` tag recorded in the metadata record (§3): `btrfs`,
    /// `zfs`, or `discard`.
    fn file_type(&self) -> &'static str;

    async fn list_local(&self, subvolume: &str) -> Result<Vec<String>, Error>;

    /// Takes a fresh snapshot of `subvolume`, returning its name
    /// (`subvolume@unix_ts`). Surfaces failures as an error rather than
    /// panicking — the richer of the two contracts the source carries
    /// (§4.9, §9).
    async fn create(&self, subvolume: &str) -> Result<String, Error>;

    /// Rejects names lacking the `@` separator with `InvalidSnapshot`.
    async fn delete(&self, name: &str) -> Result<(), Error>;

    /// Produces the snapshot's send stream, incremental against `parent`
    /// when given.
    async fn stream_send(&self, name: &str, parent: Option<&str>) -> Result<Vec<u8>, Error>;

    /// Applies a previously captured send stream against `target`.
    async fn stream_receive(&self, target: &str, data: &[u8]) -> Result<(), Error>;

    /// Deletes every local snapshot of `subvolume` except `keep` — never
    /// the snapshot named by `keep`, so a later incremental backup always
    /// has a base to diff against.
    async fn cleanup(&self, subvolume: &str, keep: &str) -> Result<(), Error>;
}

/// Select a concrete backend by name (`btrfs`, `zfs`, `discard`) once at
/// startup (§4.9).
pub fn resolve(name: &str) -> Result<Arc<dyn SnapshotBackend>, Error> {
    match name {
        "btrfs" => Ok(Arc::new(BtrfsBackend::new())),
        "zfs" => Ok(Arc::new(ZfsBackend::new())),
        "discard" => Ok(Arc::new(DiscardBackend::new())),
        other => Err(Error::Config(format!("unknown snapshot backend: {other}"))),
    }
}

/// `subvolume@unix_ts`, the naming scheme every backend uses (§4.2, Glossary).
pub(crate) fn snapshot_name(subvolume: &str, unix_ts: i64) -> String {
    format!("{subvolume}@{unix_ts}")
}

pub(crate) fn require_snapshot_separator(name: &str) -> Result<(), Error> {
    if name.contains('@') {
        Ok(())
    } else {
        Err(Error::InvalidSnapshot(name.to_string()))
    }
}
