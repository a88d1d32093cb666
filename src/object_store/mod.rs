//! The object-store adapter boundary (§4.1, §6).
//!
//! `ObjectStoreBackend` is the narrow capability interface the core
//! consumes; concrete backends (Drive, S3, a local filesystem root) are
//! tagged variants behind it, never subclasses (§9 "Polymorphism").

mod local_fs;

pub use local_fs::LocalFsBackend;

use crate::error::Error;
use crate::metadata::Tags;
use async_trait::async_trait;
use std::fmt::Debug;

/// Opaque, backend-assigned identifier for a created object.
pub type ObjectId = String;

#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub used: u64,
    pub limit: Option<u64>,
}

/// A tag-equality query (`tag[k] == v` for every pair), as used by
/// `ChunkedReader::new` (filter on `uuid`+`type=data`) and by the chain
/// manager's garbage collector (filter on everything under a folder).
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub tags: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.tags
            .iter()
            .all(|(k, v)| tags.get(k).map(|actual| actual == v).unwrap_or(false))
    }
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub name: String,
    pub tags: Tags,
    pub size: u64,
    /// Server-computed content hash; `None` until the backend has finished
    /// computing it (§4.1 — the reader polls until non-empty).
    pub content_hash: Option<String>,
}

/// Create/list/fetch/delete opaque named blobs with attached tags (§4.1).
///
/// Implementations must make the full tag set visible on the object's
/// first successful `list` after `create` returns (atomic creation).
#[async_trait]
pub trait ObjectStoreBackend: Send + Sync + Debug {
    /// Resolve (creating if necessary) the folder a backup's objects live
    /// under, returning an opaque handle the caller threads through the
    /// rest of its calls. Resolved once by the orchestrator and injected
    /// into snapshot managers, breaking the cyclic dependency noted in §9.
    async fn find_or_create_folder(&self, path: &str) -> Result<String, Error>;

    async fn create(
        &self,
        folder: &str,
        name: &str,
        tags: Tags,
        body: &[u8],
    ) -> Result<ObjectId, Error>;

    async fn list(&self, folder: &str, query: &Query) -> Result<Vec<ObjectInfo>, Error>;

    /// Poll-once accessor for the server-computed content hash of an
    /// object; `None` means "not yet available" (§4.1).
    async fn content_hash(&self, id: &ObjectId) -> Result<Option<String>, Error>;

    async fn get(&self, id: &ObjectId) -> Result<Vec<u8>, Error>;

    async fn delete(&self, id: &ObjectId) -> Result<(), Error>;

    async fn quota(&self) -> Result<Quota, Error>;
}
