use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const TAG_UUID: &str = "uuid";
pub const TAG_CHUNK: &str = "chunk";
pub const TAG_TYPE: &str = "type";
pub const TAG_SUBVOLUME: &str = "subvolume";

pub const TYPE_DATA: &str = "data";
pub const TYPE_METADATA: &str = "metadata";
pub const TYPE_LATEST: &str = "latest";

pub type Tags = HashMap<String, String>;

/// The structured record persisted once per backup (§3).
///
/// Serialized with `serde_json` and uploaded as the `type="metadata"`
/// object. The document itself is not covered by `hmac` — only the
/// plaintext stream is (§9, "Metadata not under MAC").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub uuid: Uuid,
    pub file_name: String,
    pub encryption: String,
    pub authentication: String,
    /// Hex-encoded MAC over the plaintext; empty when `authentication == "none"`.
    pub hmac: String,
    /// Hex-encoded cipher IV; empty when `encryption == "none"`.
    pub iv: String,
    pub total_size_in: u64,
    pub total_size: u64,
    pub chunks: u64,
    pub file_type: String,
    pub subvolume: String,
    pub date: i64,
    /// `uuid` of the parent backup, or empty for a full backup.
    pub parent: String,
}

impl Metadata {
    pub fn parent_uuid(&self) -> Option<Uuid> {
        if self.parent.is_empty() {
            None
        } else {
            Uuid::parse_str(&self.parent).ok()
        }
    }

    pub fn is_full_backup(&self) -> bool {
        self.parent.is_empty()
    }

    /// Tags attached to the metadata object itself.
    pub fn object_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert(TAG_TYPE.to_string(), TYPE_METADATA.to_string());
        tags.insert(TAG_UUID.to_string(), self.uuid.to_string());
        tags.insert(TAG_SUBVOLUME.to_string(), self.subvolume.clone());
        tags
    }
}

/// Tags attached to a data chunk object (§3).
pub fn chunk_tags(uuid: Uuid, chunk_index: u64) -> Tags {
    let mut tags = Tags::new();
    tags.insert(TAG_UUID.to_string(), uuid.to_string());
    tags.insert(TAG_CHUNK.to_string(), chunk_index.to_string());
    tags.insert(TAG_TYPE.to_string(), TYPE_DATA.to_string());
    tags
}

/// Tags attached to the `(folder, subvolume)` latest pointer (§3).
pub fn latest_tags(uuid: Uuid, subvolume: &str) -> Tags {
    let mut tags = Tags::new();
    tags.insert(TAG_TYPE.to_string(), TYPE_LATEST.to_string());
    tags.insert(TAG_UUID.to_string(), uuid.to_string());
    tags.insert(TAG_SUBVOLUME.to_string(), subvolume.to_string());
    tags
}

pub fn chunk_object_name(uuid: Uuid, chunk_index: u64) -> String {
    format!("{}|{}", uuid, chunk_index)
}
