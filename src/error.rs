use thiserror::Error;
use uuid::Uuid;

/// The error taxonomy shared by every subsystem.
///
/// Kinds, not types: retry/backoff logic inspects the variant to decide
/// whether a failure is transient or fatal, so new variants should map to
/// one of the rows in the design doc's error table rather than being added
/// ad hoc per call site.
#[derive(Error, Debug)]
pub enum Error {
    #[error("transient transport error: {0}")]
    TransientTransport(String),

    #[error("content hash mismatch for object {object}: expected {expected}, got {actual}")]
    ContentHashMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    #[error("HMAC mismatch: restored data does not authenticate against the stored metadata")]
    HmacMismatch,

    #[error("chunk set for {uuid} is incomplete: expected {expected} contiguous chunks, found {found}")]
    ChunksMissing {
        uuid: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("backup {0} has no data (total_size_in == 0)")]
    NoData(Uuid),

    #[error("'{0}' is not a valid snapshot name (missing '@' separator)")]
    InvalidSnapshot(String),

    #[error("operation attempted on a closed reader")]
    ReaderClosed,

    #[error("operation attempted on a closed writer")]
    WriterClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not acquire host-local lock for subvolume {subvolume}: {reason}")]
    LockHeld { subvolume: String, reason: String },

    #[error("object {0} not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// A short, stable, grep-able tag for the error kind, independent of the
    /// human-readable message, so callers (and tests) can distinguish
    /// corruption from transient failure without string-matching prose.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::TransientTransport(_) => "transient_transport",
            Error::ContentHashMismatch { .. } => "content_hash_mismatch",
            Error::HmacMismatch => "hmac_mismatch",
            Error::ChunksMissing { .. } => "chunks_missing",
            Error::NoData(_) => "no_data",
            Error::InvalidSnapshot(_) => "invalid_snapshot",
            Error::ReaderClosed => "reader_closed",
            Error::WriterClosed => "writer_closed",
            Error::Config(_) => "config",
            Error::LockHeld { .. } => "lock_held",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }

    /// Whether automation should treat this as a data-integrity failure
    /// rather than an environmental/transient one (§7).
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Error::HmacMismatch | Error::ChunksMissing { .. } | Error::ContentHashMismatch { .. }
        )
    }
}
