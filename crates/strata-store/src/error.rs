use strata_types::{Address, RevisionNumber};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A read or write touched bytes outside the store.
    #[error("address range {addr}+{size} is outside the store (length {len})")]
    OutOfRange { addr: Address, size: u64, len: u64 },

    /// The file header is missing, has the wrong signature, or is truncated.
    #[error("corrupt store header: {0}")]
    CorruptHeader(String),

    /// A revision footer failed its signature, checksum, or ordering checks.
    #[error("corrupt footer at {addr}: {reason}")]
    CorruptFooter { addr: Address, reason: String },

    /// The requested revision does not exist yet.
    #[error("unknown revision {requested} (current revision is {current})")]
    UnknownRevision {
        requested: RevisionNumber,
        current: RevisionNumber,
    },

    /// The store was opened read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
