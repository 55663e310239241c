//! Error types for the index crate.

use strata_types::Address;

/// Errors that can occur while reading or updating an index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A stored index record failed validation. Never retried.
    #[error("index corrupt at {addr}: {reason}")]
    Corrupt { addr: Address, reason: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] strata_store::StoreError),

    /// A key or value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl IndexError {
    pub(crate) fn corrupt(addr: Address, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            addr,
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for IndexError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
