//! Error types for the diff crate.

use strata_types::RevisionNumber;

/// Errors that can occur while computing a diff.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A revision argument names a revision the store does not have.
    #[error("revision {requested} does not exist (current revision is {current})")]
    UnknownRevision {
        requested: RevisionNumber,
        current: RevisionNumber,
    },

    /// Reading an index failed.
    #[error("index error: {0}")]
    Index(#[from] strata_index::IndexError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] strata_store::StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
