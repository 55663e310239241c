//! Append-only, revisioned byte store for strata.
//!
//! This crate is the storage collaborator underneath the strata indices. It
//! knows nothing about tries or keys: it hands out aligned, append-only
//! allocations inside a [`Transaction`], and on commit records a footer that
//! ties the new bytes into the revision chain.
//!
//! # Storage Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`MemoryBackend`] -- shared in-memory buffer for tests and embedding
//! - [`FileBackend`] -- a single file on disk
//!
//! # Design Rules
//!
//! 1. Committed bytes are immutable. Only the 24-byte file header is rewritten.
//! 2. Exactly one write transaction is open at a time.
//! 3. Readers never block on the writer's uncommitted work.
//! 4. A transaction that is dropped leaves the store exactly as it was.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod backend;
pub mod config;
pub mod database;
pub mod error;
pub mod footer;
pub mod header;
pub mod traits;
pub mod transaction;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use config::{StoreConfig, SyncMode};
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use footer::{Footer, IndexKind, FOOTER_SIZE, NUM_INDICES};
pub use header::{FileHeader, HEADER_SIZE};
pub use traits::{StoreReader, StoreWriter};
pub use transaction::Transaction;
