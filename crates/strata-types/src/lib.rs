//! Foundation types for strata, an append-only versioned object store.
//!
//! Every record in a strata store lives at an absolute byte offset that never
//! changes once written. This crate provides the vocabulary used by every
//! other crate to talk about those offsets.
//!
//! # Key Types
//!
//! - [`Address`]: Absolute byte offset into the store (`0` means "no address")
//! - [`TypedAddress`]: An address tagged with the type of record it refers to
//! - [`Extent`]: An address paired with a byte length
//! - [`RevisionNumber`]: Identifier of one committed state of the store

pub mod address;
pub mod error;
pub mod extent;
pub mod revision;

pub use address::{Address, TypedAddress};
pub use error::TypeError;
pub use extent::{Blob, Extent};
pub use revision::{RevisionNumber, HEAD_REVISION};
