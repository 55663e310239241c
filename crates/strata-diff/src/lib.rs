//! Revision diffs for strata indices.
//!
//! Given an index root and a past revision, [`diff`] finds the leaves that
//! were written after that revision. It relies on two properties of the
//! store: records are only ever appended, and a trie node is always written
//! after its children. Unchanged subtrees are therefore recognised by
//! address alone and never read.
//!
//! # Key Types
//!
//! - [`diff`] / [`collect_new`] -- Leaf-level revision diff
//! - [`diff_keys`] / [`diff_indices`] / [`IndicesDiff`] -- Key-level diffs of the named indices
//! - [`resolve_revisions`] -- Default and order a pair of revision arguments

pub mod error;
pub mod keys;
pub mod revisions;
pub mod traverser;

pub use error::{DiffError, DiffResult};
pub use keys::{diff_indices, diff_keys, IndicesDiff};
pub use revisions::resolve_revisions;
pub use traverser::{collect_new, diff, threshold};
