//! Persistent hash-array-mapped trie (HAMT) indices for strata.
//!
//! An index maps keys to leaf records in an append-only store. The trie is
//! addressed by successive 6-bit chunks of each key's 64-bit hash; branch
//! nodes are compacted with a bitmap, and keys whose hashes collide in every
//! bit end up in a linear node that compares the stored keys.
//!
//! Updates never touch stored bytes. Inserting copies the nodes on the path
//! to the new leaf onto the heap; flushing writes them out children first,
//! so that a stored node only ever points at lower addresses. That ordering
//! is checked whenever a node is loaded and is what lets `strata-diff` skip
//! whole unchanged subtrees.
//!
//! # Key Types
//!
//! - [`IndexPointer`] -- Empty, stored leaf, stored node, or heap node
//! - [`InternalNode`] / [`LinearNode`] -- The two node kinds
//! - [`HamtMap`] / [`HamtSet`] -- The index types
//! - [`HeaderBlock`] -- Per-index root record written on flush
//! - [`Indices`] -- The write, digest, and name indices of one revision

pub mod error;
pub mod hash;
pub mod header;
pub mod indices;
pub mod internal;
pub mod linear;
pub mod map;
pub mod parent;
pub mod pointer;
pub mod record;
pub mod set;
pub mod structure;

pub use error::{IndexError, IndexResult};
pub use hash::{
    hash_chunk, is_internal_depth, Blake3Hash, DigestHash, IdentityHash, KeyHash, HASH_INDEX_BITS,
    MAX_HASH_BITS, MAX_INTERNAL_DEPTH, MAX_TREE_DEPTH,
};
pub use header::{HeaderBlock, HEADER_BLOCK_SIZE};
pub use indices::{read_blob, write_blob, DigestIndex, Indices, NameIndex, WriteIndex};
pub use internal::InternalNode;
pub use linear::LinearNode;
pub use map::HamtMap;
pub use parent::{ParentEntry, ParentStack};
pub use pointer::{IndexPointer, NodeView};
pub use record::{read_key, read_pair, read_value, write_pair};
pub use set::HamtSet;
pub use structure::to_dot;
