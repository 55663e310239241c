//! Key hashing.
//!
//! The trie consumes a key's 64-bit hash [`HASH_INDEX_BITS`] at a time, least
//! significant chunk first. Hashes are persisted implicitly in the shape of
//! the trie, so a hasher must be stable across processes and releases.

use serde::Serialize;

use crate::error::IndexResult;

/// Bits of the hash consumed per internal-node level.
pub const HASH_INDEX_BITS: u32 = 6;

/// Children an internal node can address: one per value of a hash chunk.
pub const MAX_CHILDREN: usize = 1 << HASH_INDEX_BITS;

const HASH_INDEX_MASK: u64 = (1 << HASH_INDEX_BITS) - 1;

/// Hash bits rounded up to a whole number of levels.
pub const MAX_HASH_BITS: u32 = (u64::BITS + HASH_INDEX_BITS - 1) / HASH_INDEX_BITS * HASH_INDEX_BITS;

/// Levels of internal nodes before the hash is exhausted.
pub const MAX_INTERNAL_DEPTH: usize = (MAX_HASH_BITS / HASH_INDEX_BITS) as usize;

/// Internal levels plus the linear level plus the leaf level.
pub const MAX_TREE_DEPTH: usize = MAX_INTERNAL_DEPTH + 2;

/// The chunk of `hash` that selects a child at the level starting at bit
/// `shifts`.
pub fn hash_chunk(hash: u64, shifts: u32) -> usize {
    debug_assert!(shifts < u64::BITS, "hash exhausted at shift {shifts}");
    ((hash >> shifts) & HASH_INDEX_MASK) as usize
}

/// Returns `true` if a node at bit offset `shifts` is an internal node.
/// Deeper nodes are linear.
pub fn is_internal_depth(shifts: u32) -> bool {
    shifts < MAX_HASH_BITS
}

/// Maps a key to the 64-bit hash that routes it through the trie.
///
/// Fails only when the key itself cannot be encoded.
pub trait KeyHash<K: ?Sized> {
    fn hash(key: &K) -> IndexResult<u64>;
}

/// BLAKE3 over the key's bincode encoding, truncated to 64 bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hash;

impl<K: Serialize + ?Sized> KeyHash<K> for Blake3Hash {
    fn hash(key: &K) -> IndexResult<u64> {
        let mut hasher = blake3::Hasher::new();
        bincode::serialize_into(&mut hasher, key)?;
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Ok(u64::from_le_bytes(head))
    }
}

/// For keys that are already uniformly distributed digests: the high 64 bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestHash;

impl KeyHash<u128> for DigestHash {
    fn hash(key: &u128) -> IndexResult<u64> {
        Ok((*key >> 64) as u64)
    }
}

/// The key is its own hash. Lets tests lay out a trie exactly.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityHash;

impl KeyHash<u64> for IdentityHash {
    fn hash(key: &u64) -> IndexResult<u64> {
        Ok(*key)
    }
}
