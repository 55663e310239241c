//! Collision nodes: flat lists of leaves below the last internal level.
//!
//! On disk:
//!
//! ```text
//! [signature "IndxLner"][u64 count][u64 leaf address; count]
//! ```

use serde::de::DeserializeOwned;
use strata_store::{StoreReader, StoreWriter};
use strata_types::Address;
use tracing::warn;

use crate::error::{IndexError, IndexResult};
use crate::internal::NODE_ALIGN;
use crate::pointer::read_u64;
use crate::record::read_key;

pub const LINEAR_SIGNATURE: [u8; 8] = *b"IndxLner";

const HEADER_SIZE: u64 = 16;

/// Leaves whose hashes are identical in every bit the trie consumes.
///
/// Keys are told apart by reading and comparing the stored keys, so lookups
/// are linear in the number of leaves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinearNode {
    leaves: Vec<Address>,
}

impl LinearNode {
    pub fn from_leaf(leaf: Address) -> Self {
        Self { leaves: vec![leaf] }
    }

    /// A node holding two colliding leaves.
    pub fn allocate(a: Address, b: Address) -> Self {
        Self { leaves: vec![a, b] }
    }

    /// A copy of `existing` with `extra` appended.
    pub fn allocate_from(existing: &LinearNode, extra: Address) -> Self {
        let mut leaves = Vec::with_capacity(existing.leaves.len() + 1);
        leaves.extend_from_slice(&existing.leaves);
        leaves.push(extra);
        Self { leaves }
    }

    pub fn leaves(&self) -> &[Address] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub(crate) fn push(&mut self, leaf: Address) {
        self.leaves.push(leaf);
    }

    pub(crate) fn replace(&mut self, position: usize, leaf: Address) {
        self.leaves[position] = leaf;
    }

    /// Find the leaf whose stored key equals `key`.
    pub fn lookup<R, K>(&self, db: &R, key: &K) -> IndexResult<Option<(usize, Address)>>
    where
        R: StoreReader + ?Sized,
        K: DeserializeOwned + PartialEq,
    {
        for (position, &leaf) in self.leaves.iter().enumerate() {
            let stored: K = read_key(db, leaf)?;
            if stored == *key {
                return Ok(Some((position, leaf)));
            }
        }
        Ok(None)
    }

    pub fn stored_size(&self) -> u64 {
        HEADER_SIZE + 8 * self.leaves.len() as u64
    }

    /// Write this node. Its children are leaves, so nothing else is written.
    pub fn flush<W: StoreWriter + ?Sized>(&self, txn: &mut W) -> IndexResult<Address> {
        Ok(txn.append_bytes(NODE_ALIGN, &self.encode())?)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.stored_size() as usize);
        buf.extend_from_slice(&LINEAR_SIGNATURE);
        buf.extend_from_slice(&(self.leaves.len() as u64).to_le_bytes());
        for leaf in &self.leaves {
            buf.extend_from_slice(&leaf.absolute().to_le_bytes());
        }
        buf
    }

    pub fn load<R: StoreReader + ?Sized>(db: &R, addr: Address) -> IndexResult<Self> {
        let header = db.read(addr, HEADER_SIZE)?;
        if header[..8] != LINEAR_SIGNATURE {
            warn!(node = %addr, "bad linear node signature");
            return Err(IndexError::corrupt(addr, "bad linear node signature"));
        }
        let count = read_u64(&header, 8);
        let size = count
            .checked_mul(8)
            .ok_or_else(|| IndexError::corrupt(addr, format!("linear node claims {count} leaves")))?;
        let body = db.read(addr + HEADER_SIZE, size)?;
        let leaves = (0..count as usize)
            .map(|i| Address::new(read_u64(&body, i * 8)))
            .collect();
        Ok(Self { leaves })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::write_pair;
    use strata_store::Database;

    #[test]
    fn grow_by_copy() {
        let a = Address::new(8);
        let b = Address::new(16);
        let node = LinearNode::allocate(a, b);
        let grown = LinearNode::allocate_from(&node, Address::new(24));
        assert_eq!(node.len(), 2);
        assert_eq!(grown.leaves(), &[a, b, Address::new(24)]);
    }

    #[test]
    fn lookup_compares_keys() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let a = write_pair(&mut txn, "apple", &1u32).unwrap();
        let b = write_pair(&mut txn, "banana", &2u32).unwrap();
        let node = LinearNode::allocate(a, b);

        assert_eq!(node.lookup(&txn, &"banana".to_string()).unwrap(), Some((1, b)));
        assert_eq!(node.lookup(&txn, &"apple".to_string()).unwrap(), Some((0, a)));
        assert_eq!(node.lookup(&txn, &"cherry".to_string()).unwrap(), None);
    }

    #[test]
    fn flush_and_load() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let node = LinearNode::allocate(Address::new(8), Address::new(16));
        let addr = node.flush(&mut txn).unwrap();
        assert!(addr.is_aligned(NODE_ALIGN));
        txn.commit().unwrap();
        assert_eq!(LinearNode::load(&db, addr).unwrap(), node);
    }

    #[test]
    fn load_rejects_bad_signature() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let addr = txn.append_bytes(8, &[0u8; 16]).unwrap();
        let err = LinearNode::load(&txn, addr).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }
}
