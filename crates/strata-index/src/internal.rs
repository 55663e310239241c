//! Bitmap-indexed branch nodes.
//!
//! On disk:
//!
//! ```text
//! [signature "Internal"][u64 bitmap][u64 child; popcount(bitmap)]
//! ```
//!
//! Child `i` of the array holds the slot whose hash chunk is the `i`-th set
//! bit of the bitmap, counting from the least significant bit.

use strata_store::{StoreReader, StoreWriter};
use strata_types::Address;
use tracing::warn;

use crate::error::{IndexError, IndexResult};
use crate::hash::{is_internal_depth, HASH_INDEX_BITS, MAX_CHILDREN};
use crate::pointer::{read_u64, IndexPointer};

pub const INTERNAL_SIGNATURE: [u8; 8] = *b"Internal";

/// Node alignment in the store. Keeps the two low address bits free for tags.
pub const NODE_ALIGN: u64 = 8;

const HEADER_SIZE: u64 = 16;

/// A sparse branch node with one child per occupied hash chunk.
///
/// The children vector is sized to the population of the bitmap; inserting
/// a child grows it by one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InternalNode {
    bitmap: u64,
    children: Vec<IndexPointer>,
}

impl InternalNode {
    /// A node with no children. Only meaningful as a starting point for
    /// [`insert_child`](Self::insert_child); an empty node is never stored.
    pub fn new() -> Self {
        Self::default()
    }

    /// A node with a single child at `chunk`.
    pub fn with_child(chunk: usize, child: IndexPointer) -> Self {
        debug_assert!(chunk < MAX_CHILDREN);
        Self {
            bitmap: 1 << chunk,
            children: vec![child],
        }
    }

    /// A node with two children at distinct chunks. They are stored in chunk
    /// order, whichever order they are given in.
    pub fn with_children(
        a_chunk: usize,
        a: IndexPointer,
        b_chunk: usize,
        b: IndexPointer,
    ) -> Self {
        debug_assert!(a_chunk < MAX_CHILDREN && b_chunk < MAX_CHILDREN);
        debug_assert_ne!(a_chunk, b_chunk, "two children cannot share a slot");
        let children = if a_chunk < b_chunk { vec![a, b] } else { vec![b, a] };
        Self {
            bitmap: (1 << a_chunk) | (1 << b_chunk),
            children,
        }
    }

    pub fn bitmap(&self) -> u64 {
        self.bitmap
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Children in slot order.
    pub fn children(&self) -> &[IndexPointer] {
        &self.children
    }

    pub(crate) fn child_mut(&mut self, slot: usize) -> &mut IndexPointer {
        &mut self.children[slot]
    }

    /// Position in the children array of the slot for `chunk`, whether or not
    /// that slot is occupied.
    fn rank(&self, chunk: usize) -> usize {
        let below = (1u64 << chunk) - 1;
        (self.bitmap & below).count_ones() as usize
    }

    /// The child at `chunk` and its position in the children array.
    pub fn lookup(&self, chunk: usize) -> Option<(&IndexPointer, usize)> {
        debug_assert!(chunk < MAX_CHILDREN);
        if self.bitmap & (1 << chunk) == 0 {
            return None;
        }
        let slot = self.rank(chunk);
        Some((&self.children[slot], slot))
    }

    /// Add `child` at the unoccupied slot `chunk`, shifting higher-ranked
    /// children up. Returns the child's position.
    pub fn insert_child(&mut self, chunk: usize, child: IndexPointer) -> usize {
        debug_assert!(chunk < MAX_CHILDREN);
        debug_assert_eq!(self.bitmap & (1 << chunk), 0, "slot {chunk} is occupied");
        let slot = self.rank(chunk);
        self.children.insert(slot, child);
        self.bitmap |= 1 << chunk;
        slot
    }

    /// Bytes this node occupies in the store.
    pub fn stored_size(&self) -> u64 {
        HEADER_SIZE + 8 * self.children.len() as u64
    }

    /// Write every heap-resident descendant, then this node, children before
    /// parents. `shifts` is the hash bit offset of this node's level.
    ///
    /// On return every child is store-resident. Store-resident children are
    /// not touched.
    pub fn flush<W: StoreWriter + ?Sized>(&mut self, txn: &mut W, shifts: u32) -> IndexResult<Address> {
        debug_assert!(is_internal_depth(shifts));
        let child_shifts = shifts + HASH_INDEX_BITS;
        for child in &mut self.children {
            let addr = match child {
                IndexPointer::Internal(node) => {
                    debug_assert!(is_internal_depth(child_shifts));
                    node.flush(txn, child_shifts)?
                }
                IndexPointer::Linear(node) => {
                    debug_assert!(!is_internal_depth(child_shifts));
                    node.flush(txn)?
                }
                _ => continue,
            };
            *child = IndexPointer::Node(addr);
        }
        Ok(txn.append_bytes(NODE_ALIGN, &self.encode())?)
    }

    /// The stored form. All children must already be store-resident.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.stored_size() as usize);
        buf.extend_from_slice(&INTERNAL_SIGNATURE);
        buf.extend_from_slice(&self.bitmap.to_le_bytes());
        for child in &self.children {
            buf.extend_from_slice(&child.to_raw().to_le_bytes());
        }
        buf
    }

    /// Read and validate the node stored at `addr`.
    pub fn load<R: StoreReader + ?Sized>(db: &R, addr: Address) -> IndexResult<Self> {
        Self::read(db, addr).inspect_err(|e| {
            if matches!(e, IndexError::Corrupt { .. }) {
                warn!(node = %addr, error = %e, "corrupt internal node");
            }
        })
    }

    fn read<R: StoreReader + ?Sized>(db: &R, addr: Address) -> IndexResult<Self> {
        if !addr.is_aligned(NODE_ALIGN) {
            return Err(IndexError::corrupt(addr, "misaligned internal node"));
        }
        let header = db.read(addr, HEADER_SIZE)?;
        if header[..8] != INTERNAL_SIGNATURE {
            return Err(IndexError::corrupt(addr, "bad internal node signature"));
        }
        let bitmap = read_u64(&header, 8);
        if bitmap == 0 {
            return Err(IndexError::corrupt(addr, "internal node with an empty bitmap"));
        }

        let count = bitmap.count_ones() as u64;
        let body = db.read(addr + HEADER_SIZE, 8 * count)?;
        let children = (0..count as usize)
            .map(|i| IndexPointer::from_raw(addr, read_u64(&body, i * 8)))
            .collect::<IndexResult<Vec<_>>>()?;

        let node = Self { bitmap, children };
        node.validate_after_load(addr)?;
        Ok(node)
    }

    /// Check the invariants of a node just read from `addr`: every child is
    /// present and store-resident, every child lies strictly below the node,
    /// and no two children share an address.
    pub fn validate_after_load(&self, addr: Address) -> IndexResult<()> {
        if self.bitmap.count_ones() as usize != self.children.len() {
            return Err(IndexError::corrupt(addr, "bitmap does not match child count"));
        }
        let mut seen = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let child_addr = match child {
                IndexPointer::Leaf(a) | IndexPointer::Node(a) => *a,
                IndexPointer::Empty => {
                    return Err(IndexError::corrupt(addr, "internal node with an empty child"))
                }
                IndexPointer::Internal(_) | IndexPointer::Linear(_) => {
                    return Err(IndexError::corrupt(addr, "heap child in a stored node"))
                }
            };
            if child_addr >= addr {
                return Err(IndexError::corrupt(
                    addr,
                    format!("child {child_addr} is not below its parent"),
                ));
            }
            seen.push(child_addr);
        }
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            return Err(IndexError::corrupt(addr, "duplicate child address"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::Database;

    fn leaf(n: u64) -> IndexPointer {
        IndexPointer::Leaf(Address::new(n * 8))
    }

    // -----------------------------------------------------------------------
    // In-memory operations
    // -----------------------------------------------------------------------

    #[test]
    fn lookup_uses_rank() {
        let mut node = InternalNode::with_child(10, leaf(1));
        assert_eq!(node.lookup(10), Some((&leaf(1), 0)));
        assert_eq!(node.lookup(11), None);

        assert_eq!(node.insert_child(3, leaf(2)), 0);
        assert_eq!(node.insert_child(63, leaf(3)), 2);
        assert_eq!(node.insert_child(20, leaf(4)), 2);
        assert_eq!(node.len(), 4);
        assert_eq!(node.lookup(3).unwrap().1, 0);
        assert_eq!(node.lookup(10).unwrap().1, 1);
        assert_eq!(node.lookup(20).unwrap().1, 2);
        assert_eq!(node.lookup(63), Some((&leaf(3), 3)));
        assert_eq!(node.bitmap().count_ones(), 4);
    }

    #[test]
    fn two_children_are_in_chunk_order() {
        let a = InternalNode::with_children(5, leaf(1), 2, leaf(2));
        let b = InternalNode::with_children(2, leaf(2), 5, leaf(1));
        assert_eq!(a, b);
        assert_eq!(a.children(), &[leaf(2), leaf(1)]);
        assert_eq!(a.lookup(5), Some((&leaf(1), 1)));
    }

    #[test]
    fn insert_into_empty() {
        let mut node = InternalNode::new();
        assert!(node.is_empty());
        assert_eq!(node.insert_child(0, leaf(1)), 0);
        assert_eq!(node.bitmap(), 1);
    }

    // -----------------------------------------------------------------------
    // Store round trips
    // -----------------------------------------------------------------------

    #[test]
    fn flush_and_load() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let l1 = txn.append_bytes(8, &[0u8; 8]).unwrap();
        let l2 = txn.append_bytes(8, &[0u8; 8]).unwrap();
        let mut node = InternalNode::with_children(7, l1.into(), 40, l2.into());

        let addr = node.flush(&mut txn, 0).unwrap();
        assert!(addr > l2);
        assert_eq!(txn.size() - (addr.absolute() - txn.first_address().absolute()), 32);

        let loaded = InternalNode::load(&txn, addr).unwrap();
        assert_eq!(loaded, node);
        assert_eq!(loaded.stored_size(), 32);
    }

    #[test]
    fn flush_writes_heap_children_first() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let l1 = txn.append_bytes(8, &[0u8; 8]).unwrap();
        let child = InternalNode::with_child(1, l1.into());
        let mut root = InternalNode::with_child(4, child.into());

        let addr = root.flush(&mut txn, 0).unwrap();
        let child_addr = match root.lookup(4).unwrap().0 {
            IndexPointer::Node(a) => *a,
            other => panic!("expected stored child, got {other:?}"),
        };
        assert!(child_addr < addr);
        let loaded = InternalNode::load(&txn, child_addr).unwrap();
        assert_eq!(loaded.children(), &[IndexPointer::Leaf(l1)]);
    }

    #[test]
    fn load_rejects_bad_signature() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut bytes = b"Externa!".to_vec();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&8u64.to_le_bytes());
        let addr = txn.append_bytes(8, &bytes).unwrap();
        let err = InternalNode::load(&txn, addr).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[test]
    fn load_rejects_empty_bitmap() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut bytes = INTERNAL_SIGNATURE.to_vec();
        bytes.extend_from_slice(&0u64.to_le_bytes());
        let addr = txn.append_bytes(8, &bytes).unwrap();
        let err = InternalNode::load(&txn, addr).unwrap_err();
        assert!(err.to_string().contains("empty bitmap"), "{err}");
    }

    #[test]
    fn load_rejects_forward_child() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut bytes = INTERNAL_SIGNATURE.to_vec();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
        let addr = txn.append_bytes(8, &bytes).unwrap();
        let err = InternalNode::load(&txn, addr).unwrap_err();
        assert!(err.to_string().contains("not below"), "{err}");
    }

    #[test]
    fn validate_rejects_duplicates() {
        let node = InternalNode::with_children(1, leaf(3), 2, leaf(3));
        let err = node.validate_after_load(Address::new(4096)).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }
}
