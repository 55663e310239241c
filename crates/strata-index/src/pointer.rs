//! Child references inside the trie.

use std::borrow::Cow;

use strata_store::StoreReader;
use strata_types::Address;

use crate::error::{IndexError, IndexResult};
use crate::hash::is_internal_depth;
use crate::internal::InternalNode;
use crate::linear::LinearNode;

/// Tag bit set on the stored form of a child that refers to a node rather
/// than a leaf.
pub const NODE_TAG: u64 = 1;

/// Tag bit that marks an uncommitted node. Never valid on disk.
pub const HEAP_TAG: u64 = 2;

const TAG_MASK: u64 = NODE_TAG | HEAP_TAG;

/// A reference to a trie node or leaf.
///
/// Store-resident nodes are immutable and shared with every older revision
/// that reaches them. Heap-resident nodes belong to the index that is being
/// modified and become store-resident when it is flushed.
///
/// Whether a stored node is internal or linear is not recorded in the
/// pointer: it follows from the depth at which the pointer is found (see
/// [`is_internal_depth`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexPointer {
    #[default]
    Empty,
    /// A key/value record in the store.
    Leaf(Address),
    /// An internal or linear node in the store.
    Node(Address),
    /// An internal node built by the current transaction.
    Internal(Box<InternalNode>),
    /// A linear node built by the current transaction.
    Linear(Box<LinearNode>),
}

impl IndexPointer {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// True for internal and linear nodes alike, in memory or in the store.
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_) | Self::Internal(_) | Self::Linear(_))
    }

    pub fn is_heap(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Linear(_))
    }

    /// True if this refers to something in the store.
    pub fn is_address(&self) -> bool {
        matches!(self, Self::Leaf(_) | Self::Node(_))
    }

    /// The untagged store address, for store-resident leaves and nodes.
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Leaf(addr) | Self::Node(addr) => Some(*addr),
            _ => None,
        }
    }

    /// The tagged on-disk form.
    ///
    /// # Panics
    ///
    /// If called on a heap node: children are always flushed before the
    /// node that holds them.
    pub fn to_raw(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Leaf(addr) => {
                debug_assert_eq!(addr.absolute() & TAG_MASK, 0, "leaf address collides with tags");
                addr.absolute()
            }
            Self::Node(addr) => addr.absolute() | NODE_TAG,
            Self::Internal(_) | Self::Linear(_) => {
                unreachable!("heap node serialized before being flushed")
            }
        }
    }

    /// Decode a stored child pointer found inside the record at `owner`.
    pub fn from_raw(owner: Address, raw: u64) -> IndexResult<Self> {
        if raw & HEAP_TAG != 0 {
            return Err(IndexError::corrupt(owner, format!("heap pointer {raw:#x} in store")));
        }
        Ok(match raw {
            0 => Self::Empty,
            _ if raw & NODE_TAG != 0 => Self::Node(Address::new(raw & !TAG_MASK)),
            _ => Self::Leaf(Address::new(raw)),
        })
    }

    /// Look through this pointer, loading a stored node if needed.
    ///
    /// `shifts` is the hash bit offset of the level the pointer sits at; it
    /// decides whether a stored node is read as internal or linear.
    pub fn resolve<R: StoreReader + ?Sized>(
        &self,
        db: &R,
        shifts: u32,
    ) -> IndexResult<NodeView<'_>> {
        Ok(match self {
            Self::Empty => NodeView::Empty,
            Self::Leaf(addr) => NodeView::Leaf(*addr),
            Self::Node(addr) if is_internal_depth(shifts) => {
                NodeView::Internal(Cow::Owned(InternalNode::load(db, *addr)?), Some(*addr))
            }
            Self::Node(addr) => {
                NodeView::Linear(Cow::Owned(LinearNode::load(db, *addr)?), Some(*addr))
            }
            Self::Internal(node) => NodeView::Internal(Cow::Borrowed(&**node), None),
            Self::Linear(node) => NodeView::Linear(Cow::Borrowed(&**node), None),
        })
    }
}

impl From<Address> for IndexPointer {
    /// A plain address names a leaf.
    fn from(addr: Address) -> Self {
        Self::Leaf(addr)
    }
}

impl From<InternalNode> for IndexPointer {
    fn from(node: InternalNode) -> Self {
        Self::Internal(Box::new(node))
    }
}

impl From<LinearNode> for IndexPointer {
    fn from(node: LinearNode) -> Self {
        Self::Linear(Box::new(node))
    }
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// What an [`IndexPointer`] refers to, with stored nodes loaded.
///
/// Nodes carry their store address, or `None` when they are heap-resident.
#[derive(Debug)]
pub enum NodeView<'a> {
    Empty,
    Leaf(Address),
    Internal(Cow<'a, InternalNode>, Option<Address>),
    Linear(Cow<'a, LinearNode>, Option<Address>),
}
