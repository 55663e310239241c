//! The trail of ancestors recorded while descending to an insertion point.

use strata_types::Address;

use crate::hash::MAX_INTERNAL_DEPTH;
use crate::internal::InternalNode;
use crate::pointer::IndexPointer;

/// A writable ancestor and the position of the child taken out of it.
#[derive(Debug)]
pub struct ParentEntry {
    pub node: Box<InternalNode>,
    pub position: usize,
    /// The stored node `node` was copied from, if it was not already on the
    /// heap.
    pub origin: Option<Address>,
}

impl ParentEntry {
    /// Put `child` back at `position` and return the pointer that now
    /// refers to this ancestor.
    pub fn reattach(mut self, child: IndexPointer) -> IndexPointer {
        *self.node.child_mut(self.position) = child;
        IndexPointer::Internal(self.node)
    }

    /// Undo the descent through this ancestor: the stored original if there
    /// was one, otherwise the heap node with `child` put back.
    pub fn restore(self, child: IndexPointer) -> IndexPointer {
        match self.origin {
            Some(addr) => IndexPointer::Node(addr),
            None => self.reattach(child),
        }
    }
}

/// Bounded stack of [`ParentEntry`] values, innermost on top.
///
/// Only internal nodes are ever parents, so the depth never exceeds
/// [`MAX_INTERNAL_DEPTH`].
#[derive(Debug)]
pub struct ParentStack {
    entries: Vec<ParentEntry>,
}

impl ParentStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_INTERNAL_DEPTH),
        }
    }

    pub fn push(&mut self, entry: ParentEntry) {
        debug_assert!(
            self.entries.len() < MAX_INTERNAL_DEPTH,
            "parent stack overflow"
        );
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<ParentEntry> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ParentStack {
    fn default() -> Self {
        Self::new()
    }
}
