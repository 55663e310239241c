//! Collect the leaves written after a past revision.
//!
//! Every stored node points only at lower addresses, and everything a
//! revision wrote lies below the end of its footer. A node below that
//! threshold therefore has no descendant above it, so the walk never enters
//! one: the cost is proportional to the number of nodes written since the
//! past revision, not to the size of the trie.

use strata_index::{IndexPointer, NodeView, HASH_INDEX_BITS};
use strata_store::{Database, StoreReader, FOOTER_SIZE};
use strata_types::{Address, RevisionNumber, HEAD_REVISION};
use tracing::debug;

use crate::error::DiffResult;

/// Leaf addresses reachable from `root` that were written after revision
/// `old`, in trie order.
///
/// Asking for [`HEAD_REVISION`], or for any revision at or after the current
/// one, yields nothing.
pub fn diff(db: &Database, root: &IndexPointer, old: RevisionNumber) -> DiffResult<Vec<Address>> {
    match threshold(db, old)? {
        Some(threshold) => collect_new(db, root, threshold),
        None => Ok(Vec::new()),
    }
}

/// First address written after revision `old`, or `None` if nothing can be
/// newer than `old`.
pub fn threshold(db: &Database, old: RevisionNumber) -> DiffResult<Option<Address>> {
    let current = db.current_revision();
    if old == HEAD_REVISION || old >= current {
        debug!(old, current, "diff against the current revision is empty");
        return Ok(None);
    }
    let threshold = db.older_revision_footer_pos(old)?.to_address() + FOOTER_SIZE;
    debug!(old, current, threshold = %threshold, "diff threshold");
    Ok(Some(threshold))
}

/// Leaves below `root` at or above `threshold`, reading nodes through `db`.
pub fn collect_new<R: StoreReader + ?Sized>(
    db: &R,
    root: &IndexPointer,
    threshold: Address,
) -> DiffResult<Vec<Address>> {
    let mut out = Vec::new();
    visit(db, root, 0, threshold, &mut out)?;
    Ok(out)
}

fn is_new(ptr: &IndexPointer, threshold: Address) -> bool {
    // A committed root has no heap nodes, but a dirty one is all new.
    ptr.is_heap() || ptr.address().is_some_and(|addr| addr >= threshold)
}

fn visit<R: StoreReader + ?Sized>(
    db: &R,
    ptr: &IndexPointer,
    shifts: u32,
    threshold: Address,
    out: &mut Vec<Address>,
) -> DiffResult<()> {
    if !is_new(ptr, threshold) {
        return Ok(());
    }
    match ptr.resolve(db, shifts)? {
        NodeView::Empty => {}
        NodeView::Leaf(leaf) => out.push(leaf),
        NodeView::Internal(node, _) => {
            for child in node.children() {
                visit(db, child, shifts + HASH_INDEX_BITS, threshold, out)?;
            }
        }
        NodeView::Linear(node, _) => {
            out.extend(node.leaves().iter().filter(|&&leaf| leaf >= threshold));
        }
    }
    Ok(())
}
