use std::sync::MutexGuard;

use strata_types::{Address, RevisionNumber, TypedAddress};
use tracing::debug;

use crate::database::{now_ms, slice, Database, Head};
use crate::error::{StoreError, StoreResult};
use crate::footer::{Footer, IndexKind, FOOTER_SIZE, NUM_INDICES};
use crate::traits::{StoreReader, StoreWriter};

/// The single open write transaction on a [`Database`].
///
/// Allocations land in a private tail that starts at the current end of the
/// store. Nothing reaches the store until [`commit`](Self::commit); dropping
/// the transaction (or calling [`rollback`](Self::rollback)) discards the tail
/// without touching a single committed byte.
pub struct Transaction<'db> {
    db: &'db Database,
    _lock: MutexGuard<'db, ()>,
    head: Head,
    base: Address,
    tail: Vec<u8>,
    index_records: [Address; NUM_INDICES],
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database) -> StoreResult<Self> {
        let lock = db.writer.lock().expect("writer mutex poisoned");
        let head = db.head();
        let base = Address::new(db.size());
        debug!(revision = head.footer.revision, base = %base, "begin transaction");
        Ok(Self {
            db,
            _lock: lock,
            head,
            base,
            tail: Vec::new(),
            index_records: head.footer.index_records,
        })
    }

    /// The database this transaction writes to.
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// The revision this transaction builds on.
    pub fn base_revision(&self) -> RevisionNumber {
        self.head.footer.revision
    }

    /// First address allocated by this transaction.
    pub fn first_address(&self) -> Address {
        self.base
    }

    /// Bytes allocated so far, including alignment padding.
    pub fn size(&self) -> u64 {
        self.tail.len() as u64
    }

    /// Record the header-block address of a named index for the new revision.
    pub fn set_index_root(&mut self, kind: IndexKind, header: Address) {
        self.index_records[kind.slot()] = header;
    }

    /// Header-block address of a named index as it will be committed.
    pub fn index_root(&self, kind: IndexKind) -> Option<Address> {
        let addr = self.index_records[kind.slot()];
        (!addr.is_null()).then_some(addr)
    }

    /// Append the tail and a new footer to the store and publish the new
    /// revision.
    ///
    /// A transaction that allocated nothing and changed no index root writes
    /// nothing and returns the revision it started from.
    pub fn commit(mut self) -> StoreResult<RevisionNumber> {
        if self.tail.is_empty() && self.index_records == self.head.footer.index_records {
            debug!(revision = self.head.footer.revision, "empty transaction; nothing to commit");
            return Ok(self.head.footer.revision);
        }

        let footer = Footer {
            revision: self.head.footer.revision + 1,
            size: self.tail.len() as u64,
            prev: self.head.pos,
            time_ms: now_ms(),
            index_records: self.index_records,
        };
        let (pos, buf) = self.alloc_rw(FOOTER_SIZE, 8)?;
        buf.copy_from_slice(&footer.encode());

        let head = Head {
            pos: TypedAddress::new(pos),
            footer,
        };
        self.db.publish(self.base, &self.tail, head)?;
        debug!(
            revision = footer.revision,
            bytes = self.tail.len(),
            footer = %pos,
            "committed transaction"
        );
        Ok(footer.revision)
    }

    /// Discard everything allocated by this transaction.
    pub fn rollback(self) {
        debug!(bytes = self.tail.len(), "rolled back transaction");
    }
}

impl StoreReader for Transaction<'_> {
    fn read(&self, addr: Address, size: u64) -> StoreResult<Vec<u8>> {
        if addr >= self.base {
            let offset = Address::new(addr.absolute() - self.base.absolute());
            return slice(&self.tail, offset, size)
                .map(<[u8]>::to_vec)
                .map_err(|_| StoreError::OutOfRange {
                    addr,
                    size,
                    len: self.base.absolute() + self.tail.len() as u64,
                });
        }
        self.db.read(addr, size)
    }
}

impl StoreWriter for Transaction<'_> {
    fn alloc_rw(&mut self, size: u64, align: u64) -> StoreResult<(Address, &mut [u8])> {
        let end = self.base + self.tail.len() as u64;
        let addr = end.align_up(align.max(1));
        let start = (addr.absolute() - self.base.absolute()) as usize;
        self.tail.resize(start + size as usize, 0);
        Ok((addr, &mut self.tail[start..]))
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("base_revision", &self.head.footer.revision)
            .field("base", &self.base)
            .field("size", &self.tail.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_ascending() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let a = txn.append_bytes(1, b"abc").unwrap();
        let b = txn.append_bytes(8, b"defg").unwrap();
        let c = txn.append_bytes(8, b"h").unwrap();
        assert_eq!(a, txn.first_address());
        assert!(b.is_aligned(8));
        assert!(a < b && b < c);
        assert_eq!(txn.read(b, 4).unwrap(), b"defg");
    }

    #[test]
    fn reads_see_committed_and_uncommitted_bytes() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let old = txn.append_bytes(8, b"old data").unwrap();
        txn.commit().unwrap();

        let mut txn = db.begin().unwrap();
        let new = txn.append_bytes(8, b"new data").unwrap();
        assert_eq!(txn.read(old, 8).unwrap(), b"old data");
        assert_eq!(txn.read(new, 8).unwrap(), b"new data");
        // The database itself does not see uncommitted bytes.
        assert!(db.read(new, 8).is_err());
        assert!(txn.read(new, 64).is_err());
    }

    #[test]
    fn rollback_writes_nothing() {
        let db = Database::in_memory().unwrap();
        let size = db.size();
        let mut txn = db.begin().unwrap();
        txn.append_bytes(8, &[7u8; 128]).unwrap();
        txn.rollback();
        assert_eq!(db.size(), size);
        assert_eq!(db.current_revision(), 0);
    }

    #[test]
    fn empty_commit_is_a_no_op() {
        let db = Database::in_memory().unwrap();
        let size = db.size();
        let txn = db.begin().unwrap();
        assert_eq!(txn.commit().unwrap(), 0);
        assert_eq!(db.size(), size);
    }

    #[test]
    fn commit_records_index_roots() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let header = txn.append_bytes(8, &[1u8; 24]).unwrap();
        txn.set_index_root(IndexKind::Name, header);
        assert_eq!(txn.index_root(IndexKind::Name), Some(header));
        let rev = txn.commit().unwrap();

        assert_eq!(db.index_root(IndexKind::Name, rev).unwrap(), Some(header));
        assert_eq!(db.index_root(IndexKind::Name, 0).unwrap(), None);
        assert_eq!(db.index_root(IndexKind::Write, rev).unwrap(), None);
    }

    #[test]
    fn index_roots_carry_forward() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let header = txn.append_bytes(8, &[1u8; 24]).unwrap();
        txn.set_index_root(IndexKind::Write, header);
        txn.commit().unwrap();

        let mut txn = db.begin().unwrap();
        txn.append_bytes(8, b"unrelated").unwrap();
        let rev = txn.commit().unwrap();
        assert_eq!(rev, 2);
        assert_eq!(db.index_root(IndexKind::Write, rev).unwrap(), Some(header));
    }

    #[test]
    fn footer_follows_data() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let addr = txn.append_bytes(8, &[9u8; 40]).unwrap();
        txn.commit().unwrap();
        let pos = db.older_revision_footer_pos(1).unwrap();
        assert!(pos.to_address() >= addr + 40);
        assert_eq!(db.footer(1).unwrap().size, 40);
        assert_eq!(db.size(), pos.absolute() + FOOTER_SIZE);
    }
}
