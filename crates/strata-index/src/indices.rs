//! The three indices every store revision can carry.

use strata_store::{Database, IndexKind, StoreReader, StoreWriter, Transaction};
use strata_types::{Blob, Extent, RevisionNumber};
use tracing::debug;

use crate::error::IndexResult;
use crate::hash::DigestHash;
use crate::map::HamtMap;
use crate::set::HamtSet;

/// Name of a written object to the bytes it was written with.
pub type WriteIndex = HamtMap<String, Extent<Blob>>;

/// 128-bit content digest to the bytes it identifies.
pub type DigestIndex = HamtMap<u128, Extent<Blob>, DigestHash>;

/// Interned names.
pub type NameIndex = HamtSet<String>;

/// All named indices of one revision, opened together.
#[derive(Debug, Default)]
pub struct Indices {
    pub write: WriteIndex,
    pub digest: DigestIndex,
    pub name: NameIndex,
}

impl Indices {
    /// Open every index as it was at `revision`.
    pub fn open(db: &Database, revision: RevisionNumber) -> IndexResult<Self> {
        Ok(Self {
            write: WriteIndex::open(db, IndexKind::Write, revision)?,
            digest: DigestIndex::open(db, IndexKind::Digest, revision)?,
            name: NameIndex::open(db, IndexKind::Name, revision)?,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.write.is_dirty() || self.digest.is_dirty() || self.name.is_dirty()
    }

    /// Flush every index into `txn` and record their headers.
    pub fn commit_to(&mut self, txn: &mut Transaction<'_>) -> IndexResult<()> {
        self.write.commit_to(txn, IndexKind::Write)?;
        self.digest.commit_to(txn, IndexKind::Digest)?;
        self.name.commit_to(txn, IndexKind::Name)?;
        debug!(
            write = self.write.len(),
            digest = self.digest.len(),
            name = self.name.len(),
            "recorded indices"
        );
        Ok(())
    }
}

/// Copy `bytes` into the store as an uninterpreted blob.
pub fn write_blob<W: StoreWriter + ?Sized>(txn: &mut W, bytes: &[u8]) -> IndexResult<Extent<Blob>> {
    let addr = txn.append_bytes(8, bytes)?;
    Ok(Extent::new(addr.into(), bytes.len() as u64))
}

pub fn read_blob<R: StoreReader + ?Sized>(db: &R, extent: Extent<Blob>) -> IndexResult<Vec<u8>> {
    Ok(db.read(extent.addr.to_address(), extent.size)?)
}
