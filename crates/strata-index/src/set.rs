use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_store::{Database, IndexKind, StoreReader, StoreWriter, Transaction};
use strata_types::{Address, RevisionNumber, TypedAddress};

use crate::error::IndexResult;
use crate::hash::{Blake3Hash, KeyHash};
use crate::header::HeaderBlock;
use crate::map::HamtMap;
use crate::pointer::IndexPointer;

/// A persistent set: a [`HamtMap`] whose values are `()`.
pub struct HamtSet<K, H = Blake3Hash> {
    map: HamtMap<K, (), H>,
}

impl<K, H> HamtSet<K, H>
where
    K: Serialize + DeserializeOwned + PartialEq,
    H: KeyHash<K>,
{
    pub fn new() -> Self {
        Self { map: HamtMap::new() }
    }

    pub fn load<R: StoreReader + ?Sized>(
        db: &R,
        header: TypedAddress<HeaderBlock>,
    ) -> IndexResult<Self> {
        Ok(Self {
            map: HamtMap::load(db, header)?,
        })
    }

    pub fn open(db: &Database, kind: IndexKind, revision: RevisionNumber) -> IndexResult<Self> {
        Ok(Self {
            map: HamtMap::open(db, kind, revision)?,
        })
    }

    pub fn len(&self) -> u64 {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn root(&self) -> &IndexPointer {
        self.map.root()
    }

    pub fn header(&self) -> Option<TypedAddress<HeaderBlock>> {
        self.map.header()
    }

    pub fn is_dirty(&self) -> bool {
        self.map.is_dirty()
    }

    pub fn revert(&mut self) {
        self.map.revert();
    }

    /// The address of the leaf record for `key`.
    pub fn find<R: StoreReader + ?Sized>(&self, db: &R, key: &K) -> IndexResult<Option<Address>> {
        self.map.find(db, key)
    }

    pub fn contains<R: StoreReader + ?Sized>(&self, db: &R, key: &K) -> IndexResult<bool> {
        self.map.contains_key(db, key)
    }

    /// Add `key`. Returns its leaf address and whether it was new.
    pub fn insert<W: StoreWriter + ?Sized>(
        &mut self,
        txn: &mut W,
        key: &K,
    ) -> IndexResult<(Address, bool)> {
        self.map.insert(txn, key, &())
    }

    pub fn flush<W: StoreWriter + ?Sized>(
        &mut self,
        txn: &mut W,
    ) -> IndexResult<TypedAddress<HeaderBlock>> {
        self.map.flush(txn)
    }

    pub fn commit_to(
        &mut self,
        txn: &mut Transaction<'_>,
        kind: IndexKind,
    ) -> IndexResult<Option<TypedAddress<HeaderBlock>>> {
        self.map.commit_to(txn, kind)
    }

    pub fn leaves<R: StoreReader + ?Sized>(&self, db: &R) -> IndexResult<Vec<Address>> {
        self.map.leaves(db)
    }

    /// Every member, in trie order.
    pub fn keys<R: StoreReader + ?Sized>(&self, db: &R) -> IndexResult<Vec<K>> {
        self.map.keys(db)
    }
}

impl<K, H> Default for HamtSet<K, H>
where
    K: Serialize + DeserializeOwned + PartialEq,
    H: KeyHash<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, H> std::fmt::Debug for HamtSet<K, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HamtSet").field(&self.map).finish()
    }
}
