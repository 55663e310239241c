//! The persistent hash map and its insert, lookup, and flush algorithms.

use std::fmt;
use std::marker::PhantomData;
use std::mem;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_store::{Database, IndexKind, StoreReader, StoreWriter, Transaction};
use strata_types::{Address, RevisionNumber, TypedAddress};
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::hash::{hash_chunk, is_internal_depth, Blake3Hash, KeyHash, HASH_INDEX_BITS};
use crate::header::HeaderBlock;
use crate::internal::InternalNode;
use crate::linear::LinearNode;
use crate::parent::{ParentEntry, ParentStack};
use crate::pointer::{IndexPointer, NodeView};
use crate::record::{read_key, read_pair, read_value, write_pair};

/// A persistent hash-array-mapped trie from `K` to `V`.
///
/// Keys and values live in leaf records in the store; the trie maps each
/// key's hash to the address of its record. Updates copy the path from the
/// changed leaf to the root onto the heap and leave every other node shared
/// with earlier revisions. [`flush`](Self::flush) writes the heap nodes back
/// to the store, children before parents, so that every stored node only
/// points at lower addresses.
///
/// The map holds no reference to the store: reads take any [`StoreReader`]
/// and updates take the open [`Transaction`] (or any [`StoreWriter`]).
pub struct HamtMap<K, V, H = Blake3Hash> {
    root: IndexPointer,
    size: u64,
    header: Option<TypedAddress<HeaderBlock>>,
    flushed: HeaderBlock,
    _marker: PhantomData<fn() -> (K, V, H)>,
}

#[derive(Clone, Copy, Debug)]
enum Placement {
    /// Add a leaf for a key that is not present.
    Insert(Address),
    /// Swap the leaf for a key that is present.
    Replace { old: Address, new: Address },
}

enum Step {
    Descend(ParentEntry, IndexPointer),
    Done(IndexPointer),
    Failed(IndexPointer, IndexError),
}

const EMPTY_BLOCK: HeaderBlock = HeaderBlock {
    size: 0,
    root: Address::null(),
};

impl<K, V, H> HamtMap<K, V, H>
where
    K: Serialize + DeserializeOwned + PartialEq,
    V: Serialize + DeserializeOwned,
    H: KeyHash<K>,
{
    /// An empty map that has never been written.
    pub fn new() -> Self {
        Self {
            root: IndexPointer::Empty,
            size: 0,
            header: None,
            flushed: EMPTY_BLOCK,
            _marker: PhantomData,
        }
    }

    /// Open the map whose header block is at `header`.
    ///
    /// The root node is read and validated immediately so that a corrupt
    /// index is reported when it is opened.
    pub fn load<R: StoreReader + ?Sized>(
        db: &R,
        header: TypedAddress<HeaderBlock>,
    ) -> IndexResult<Self> {
        let block = HeaderBlock::load(db, header)?;
        if !block.root.is_null() {
            InternalNode::load(db, block.root)?;
        }
        debug!(header = %header, size = block.size, root = %block.root, "loaded index");
        let mut map = Self::new();
        map.header = Some(header);
        map.flushed = block;
        map.revert();
        Ok(map)
    }

    /// Open the named index as it was at `revision`. An index that had not
    /// been written by then is empty.
    pub fn open(db: &Database, kind: IndexKind, revision: RevisionNumber) -> IndexResult<Self> {
        match db.index_root(kind, revision)? {
            Some(addr) => Self::load(db, addr.into()),
            None => Ok(Self::new()),
        }
    }

    /// Number of keys.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn root(&self) -> &IndexPointer {
        &self.root
    }

    /// Where the map was last loaded from or flushed to.
    pub fn header(&self) -> Option<TypedAddress<HeaderBlock>> {
        self.header
    }

    /// True if the map has changes that have not been flushed.
    pub fn is_dirty(&self) -> bool {
        self.root.is_heap()
    }

    /// Drop every change made since the map was last loaded or flushed.
    pub fn revert(&mut self) {
        self.root = if self.flushed.root.is_null() {
            IndexPointer::Empty
        } else {
            IndexPointer::Node(self.flushed.root)
        };
        self.size = self.flushed.size;
    }

    /// The address of the leaf record for `key`.
    pub fn find<R: StoreReader + ?Sized>(&self, db: &R, key: &K) -> IndexResult<Option<Address>> {
        Self::find_in(db, &self.root, key, H::hash(key)?, 0)
    }

    fn find_in<R: StoreReader + ?Sized>(
        db: &R,
        ptr: &IndexPointer,
        key: &K,
        hash: u64,
        shifts: u32,
    ) -> IndexResult<Option<Address>> {
        match ptr.resolve(db, shifts)? {
            NodeView::Empty => Ok(None),
            NodeView::Leaf(leaf) => {
                let stored: K = read_key(db, leaf)?;
                Ok((stored == *key).then_some(leaf))
            }
            NodeView::Internal(node, _) => match node.lookup(hash_chunk(hash, shifts)) {
                Some((child, _)) => Self::find_in(db, child, key, hash, shifts + HASH_INDEX_BITS),
                None => Ok(None),
            },
            NodeView::Linear(node, _) => Ok(node.lookup(db, key)?.map(|(_, leaf)| leaf)),
        }
    }

    /// The value stored for `key`.
    pub fn get<R: StoreReader + ?Sized>(&self, db: &R, key: &K) -> IndexResult<Option<V>> {
        match self.find(db, key)? {
            Some(leaf) => Ok(Some(read_value(db, leaf)?)),
            None => Ok(None),
        }
    }

    pub fn contains_key<R: StoreReader + ?Sized>(&self, db: &R, key: &K) -> IndexResult<bool> {
        Ok(self.find(db, key)?.is_some())
    }

    /// Insert `key` unless it is already present.
    ///
    /// Returns the key's leaf address and whether it was inserted. An
    /// existing value is left alone.
    pub fn insert<W: StoreWriter + ?Sized>(
        &mut self,
        txn: &mut W,
        key: &K,
        value: &V,
    ) -> IndexResult<(Address, bool)> {
        let hash = H::hash(key)?;
        if let Some(existing) = Self::find_in(&*txn, &self.root, key, hash, 0)? {
            return Ok((existing, false));
        }
        let leaf = write_pair(txn, key, value)?;
        self.place(&*txn, hash, Placement::Insert(leaf))?;
        self.size += 1;
        Ok((leaf, true))
    }

    /// Insert `key`, replacing the value if it is already present.
    ///
    /// Returns the new leaf address and whether the key was new.
    pub fn insert_or_assign<W: StoreWriter + ?Sized>(
        &mut self,
        txn: &mut W,
        key: &K,
        value: &V,
    ) -> IndexResult<(Address, bool)> {
        let hash = H::hash(key)?;
        let Some(old) = Self::find_in(&*txn, &self.root, key, hash, 0)? else {
            return self.insert(txn, key, value);
        };
        let new = write_pair(txn, key, value)?;
        self.place(&*txn, hash, Placement::Replace { old, new })?;
        Ok((new, false))
    }

    /// Route `placement` down the path for `hash`, copying every node on the
    /// way onto the heap, then relink the copies from the bottom up.
    ///
    /// On failure the trie is left as it was.
    fn place<R: StoreReader + ?Sized>(
        &mut self,
        db: &R,
        hash: u64,
        placement: Placement,
    ) -> IndexResult<()> {
        let mut trail = ParentStack::new();
        let mut current = mem::take(&mut self.root);
        let mut shifts = 0;

        let failure = loop {
            match Self::step(db, current, hash, shifts, placement) {
                Step::Descend(parent, child) => {
                    trail.push(parent);
                    current = child;
                    shifts += HASH_INDEX_BITS;
                }
                Step::Done(placed) => {
                    current = placed;
                    break None;
                }
                Step::Failed(original, err) => {
                    current = original;
                    break Some(err);
                }
            }
        };

        while let Some(parent) = trail.pop() {
            current = match failure {
                None => parent.reattach(current),
                Some(_) => parent.restore(current),
            };
        }
        self.root = current;
        failure.map_or(Ok(()), Err)
    }

    /// One level of [`place`](Self::place): either descend into the child on
    /// the path or finish the update at this pointer.
    fn step<R: StoreReader + ?Sized>(
        db: &R,
        current: IndexPointer,
        hash: u64,
        shifts: u32,
        placement: Placement,
    ) -> Step {
        match current {
            IndexPointer::Empty => {
                debug_assert_eq!(shifts, 0, "only the root can be empty");
                match placement {
                    Placement::Insert(leaf) => {
                        let chunk = hash_chunk(hash, shifts);
                        Step::Done(InternalNode::with_child(chunk, leaf.into()).into())
                    }
                    Placement::Replace { old, .. } => Step::Failed(current, missing(old)),
                }
            }
            IndexPointer::Internal(node) => {
                debug_assert!(is_internal_depth(shifts));
                Self::enter(node, None, hash, shifts, placement)
            }
            IndexPointer::Node(addr) if is_internal_depth(shifts) => {
                match InternalNode::load(db, addr) {
                    Ok(node) => Self::enter(Box::new(node), Some(addr), hash, shifts, placement),
                    Err(err) => Step::Failed(current, err),
                }
            }
            IndexPointer::Node(addr) => match LinearNode::load(db, addr) {
                Ok(node) => Self::update_linear(Box::new(node), Some(addr), placement),
                Err(err) => Step::Failed(current, err),
            },
            IndexPointer::Linear(node) => {
                debug_assert!(!is_internal_depth(shifts));
                Self::update_linear(node, None, placement)
            }
            IndexPointer::Leaf(existing) => match placement {
                Placement::Insert(leaf) => match read_key::<_, K>(db, existing)
                    .and_then(|key| H::hash(&key))
                {
                    Ok(existing_hash) => Step::Done(branch(existing_hash, existing, hash, leaf, shifts)),
                    Err(err) => Step::Failed(current, err),
                },
                Placement::Replace { old, new } if old == existing => {
                    Step::Done(IndexPointer::Leaf(new))
                }
                Placement::Replace { old, .. } => Step::Failed(current, missing(old)),
            },
        }
    }

    /// Descend through a writable internal node, or place the leaf in it if
    /// the slot for this level's hash chunk is free.
    fn enter(
        mut node: Box<InternalNode>,
        origin: Option<Address>,
        hash: u64,
        shifts: u32,
        placement: Placement,
    ) -> Step {
        let chunk = hash_chunk(hash, shifts);
        let occupied = node.lookup(chunk).map(|(_, position)| position);
        if let Some(position) = occupied {
            let child = mem::take(node.child_mut(position));
            return Step::Descend(
                ParentEntry {
                    node,
                    position,
                    origin,
                },
                child,
            );
        }
        match placement {
            Placement::Insert(leaf) => {
                node.insert_child(chunk, leaf.into());
                Step::Done(IndexPointer::Internal(node))
            }
            Placement::Replace { old, .. } => {
                let original = match origin {
                    Some(addr) => IndexPointer::Node(addr),
                    None => IndexPointer::Internal(node),
                };
                Step::Failed(original, missing(old))
            }
        }
    }

    fn update_linear(
        mut node: Box<LinearNode>,
        origin: Option<Address>,
        placement: Placement,
    ) -> Step {
        match placement {
            Placement::Insert(leaf) => {
                let node = match origin {
                    Some(_) => Box::new(LinearNode::allocate_from(&node, leaf)),
                    None => {
                        node.push(leaf);
                        node
                    }
                };
                Step::Done(IndexPointer::Linear(node))
            }
            Placement::Replace { old, new } => {
                match node.leaves().iter().position(|&leaf| leaf == old) {
                    Some(position) => {
                        node.replace(position, new);
                        Step::Done(IndexPointer::Linear(node))
                    }
                    None => {
                        let original = match origin {
                            Some(addr) => IndexPointer::Node(addr),
                            None => IndexPointer::Linear(node),
                        };
                        Step::Failed(original, missing(old))
                    }
                }
            }
        }
    }

    /// Write every heap node to `txn`, then a header block recording the
    /// root and the key count. Returns the header's address.
    ///
    /// A map with no pending changes writes nothing and returns the header
    /// it was loaded from or last flushed to.
    pub fn flush<W: StoreWriter + ?Sized>(
        &mut self,
        txn: &mut W,
    ) -> IndexResult<TypedAddress<HeaderBlock>> {
        if let Some(header) = self.header {
            if !self.is_dirty() {
                debug!(header = %header, "index unchanged; nothing to flush");
                return Ok(header);
            }
        }

        let root = match &mut self.root {
            IndexPointer::Empty => Address::null(),
            IndexPointer::Node(addr) => *addr,
            IndexPointer::Internal(node) => node.flush(txn, 0)?,
            IndexPointer::Leaf(_) | IndexPointer::Linear(_) => {
                unreachable!("the root of a trie is always an internal node")
            }
        };
        if !root.is_null() {
            self.root = IndexPointer::Node(root);
        }

        let block = HeaderBlock {
            size: self.size,
            root,
        };
        let header = block.write(txn)?;
        debug!(header = %header, root = %root, size = self.size, "flushed index");
        self.header = Some(header);
        self.flushed = block;
        Ok(header)
    }

    /// Flush into `txn` and record the result as the named index of the
    /// revision being committed.
    ///
    /// A map that is empty and was never stored is not recorded. Returns the
    /// header address, if one was recorded.
    pub fn commit_to(
        &mut self,
        txn: &mut Transaction<'_>,
        kind: IndexKind,
    ) -> IndexResult<Option<TypedAddress<HeaderBlock>>> {
        if self.header.is_none() && self.root.is_empty() {
            return Ok(None);
        }
        let header = self.flush(txn)?;
        txn.set_index_root(kind, header.to_address());
        Ok(Some(header))
    }

    /// Every leaf address, in trie order.
    pub fn leaves<R: StoreReader + ?Sized>(&self, db: &R) -> IndexResult<Vec<Address>> {
        let mut out = Vec::with_capacity(self.size as usize);
        collect_leaves(db, &self.root, 0, &mut out)?;
        Ok(out)
    }

    /// Every key/value pair, in trie order.
    pub fn entries<R: StoreReader + ?Sized>(&self, db: &R) -> IndexResult<Vec<(K, V)>> {
        self.leaves(db)?
            .into_iter()
            .map(|leaf| read_pair(db, leaf))
            .collect()
    }

    /// Every key, in trie order.
    pub fn keys<R: StoreReader + ?Sized>(&self, db: &R) -> IndexResult<Vec<K>> {
        self.leaves(db)?
            .into_iter()
            .map(|leaf| read_key(db, leaf))
            .collect()
    }
}

impl<K, V, H> Default for HamtMap<K, V, H>
where
    K: Serialize + DeserializeOwned + PartialEq,
    V: Serialize + DeserializeOwned,
    H: KeyHash<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> fmt::Debug for HamtMap<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HamtMap")
            .field("size", &self.size)
            .field("header", &self.header)
            .field("dirty", &self.root.is_heap())
            .finish()
    }
}

fn missing(leaf: Address) -> IndexError {
    IndexError::corrupt(leaf, "leaf is no longer reachable along its key's path")
}

/// The subtree that separates two leaves whose paths meet at the level
/// starting at bit `shifts`.
///
/// Where the two hashes share a chunk the result is a chain of one-child
/// internal nodes; once the hash is exhausted it is a linear node.
fn branch(a_hash: u64, a: Address, b_hash: u64, b: Address, shifts: u32) -> IndexPointer {
    if !is_internal_depth(shifts) {
        return LinearNode::allocate(a, b).into();
    }
    let a_chunk = hash_chunk(a_hash, shifts);
    let b_chunk = hash_chunk(b_hash, shifts);
    if a_chunk == b_chunk {
        let below = branch(a_hash, a, b_hash, b, shifts + HASH_INDEX_BITS);
        InternalNode::with_child(a_chunk, below).into()
    } else {
        InternalNode::with_children(a_chunk, a.into(), b_chunk, b.into()).into()
    }
}

fn collect_leaves<R: StoreReader + ?Sized>(
    db: &R,
    ptr: &IndexPointer,
    shifts: u32,
    out: &mut Vec<Address>,
) -> IndexResult<()> {
    match ptr.resolve(db, shifts)? {
        NodeView::Empty => {}
        NodeView::Leaf(leaf) => out.push(leaf),
        NodeView::Internal(node, _) => {
            for child in node.children() {
                collect_leaves(db, child, shifts + HASH_INDEX_BITS, out)?;
            }
        }
        NodeView::Linear(node, _) => out.extend_from_slice(node.leaves()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{IdentityHash, MAX_INTERNAL_DEPTH};
    use proptest::prelude::*;
    use strata_store::{MemoryBackend, StoreConfig};

    type StrMap = HamtMap<String, String>;
    type IdMap = HamtMap<u64, u32, IdentityHash>;

    /// Every key hashes to the same value.
    struct ConstantHash;

    impl KeyHash<String> for ConstantHash {
        fn hash(_: &String) -> IndexResult<u64> {
            Ok(0x5eed)
        }
    }

    fn s(v: &str) -> String {
        v.to_string()
    }

    /// Internal-node depth of the path to `hash`, counting the root.
    fn internal_depth<R: StoreReader + ?Sized>(db: &R, root: &IndexPointer, hash: u64) -> usize {
        let mut depth = 0;
        let mut ptr = root.clone();
        let mut shifts = 0;
        loop {
            let next = match ptr.resolve(db, shifts).unwrap() {
                NodeView::Internal(node, _) => {
                    depth += 1;
                    match node.lookup(hash_chunk(hash, shifts)) {
                        Some((child, _)) => child.clone(),
                        None => return depth,
                    }
                }
                _ => return depth,
            };
            ptr = next;
            shifts += HASH_INDEX_BITS;
        }
    }

    // -----------------------------------------------------------------------
    // Lookup and insert
    // -----------------------------------------------------------------------

    #[test]
    fn empty_map() {
        let db = Database::in_memory().unwrap();
        let map = StrMap::new();
        assert!(map.is_empty());
        assert_eq!(map.find(&db, &s("a")).unwrap(), None);
        assert!(map.leaves(&db).unwrap().is_empty());
    }

    #[test]
    fn insert_and_get() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = StrMap::new();
        for i in 0..100 {
            let (_, inserted) = map.insert(&mut txn, &format!("key{i}"), &format!("value{i}")).unwrap();
            assert!(inserted);
        }
        assert_eq!(map.len(), 100);
        assert!(map.root().is_heap());
        for i in 0..100 {
            assert_eq!(map.get(&txn, &format!("key{i}")).unwrap(), Some(format!("value{i}")));
        }
        assert_eq!(map.get(&txn, &s("key100")).unwrap(), None);
        assert_eq!(map.leaves(&txn).unwrap().len(), 100);
    }

    #[test]
    fn insert_existing_key_keeps_value() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = StrMap::new();
        let (first, inserted) = map.insert(&mut txn, &s("k"), &s("one")).unwrap();
        assert!(inserted);
        let size = txn.size();
        let (again, inserted) = map.insert(&mut txn, &s("k"), &s("two")).unwrap();
        assert!(!inserted);
        assert_eq!(again, first);
        assert_eq!(txn.size(), size);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&txn, &s("k")).unwrap(), Some(s("one")));
    }

    #[test]
    fn insert_or_assign_replaces_value() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = StrMap::new();
        map.insert(&mut txn, &s("a"), &s("1")).unwrap();
        map.insert(&mut txn, &s("b"), &s("2")).unwrap();
        let old = map.flush(&mut txn).unwrap();

        let (_, inserted) = map.insert_or_assign(&mut txn, &s("a"), &s("changed")).unwrap();
        assert!(!inserted);
        let (_, inserted) = map.insert_or_assign(&mut txn, &s("c"), &s("3")).unwrap();
        assert!(inserted);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&txn, &s("a")).unwrap(), Some(s("changed")));
        map.flush(&mut txn).unwrap();

        let before = StrMap::load(&txn, old).unwrap();
        assert_eq!(before.get(&txn, &s("a")).unwrap(), Some(s("1")));
        assert_eq!(before.get(&txn, &s("c")).unwrap(), None);
    }

    #[test]
    fn paths_that_share_a_chunk_build_a_chain() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = IdMap::new();
        let (a, _) = map.insert(&mut txn, &0x01, &1).unwrap();
        let (b, _) = map.insert(&mut txn, &0x41, &2).unwrap();

        // Root: slot 1 -> internal node with slots 0 and 1.
        let IndexPointer::Internal(root) = map.root() else {
            panic!("root should be a heap node");
        };
        assert_eq!(root.bitmap(), 1 << 1);
        let (IndexPointer::Internal(level1), _) = root.lookup(1).unwrap() else {
            panic!("expected an internal node below the root");
        };
        assert_eq!(level1.bitmap(), 0b11);
        assert_eq!(level1.children(), &[IndexPointer::Leaf(a), IndexPointer::Leaf(b)]);

        let header = map.flush(&mut txn).unwrap();
        txn.commit().unwrap();
        let map = IdMap::load(&db, header).unwrap();
        assert_eq!(map.find(&db, &0x01).unwrap(), Some(a));
        assert_eq!(map.find(&db, &0x41).unwrap(), Some(b));
        assert_eq!(map.get(&db, &0x41).unwrap(), Some(2));
        assert_eq!(map.find(&db, &0x81).unwrap(), None);
    }

    #[test]
    fn leaves_follow_chunk_order() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = IdMap::new();
        for key in [5u64, 3, 63, 0] {
            map.insert(&mut txn, &key, &0).unwrap();
        }
        assert_eq!(map.keys(&txn).unwrap(), vec![0, 3, 5, 63]);
    }

    // -----------------------------------------------------------------------
    // Collisions
    // -----------------------------------------------------------------------

    #[test]
    fn full_hash_collisions_use_a_linear_node() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = HamtMap::<String, u32, ConstantHash>::new();
        for (i, key) in ["x", "y", "z"].iter().enumerate() {
            map.insert(&mut txn, &s(key), &(i as u32)).unwrap();
        }
        assert_eq!(internal_depth(&txn, map.root(), 0x5eed), MAX_INTERNAL_DEPTH);
        for (i, key) in ["x", "y", "z"].iter().enumerate() {
            assert_eq!(map.get(&txn, &s(key)).unwrap(), Some(i as u32));
        }
        assert_eq!(map.get(&txn, &s("w")).unwrap(), None);

        let header = map.flush(&mut txn).unwrap();
        txn.commit().unwrap();

        let mut map = HamtMap::<String, u32, ConstantHash>::load(&db, header).unwrap();
        assert_eq!(map.get(&db, &s("y")).unwrap(), Some(1));

        // Grow the stored linear node.
        let mut txn = db.begin().unwrap();
        map.insert(&mut txn, &s("w"), &3).unwrap();
        map.insert_or_assign(&mut txn, &s("x"), &10).unwrap();
        let header = map.flush(&mut txn).unwrap();
        txn.commit().unwrap();

        let map = HamtMap::<String, u32, ConstantHash>::load(&db, header).unwrap();
        assert_eq!(map.len(), 4);
        let mut entries = map.entries(&db).unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![(s("w"), 3), (s("x"), 10), (s("y"), 1), (s("z"), 2)]
        );
    }

    #[test]
    fn hashes_differing_only_in_the_top_bits() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = IdMap::new();
        let low = 0x0fff_ffff_ffff_ffff;
        map.insert(&mut txn, &low, &1).unwrap();
        map.insert(&mut txn, &(low | 1 << 63), &2).unwrap();
        assert_eq!(internal_depth(&txn, map.root(), low), MAX_INTERNAL_DEPTH);
        assert_eq!(map.get(&txn, &low).unwrap(), Some(1));
        assert_eq!(map.get(&txn, &(low | 1 << 63)).unwrap(), Some(2));
    }

    // -----------------------------------------------------------------------
    // Flush and structural sharing
    // -----------------------------------------------------------------------

    #[test]
    fn flush_twice_writes_nothing_more() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = StrMap::new();
        map.insert(&mut txn, &s("a"), &s("b")).unwrap();
        let first = map.flush(&mut txn).unwrap();
        assert!(!map.is_dirty());
        let size = txn.size();
        assert_eq!(map.flush(&mut txn).unwrap(), first);
        assert_eq!(txn.size(), size);
        txn.commit().unwrap();

        let mut reopened = StrMap::load(&db, first).unwrap();
        let mut txn = db.begin().unwrap();
        assert_eq!(reopened.flush(&mut txn).unwrap(), first);
        assert_eq!(txn.size(), 0);
    }

    #[test]
    fn flushed_nodes_point_downwards() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = IdMap::new();
        for key in 0..500u64 {
            map.insert(&mut txn, &(key.wrapping_mul(0x9e37_79b9_7f4a_7c15)), &0).unwrap();
        }
        let header = map.flush(&mut txn).unwrap();
        txn.commit().unwrap();

        fn check(db: &Database, ptr: &IndexPointer, shifts: u32) {
            if let NodeView::Internal(node, Some(addr)) = ptr.resolve(db, shifts).unwrap() {
                for child in node.children() {
                    assert!(child.address().unwrap() < addr);
                    check(db, child, shifts + HASH_INDEX_BITS);
                }
            }
        }
        let map = IdMap::load(&db, header).unwrap();
        assert!(map.root().address().unwrap() < header.to_address());
        check(&db, map.root(), 0);
        assert_eq!(map.leaves(&db).unwrap().len(), 500);
    }

    #[test]
    fn one_insert_copies_only_its_path() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = StrMap::new();
        for i in 0..1000 {
            map.insert(&mut txn, &format!("key{i}"), &s("v")).unwrap();
        }
        let old_header = map.flush(&mut txn).unwrap();
        txn.commit().unwrap();

        let mut txn = db.begin().unwrap();
        map.insert(&mut txn, &s("newcomer"), &s("v")).unwrap();
        let before_flush = txn.size();
        let depth = internal_depth(&txn, map.root(), Blake3Hash::hash(&s("newcomer")).unwrap());
        map.flush(&mut txn).unwrap();

        // At most one full-width node per level, plus the header block.
        let node_bytes = txn.size() - before_flush;
        assert!(node_bytes <= depth as u64 * (16 + 64 * 8) + 24, "{node_bytes} bytes for depth {depth}");
        assert!(depth <= 5);
        txn.commit().unwrap();

        let old = StrMap::load(&db, old_header).unwrap();
        assert_eq!(old.len(), 1000);
        assert_eq!(old.find(&db, &s("newcomer")).unwrap(), None);
        assert_eq!(old.get(&db, &s("key999")).unwrap(), Some(s("v")));
        assert_eq!(map.len(), 1001);
        assert!(map.contains_key(&db, &s("newcomer")).unwrap());
    }

    #[test]
    fn revert_discards_heap_changes() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = StrMap::new();
        map.insert(&mut txn, &s("kept"), &s("1")).unwrap();
        let header = map.flush(&mut txn).unwrap();
        map.insert(&mut txn, &s("dropped"), &s("2")).unwrap();
        assert!(map.is_dirty());

        map.revert();
        assert!(!map.is_dirty());
        assert_eq!(map.len(), 1);
        assert_eq!(map.find(&txn, &s("dropped")).unwrap(), None);
        assert_eq!(map.flush(&mut txn).unwrap(), header);
    }

    #[test]
    fn commit_to_records_the_index() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let mut empty = StrMap::new();
        assert_eq!(empty.commit_to(&mut txn, IndexKind::Name).unwrap(), None);

        let mut map = StrMap::new();
        map.insert(&mut txn, &s("a"), &s("b")).unwrap();
        let header = map.commit_to(&mut txn, IndexKind::Write).unwrap().unwrap();
        let rev = txn.commit().unwrap();

        assert_eq!(db.index_root(IndexKind::Write, rev).unwrap(), Some(header.to_address()));
        assert_eq!(db.index_root(IndexKind::Name, rev).unwrap(), None);
        let reopened = StrMap::open(&db, IndexKind::Write, rev).unwrap();
        assert_eq!(reopened.get(&db, &s("a")).unwrap(), Some(s("b")));
        assert!(StrMap::open(&db, IndexKind::Write, 0).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Corruption
    // -----------------------------------------------------------------------

    #[test]
    fn corrupt_root_is_detected_on_load() {
        let backend = MemoryBackend::new();
        let db = Database::open(backend.clone(), StoreConfig::default()).unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = StrMap::new();
        map.insert(&mut txn, &s("a"), &s("b")).unwrap();
        let header = map.flush(&mut txn).unwrap();
        txn.commit().unwrap();
        let root = map.root().address().unwrap();
        drop(db);

        backend.corrupt(root.absolute() as usize, b"garbage!");
        let db = Database::open(backend, StoreConfig::default()).unwrap();
        let err = StrMap::load(&db, header).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { addr, .. } if addr == root));
    }

    #[test]
    fn failed_insert_leaves_the_trie_unchanged() {
        let backend = MemoryBackend::new();
        let db = Database::open(backend.clone(), StoreConfig::default()).unwrap();
        let mut txn = db.begin().unwrap();
        let mut map = IdMap::new();
        map.insert(&mut txn, &0x01, &1).unwrap();
        map.insert(&mut txn, &0x41, &2).unwrap();
        let header = map.flush(&mut txn).unwrap();
        txn.commit().unwrap();

        let IndexPointer::Node(root) = *map.root() else {
            panic!("root should be stored");
        };
        let level1 = InternalNode::load(&db, root).unwrap().children()[0]
            .address()
            .unwrap();
        drop(db);
        backend.corrupt(level1.absolute() as usize, b"garbage!");

        let db = Database::open(backend, StoreConfig::default()).unwrap();
        let mut map = IdMap::load(&db, header).unwrap();
        let mut txn = db.begin().unwrap();
        assert!(map.insert(&mut txn, &0x81, &3).is_err());
        assert_eq!(map.root(), &IndexPointer::Node(root));
        assert!(!map.is_dirty());
        assert_eq!(map.len(), 2);
        // Keys off the damaged path are still reachable.
        assert!(map.insert(&mut txn, &0x02, &4).unwrap().1);
    }

    // -----------------------------------------------------------------------
    // Randomized round trips
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn reopened_map_finds_every_key(
            batches in prop::collection::vec(prop::collection::vec(any::<u64>(), 0..40), 1..4),
            probe in any::<u64>(),
        ) {
            let backend = MemoryBackend::new();
            let db = Database::open(backend.clone(), StoreConfig::default()).unwrap();
            let mut expected = std::collections::BTreeMap::new();
            let mut map = HamtMap::<u64, u64>::new();
            for batch in &batches {
                let mut txn = db.begin().unwrap();
                for &key in batch {
                    map.insert_or_assign(&mut txn, &key, &key.rotate_left(7)).unwrap();
                    expected.insert(key, key.rotate_left(7));
                }
                map.commit_to(&mut txn, IndexKind::Write).unwrap();
                txn.commit().unwrap();
            }
            drop(db);

            let db = Database::open(backend, StoreConfig::default()).unwrap();
            let map = HamtMap::<u64, u64>::open(&db, IndexKind::Write, db.current_revision()).unwrap();
            prop_assert_eq!(map.len(), expected.len() as u64);
            for (key, value) in &expected {
                prop_assert_eq!(map.get(&db, key).unwrap(), Some(*value));
            }
            if !expected.contains_key(&probe) {
                prop_assert_eq!(map.find(&db, &probe).unwrap(), None);
            }
            let mut keys = map.keys(&db).unwrap();
            keys.sort_unstable();
            prop_assert_eq!(keys, expected.keys().copied().collect::<Vec<_>>());
        }
    }
}
