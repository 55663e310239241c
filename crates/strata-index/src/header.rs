use strata_store::{StoreReader, StoreWriter};
use strata_types::{Address, TypedAddress};

use crate::error::{IndexError, IndexResult};
use crate::internal::NODE_ALIGN;
use crate::pointer::{read_u64, IndexPointer};

pub const HEADER_SIGNATURE: [u8; 8] = *b"IndxHead";

/// Size of a stored header block.
pub const HEADER_BLOCK_SIZE: u64 = 24;

/// The per-index record a revision points at: key count and root node.
///
/// ```text
/// [signature "IndxHead"][u64 size][u64 root]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderBlock {
    pub size: u64,
    /// Address of the root internal node, or null for an empty index.
    pub root: Address,
}

impl HeaderBlock {
    pub fn encode(&self) -> [u8; HEADER_BLOCK_SIZE as usize] {
        let mut buf = [0u8; HEADER_BLOCK_SIZE as usize];
        buf[..8].copy_from_slice(&HEADER_SIGNATURE);
        buf[8..16].copy_from_slice(&self.size.to_le_bytes());
        let root = if self.root.is_null() {
            IndexPointer::Empty
        } else {
            IndexPointer::Node(self.root)
        };
        buf[16..24].copy_from_slice(&root.to_raw().to_le_bytes());
        buf
    }

    pub fn write<W: StoreWriter + ?Sized>(&self, txn: &mut W) -> IndexResult<TypedAddress<Self>> {
        Ok(txn.append_bytes(NODE_ALIGN, &self.encode())?.into())
    }

    /// Read the header at `addr`. The root must be a stored node below it.
    pub fn load<R: StoreReader + ?Sized>(db: &R, addr: TypedAddress<Self>) -> IndexResult<Self> {
        let addr = addr.to_address();
        let bytes = db.read(addr, HEADER_BLOCK_SIZE)?;
        if bytes[..8] != HEADER_SIGNATURE {
            return Err(IndexError::corrupt(addr, "bad index header signature"));
        }
        let size = read_u64(&bytes, 8);
        let root = match IndexPointer::from_raw(addr, read_u64(&bytes, 16))? {
            IndexPointer::Empty if size == 0 => Address::null(),
            IndexPointer::Node(root) if root < addr => root,
            other => {
                return Err(IndexError::corrupt(
                    addr,
                    format!("invalid root {other:?} for an index of {size} keys"),
                ))
            }
        };
        Ok(Self { size, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::Database;

    #[test]
    fn write_and_load() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let root = txn.append_bytes(8, &[0u8; 24]).unwrap();
        let header = HeaderBlock { size: 3, root };
        let addr = header.write(&mut txn).unwrap();
        assert_eq!(HeaderBlock::load(&txn, addr).unwrap(), header);
        // The root is stored tagged.
        let raw = txn.read_u64(addr.to_address() + 16).unwrap();
        assert_eq!(raw, root.absolute() | 1);
    }

    #[test]
    fn empty_index() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let header = HeaderBlock {
            size: 0,
            root: Address::null(),
        };
        let addr = header.write(&mut txn).unwrap();
        assert_eq!(HeaderBlock::load(&txn, addr).unwrap(), header);
    }

    #[test]
    fn root_above_header_is_corrupt() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let header = HeaderBlock {
            size: 1,
            root: Address::new(1 << 30),
        };
        let addr = header.write(&mut txn).unwrap();
        assert!(matches!(
            HeaderBlock::load(&txn, addr),
            Err(IndexError::Corrupt { .. })
        ));
    }
}
