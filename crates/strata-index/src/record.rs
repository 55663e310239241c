//! Leaf records: the serialized key/value pairs a trie's leaves point at.
//!
//! ```text
//! [u32 key length][u32 value length][key (bincode)][value (bincode)]
//! ```
//!
//! Records start on an 8-byte boundary so a leaf address never collides with
//! the tag bits of an on-disk child pointer.

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_store::{StoreReader, StoreWriter};
use strata_types::Address;

use crate::error::{IndexError, IndexResult};

/// Alignment of every leaf record.
pub const RECORD_ALIGN: u64 = 8;

const PREFIX_SIZE: u64 = 8;

struct Prefix {
    key_len: u64,
    value_len: u64,
}

fn read_prefix<R: StoreReader + ?Sized>(db: &R, addr: Address) -> IndexResult<Prefix> {
    if !addr.is_aligned(RECORD_ALIGN) {
        return Err(IndexError::corrupt(addr, "misaligned leaf record"));
    }
    let bytes = db.read(addr, PREFIX_SIZE)?;
    let key_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let value_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok(Prefix {
        key_len: key_len.into(),
        value_len: value_len.into(),
    })
}

/// Write `key` and `value` as a new leaf record and return its address.
pub fn write_pair<W, K, V>(txn: &mut W, key: &K, value: &V) -> IndexResult<Address>
where
    W: StoreWriter + ?Sized,
    K: Serialize + ?Sized,
    V: Serialize + ?Sized,
{
    let key_bytes = bincode::serialize(key)?;
    let value_bytes = bincode::serialize(value)?;
    let key_len = u32::try_from(key_bytes.len())
        .map_err(|_| IndexError::Serialization("key longer than 4 GiB".into()))?;
    let value_len = u32::try_from(value_bytes.len())
        .map_err(|_| IndexError::Serialization("value longer than 4 GiB".into()))?;

    let size = PREFIX_SIZE + u64::from(key_len) + u64::from(value_len);
    let (addr, buf) = txn.alloc_rw(size, RECORD_ALIGN)?;
    let (prefix, body) = buf.split_at_mut(PREFIX_SIZE as usize);
    prefix[..4].copy_from_slice(&key_len.to_le_bytes());
    prefix[4..].copy_from_slice(&value_len.to_le_bytes());
    let (k, v) = body.split_at_mut(key_bytes.len());
    k.copy_from_slice(&key_bytes);
    v.copy_from_slice(&value_bytes);
    Ok(addr)
}

/// Decode the key of the record at `addr`.
pub fn read_key<R, K>(db: &R, addr: Address) -> IndexResult<K>
where
    R: StoreReader + ?Sized,
    K: DeserializeOwned,
{
    let prefix = read_prefix(db, addr)?;
    let bytes = db.read(addr + PREFIX_SIZE, prefix.key_len)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Decode the value of the record at `addr`.
pub fn read_value<R, V>(db: &R, addr: Address) -> IndexResult<V>
where
    R: StoreReader + ?Sized,
    V: DeserializeOwned,
{
    let prefix = read_prefix(db, addr)?;
    let bytes = db.read(addr + PREFIX_SIZE + prefix.key_len, prefix.value_len)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Decode both halves of the record at `addr`.
pub fn read_pair<R, K, V>(db: &R, addr: Address) -> IndexResult<(K, V)>
where
    R: StoreReader + ?Sized,
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let prefix = read_prefix(db, addr)?;
    let bytes = db.read(addr + PREFIX_SIZE, prefix.key_len + prefix.value_len)?;
    let (k, v) = bytes.split_at(prefix.key_len as usize);
    Ok((bincode::deserialize(k)?, bincode::deserialize(v)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::Database;

    #[test]
    fn pair_roundtrip() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let addr = write_pair(&mut txn, "greeting", &vec![1u32, 2, 3]).unwrap();
        assert!(addr.is_aligned(RECORD_ALIGN));

        let key: String = read_key(&txn, addr).unwrap();
        let value: Vec<u32> = read_value(&txn, addr).unwrap();
        assert_eq!(key, "greeting");
        assert_eq!(value, vec![1, 2, 3]);

        let (k, v): (String, Vec<u32>) = read_pair(&txn, addr).unwrap();
        assert_eq!((k.as_str(), v.len()), ("greeting", 3));
    }

    #[test]
    fn records_survive_commit() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        txn.append_bytes(1, b"x").unwrap();
        let addr = write_pair(&mut txn, &42u64, &()).unwrap();
        assert!(addr.is_aligned(RECORD_ALIGN));
        txn.commit().unwrap();

        let key: u64 = read_key(&db, addr).unwrap();
        assert_eq!(key, 42);
        let (): () = read_value(&db, addr).unwrap();
    }

    #[test]
    fn misaligned_record_is_corrupt() {
        let db = Database::in_memory().unwrap();
        let err = read_key::<_, u64>(&db, Address::new(27)).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[test]
    fn truncated_record_fails() {
        let db = Database::in_memory().unwrap();
        let mut txn = db.begin().unwrap();
        let (addr, buf) = txn.alloc_rw(8, RECORD_ALIGN).unwrap();
        buf[..4].copy_from_slice(&100u32.to_le_bytes());
        let err = read_key::<_, String>(&txn, addr).unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
    }
}
