//! Revision footers: the generation chain.
//!
//! Each committed transaction ends with a footer recording the revision
//! number, the address of the previous footer, and the header-block address
//! of every named index as of that revision. Following `prev` from the
//! latest footer visits every revision in descending order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strata_types::{Address, RevisionNumber, TypedAddress};

use crate::error::{StoreError, StoreResult};

/// Size of an encoded footer.
pub const FOOTER_SIZE: u64 = 64;

/// Number of named indices recorded in each footer.
pub const NUM_INDICES: usize = 3;

const FOOTER_SIGNATURE: [u8; 8] = *b"StrataF1";

/// The named indices whose roots are recorded per revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Name → extent of data written with `write`.
    Write,
    /// 128-bit digest → extent.
    Digest,
    /// Set of interned names.
    Name,
}

impl IndexKind {
    /// All index kinds in footer slot order.
    pub const ALL: [IndexKind; NUM_INDICES] = [IndexKind::Write, IndexKind::Digest, IndexKind::Name];

    /// Footer slot for this index.
    pub fn slot(&self) -> usize {
        match self {
            Self::Write => 0,
            Self::Digest => 1,
            Self::Name => 2,
        }
    }

    /// Lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Digest => "digest",
            Self::Name => "name",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown index '{s}'"))
    }
}

/// The per-revision generation record.
///
/// On-disk format (little-endian):
/// ```text
/// [ 0.. 8: signature "StrataF1"]
/// [ 8..12: revision number (u32)]
/// [12..16: CRC32 of bytes 16..64 (u32)]
/// [16..24: bytes of data written by the transaction, excluding this footer]
/// [24..32: address of the previous footer, 0 for revision 0]
/// [32..40: commit time, milliseconds since the Unix epoch]
/// [40..64: header-block address of each named index, 0 if absent]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    pub revision: RevisionNumber,
    pub size: u64,
    pub prev: TypedAddress<Footer>,
    pub time_ms: u64,
    pub index_records: [Address; NUM_INDICES],
}

impl Footer {
    /// The footer of revision zero: an empty store.
    pub fn genesis(time_ms: u64) -> Self {
        Self {
            revision: 0,
            size: 0,
            prev: TypedAddress::null(),
            time_ms,
            index_records: [Address::null(); NUM_INDICES],
        }
    }

    /// Header-block address of an index, if it has ever been written.
    pub fn index_root(&self, kind: IndexKind) -> Option<Address> {
        let addr = self.index_records[kind.slot()];
        (!addr.is_null()).then_some(addr)
    }

    /// Encode to the on-disk layout.
    pub fn encode(&self) -> [u8; FOOTER_SIZE as usize] {
        let mut buf = [0u8; FOOTER_SIZE as usize];
        buf[0..8].copy_from_slice(&FOOTER_SIGNATURE);
        buf[8..12].copy_from_slice(&self.revision.to_le_bytes());
        buf[16..24].copy_from_slice(&self.size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.prev.absolute().to_le_bytes());
        buf[32..40].copy_from_slice(&self.time_ms.to_le_bytes());
        for (i, addr) in self.index_records.iter().enumerate() {
            let at = 40 + i * 8;
            buf[at..at + 8].copy_from_slice(&addr.absolute().to_le_bytes());
        }
        let crc = crc32fast::hash(&buf[16..]);
        buf[12..16].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode and validate a footer read from `addr`.
    ///
    /// Checks the signature, the checksum, and that the previous footer and
    /// every index record lie strictly below `addr`.
    pub fn decode(addr: Address, bytes: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: String| StoreError::CorruptFooter { addr, reason };

        if bytes.len() < FOOTER_SIZE as usize {
            return Err(corrupt(format!("expected {FOOTER_SIZE} bytes, found {}", bytes.len())));
        }
        if bytes[0..8] != FOOTER_SIGNATURE {
            return Err(corrupt("bad signature".into()));
        }
        let expected_crc = read_u32(bytes, 12);
        let actual_crc = crc32fast::hash(&bytes[16..FOOTER_SIZE as usize]);
        if expected_crc != actual_crc {
            return Err(corrupt(format!(
                "checksum mismatch: expected {expected_crc:#010x}, computed {actual_crc:#010x}"
            )));
        }

        let prev = read_u64(bytes, 24);
        if prev >= addr.absolute() {
            return Err(corrupt(format!("previous footer {prev:#x} is not below this footer")));
        }
        let mut index_records = [Address::null(); NUM_INDICES];
        for (i, slot) in index_records.iter_mut().enumerate() {
            let raw = read_u64(bytes, 40 + i * 8);
            if raw >= addr.absolute() {
                return Err(corrupt(format!("index record {i} at {raw:#x} is not below this footer")));
            }
            *slot = Address::new(raw);
        }

        Ok(Self {
            revision: read_u32(bytes, 8),
            size: read_u64(bytes, 16),
            prev: TypedAddress::make(prev),
            time_ms: read_u64(bytes, 32),
            index_records,
        })
    }
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
