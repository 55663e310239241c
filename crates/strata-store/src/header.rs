//! The file header: the only bytes of a store that are ever rewritten.

use strata_types::TypedAddress;

use crate::error::{StoreError, StoreResult};
use crate::footer::{read_u32, read_u64, Footer};

/// Size of the encoded header.
pub const HEADER_SIZE: u64 = 24;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_SIGNATURE: [u8; 8] = *b"StrataH1";

/// The file header at offset zero.
///
/// On-disk format:
/// ```text
/// [8 bytes: signature "StrataH1"]
/// [4 bytes: format version (little-endian u32)]
/// [4 bytes: reserved, zero]
/// [8 bytes: address of the latest footer (little-endian u64)]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub footer_pos: TypedAddress<Footer>,
}

impl FileHeader {
    /// A header pointing at the given footer.
    pub fn new(footer_pos: TypedAddress<Footer>) -> Self {
        Self {
            version: FORMAT_VERSION,
            footer_pos,
        }
    }

    /// Encode to the on-disk layout.
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&HEADER_SIGNATURE);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[16..24].copy_from_slice(&self.footer_pos.absolute().to_le_bytes());
        buf
    }

    /// Decode and validate a header.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(StoreError::CorruptHeader(format!(
                "expected {HEADER_SIZE} bytes, found {}",
                bytes.len()
            )));
        }
        if bytes[0..8] != HEADER_SIGNATURE {
            return Err(StoreError::CorruptHeader(format!(
                "bad signature {:?}",
                String::from_utf8_lossy(&bytes[0..8])
            )));
        }
        let version = read_u32(bytes, 8);
        if version != FORMAT_VERSION {
            return Err(StoreError::CorruptHeader(format!(
                "unsupported format version {version}"
            )));
        }
        let footer_pos = read_u64(bytes, 16);
        if footer_pos < HEADER_SIZE {
            return Err(StoreError::CorruptHeader(format!(
                "footer position {footer_pos:#x} overlaps the header"
            )));
        }
        Ok(Self {
            version,
            footer_pos: TypedAddress::make(footer_pos),
        })
    }
}
