use strata_types::Address;

use crate::error::StoreResult;

/// Read-only access to store bytes.
///
/// Implemented by [`Database`](crate::Database) (committed bytes) and by
/// [`Transaction`](crate::Transaction) (committed bytes plus the transaction's
/// own uncommitted tail).
///
/// Reads are all-or-nothing: a request that is not entirely inside the
/// readable range fails with [`StoreError::OutOfRange`](crate::StoreError::OutOfRange).
pub trait StoreReader {
    /// Copy `size` bytes starting at `addr`.
    fn read(&self, addr: Address, size: u64) -> StoreResult<Vec<u8>>;

    /// Read a little-endian `u64` at `addr`.
    fn read_u64(&self, addr: Address) -> StoreResult<u64> {
        let bytes = self.read(addr, 8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(arr))
    }
}

/// Append-only allocation within an open transaction.
pub trait StoreWriter: StoreReader {
    /// Reserve `size` bytes aligned to `align` and return their address along
    /// with the writable memory. The memory is zero-filled.
    fn alloc_rw(&mut self, size: u64, align: u64) -> StoreResult<(Address, &mut [u8])>;

    /// Copy `bytes` into newly allocated space and return its address.
    fn append_bytes(&mut self, align: u64, bytes: &[u8]) -> StoreResult<Address> {
        let (addr, buf) = self.alloc_rw(bytes.len() as u64, align)?;
        buf.copy_from_slice(bytes);
        Ok(addr)
    }
}
