use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{Address, TypedAddress};

/// Marker type for raw, uninterpreted byte ranges in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blob {}

/// A variable-length stored object: where it starts and how many bytes it
/// occupies.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Extent<T> {
    pub addr: TypedAddress<T>,
    pub size: u64,
}

impl<T> Extent<T> {
    /// Create an extent.
    pub const fn new(addr: TypedAddress<T>, size: u64) -> Self {
        Self { addr, size }
    }

    /// An empty extent at the null address.
    pub const fn null() -> Self {
        Self::new(TypedAddress::null(), 0)
    }

    /// Returns `true` if the extent covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The first address past the end of the extent.
    pub fn end(&self) -> Address {
        self.addr.to_address() + self.size
    }
}

impl<T> Clone for Extent<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Extent<T> {}

impl<T> PartialEq for Extent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.size == other.size
    }
}

impl<T> Eq for Extent<T> {}

impl<T> fmt::Debug for Extent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extent")
            .field("addr", &self.addr)
            .field("size", &self.size)
            .finish()
    }
}

impl<T> fmt::Display for Extent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.addr, self.size)
    }
}
