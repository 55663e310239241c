use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// An absolute byte offset into a store.
///
/// Stores only ever grow, so an address stays valid for the lifetime of the
/// store once the record it refers to has been committed. The value `0` is
/// reserved to mean "no address": offset zero is always occupied by the
/// store's file header, so no record can ever live there.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(u64);

impl Address {
    /// Create an address from an absolute offset.
    pub const fn new(absolute: u64) -> Self {
        Self(absolute)
    }

    /// The null address. Represents "no address".
    pub const fn null() -> Self {
        Self(0)
    }

    /// Returns `true` if this is the null address.
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The absolute offset.
    pub const fn absolute(&self) -> u64 {
        self.0
    }

    /// Round this address up to the next multiple of `align`.
    ///
    /// `align` must be a power of two.
    pub fn align_up(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        Self((self.0 + align - 1) & !(align - 1))
    }

    /// Returns `true` if the address is a multiple of `align`.
    pub fn is_aligned(&self, align: u64) -> bool {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        self.0 & (align - 1) == 0
    }

    /// Parse an address written either in decimal or as `0x`-prefixed hex.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(Self)
            .map_err(|e| TypeError::InvalidAddress(format!("{s}: {e}")))
    }
}

impl Add<u64> for Address {
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(absolute: u64) -> Self {
        Self(absolute)
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

/// An address tagged with the type of record stored there.
///
/// The tag is purely a compile-time device: it keeps, say, the address of an
/// index header from being passed where the address of a trie node is
/// expected. Converting to and from a plain [`Address`] is free.
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct TypedAddress<T> {
    addr: Address,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedAddress<T> {
    /// Wrap a plain address.
    pub const fn new(addr: Address) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    /// Build a typed address from an absolute offset.
    pub const fn make(absolute: u64) -> Self {
        Self::new(Address::new(absolute))
    }

    /// The null typed address.
    pub const fn null() -> Self {
        Self::new(Address::null())
    }

    /// Returns `true` if this is the null address.
    pub const fn is_null(&self) -> bool {
        self.addr.is_null()
    }

    /// Strip the type tag.
    pub const fn to_address(&self) -> Address {
        self.addr
    }

    /// The absolute offset.
    pub const fn absolute(&self) -> u64 {
        self.addr.absolute()
    }
}

impl<T> Clone for TypedAddress<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedAddress<T> {}

impl<T> Default for TypedAddress<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> PartialEq for TypedAddress<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for TypedAddress<T> {}

impl<T> PartialOrd for TypedAddress<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TypedAddress<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr.cmp(&other.addr)
    }
}

impl<T> Hash for TypedAddress<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl<T> fmt::Debug for TypedAddress<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedAddress({:#x})", self.addr.absolute())
    }
}

impl<T> fmt::Display for TypedAddress<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.addr, f)
    }
}

impl<T> From<Address> for TypedAddress<T> {
    fn from(addr: Address) -> Self {
        Self::new(addr)
    }
}

impl<T> From<TypedAddress<T>> for Address {
    fn from(addr: TypedAddress<T>) -> Self {
        addr.addr
    }
}
