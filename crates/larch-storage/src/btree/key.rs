//! Index keys and key comparison.

use std::cmp::Ordering;

/// Size of an index key on a page, in bytes.
pub const KEY_SIZE: usize = 8;

/// A fixed-size index key.
///
/// The bytes are opaque to the tree; ordering comes exclusively from the
/// [`KeyComparator`] the tree was constructed with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexKey(pub [u8; KEY_SIZE]);

impl IndexKey {
    /// Builds a key from an i64 (little-endian bytes, the encoding
    /// [`Int64Comparator`] expects).
    pub fn from_i64(value: i64) -> Self {
        Self(value.to_le_bytes())
    }

    /// Interprets the key bytes as an i64.
    pub fn to_i64(&self) -> i64 {
        i64::from_le_bytes(self.0)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IndexKey({})", self.to_i64())
    }
}

impl std::fmt::Display for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_i64())
    }
}

/// A total order over index keys.
pub trait KeyComparator: Send + Sync {
    /// Compares two keys.
    fn compare(&self, a: &IndexKey, b: &IndexKey) -> Ordering;
}

/// Compares keys as little-endian signed 64-bit integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Int64Comparator;

impl KeyComparator for Int64Comparator {
    #[inline]
    fn compare(&self, a: &IndexKey, b: &IndexKey) -> Ordering {
        a.to_i64().cmp(&b.to_i64())
    }
}
