use std::cmp::Ordering;

use crate::hash::{HashProvider, HashWords};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ordered key set. A key's position is its edge id during construction.
///
/// Integer keys are hashed through their little-endian bytes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySet {
    Bytes(Vec<Vec<u8>>),
    U32(Vec<u32>),
}

impl KeySet {
    pub fn from_bytes<K, I>(keys: I) -> Self
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        KeySet::Bytes(keys.into_iter().map(|k| k.as_ref().to_vec()).collect())
    }

    pub fn from_u32<I: IntoIterator<Item = u32>>(keys: I) -> Self {
        KeySet::U32(keys.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        match self {
            KeySet::Bytes(k) => k.len(),
            KeySet::U32(k) => k.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn hash<H: HashProvider + ?Sized>(&self, i: usize, hasher: &H, seed: u64) -> HashWords {
        match self {
            KeySet::Bytes(k) => hasher.compute(&k[i], seed),
            KeySet::U32(k) => hasher.compute(&k[i].to_le_bytes(), seed),
        }
    }

    /// Total order on key content: length first, then bytes (or the integer
    /// value).
    pub fn cmp_keys(&self, a: usize, b: usize) -> Ordering {
        match self {
            KeySet::Bytes(k) => {
                let (x, y) = (&k[a], &k[b]);
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            KeySet::U32(k) => k[a].cmp(&k[b]),
        }
    }

    /// Does key `i` equal `probe`? Integer keys compare against their
    /// little-endian bytes.
    pub fn matches(&self, i: usize, probe: &[u8]) -> bool {
        match self {
            KeySet::Bytes(k) => k.get(i).is_some_and(|key| key.as_slice() == probe),
            KeySet::U32(k) => k.get(i).is_some_and(|key| key.to_le_bytes() == probe),
        }
    }

    /// Keys rearranged so that slot `j` holds the key at position `order[j]`.
    pub(crate) fn permuted(&self, order: &[u32]) -> KeySet {
        match self {
            KeySet::Bytes(k) => KeySet::Bytes(order.iter().map(|&i| k[i as usize].clone()).collect()),
            KeySet::U32(k) => KeySet::U32(order.iter().map(|&i| k[i as usize]).collect()),
        }
    }

    /// Printable form of key `i`, for diagnostics.
    pub fn display(&self, i: usize) -> String {
        match self {
            KeySet::Bytes(k) => String::from_utf8_lossy(&k[i]).into_owned(),
            KeySet::U32(k) => k[i].to_string(),
        }
    }
}
