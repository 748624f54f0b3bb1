use std::collections::TryReserveError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Allocate a vector of `len` copies of `value`, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, value);
    Ok(v)
}

#[derive(Debug)]
pub struct BitSet {
    bits: Vec<u64>,
    n: usize,
}
impl BitSet {
    pub fn new(n: usize) -> Result<Self, TryReserveError> {
        let words = n.div_ceil(64);
        Ok(Self { bits: try_vec(words, 0)?, n })
    }
    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        debug_assert!(idx < self.n);
        let (w, b) = (idx / 64, idx % 64);
        (self.bits[w] >> b) & 1 == 1
    }
    #[inline]
    pub fn set(&mut self, idx: usize) {
        debug_assert!(idx < self.n);
        let (w, b) = (idx / 64, idx % 64);
        self.bits[w] |= 1u64 << b;
    }
}

/// Fixed-width array of 2-bit values, four per byte, lowest index in the
/// lowest bits.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoBitArray {
    bytes: Vec<u8>,
    len: usize,
}

impl TwoBitArray {
    /// All slots start at `fill` (only the low two bits are used).
    pub fn new(len: usize, fill: u8) -> Result<Self, TryReserveError> {
        let f = fill & 3;
        let byte = f | (f << 2) | (f << 4) | (f << 6);
        Ok(Self {
            bytes: try_vec(len.div_ceil(4), byte)?,
            len,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> u8 {
        debug_assert!(i < self.len);
        (self.bytes[i >> 2] >> ((i & 3) << 1)) & 3
    }

    #[inline]
    pub fn set(&mut self, i: usize, value: u8) {
        debug_assert!(i < self.len);
        let shift = (i & 3) << 1;
        let b = &mut self.bytes[i >> 2];
        *b = (*b & !(3 << shift)) | ((value & 3) << shift);
    }

    /// Packed storage; slots past `len` in the last byte hold the fill value.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
