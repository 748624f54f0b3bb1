//! Hash providers: key + seed -> independent hash words.
//!
//! The construction only relies on the [`HashProvider`] contract. The built-in
//! providers are the closed set in [`HashFunction`]; anything else can plug in
//! by implementing the trait.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use xxhash_rust::xxh3::xxh3_128_with_seed;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on the 32-bit words a provider may produce.
pub const MAX_WORDS: usize = 4;

/// Hash output for one key. Read either as 32-bit words or, in reduced-width
/// mode, as 16-bit halves (low half first).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashWords(pub [u32; MAX_WORDS]);

impl HashWords {
    #[inline]
    pub fn from_u64s(lo: u64, hi: u64) -> Self {
        Self([lo as u32, (lo >> 32) as u32, hi as u32, (hi >> 32) as u32])
    }

    #[inline]
    pub fn word32(&self, i: usize) -> u32 {
        self.0[i]
    }

    #[inline]
    pub fn word16(&self, i: usize) -> u32 {
        (self.0[i >> 1] >> ((i & 1) * 16)) & 0xffff
    }

    #[inline]
    pub fn word(&self, i: usize, narrow: bool) -> u32 {
        if narrow { self.word16(i) } else { self.word32(i) }
    }
}

/// Where construction attempts get their seeds from.
///
/// Predictable streams walk a counter mixed with a base salt, so two runs with
/// the same configuration see the same seeds. Random streams draw from a
/// CSPRNG seeded from the OS.
#[derive(Debug, Clone)]
pub enum SeedStream {
    Predictable { base: u64, counter: u32 },
    Random(StdRng),
}

impl SeedStream {
    pub fn predictable(base: u64) -> Self {
        SeedStream::Predictable { base, counter: 0 }
    }

    pub fn random() -> Self {
        SeedStream::Random(StdRng::from_entropy())
    }

    pub fn next_seed(&mut self) -> u64 {
        match self {
            SeedStream::Predictable { base, counter } => {
                let s = mix_salt(*base, *counter);
                *counter = counter.wrapping_add(1);
                s
            }
            SeedStream::Random(rng) => rng.next_u64(),
        }
    }
}

/// Contract between the construction and a hash function.
///
/// `compute` must be a pure function of `(key, seed)`.
pub trait HashProvider {
    /// Number of 32-bit words `compute` fills in.
    fn words(&self) -> usize;

    /// Draw the seed for the next construction attempt.
    fn seed(&self, stream: &mut SeedStream) -> u64 {
        stream.next_seed()
    }

    fn compute(&self, key: &[u8], seed: u64) -> HashWords;

    /// Textual form of the call that reproduces `compute` for this seed, for
    /// whoever emits source code for the finished function.
    fn describe(&self, seed: u64) -> String;
}

/// Built-in hash functions.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashFunction {
    /// One wyhash pass widened with splitmix64; four words.
    #[default]
    Wyhash,
    /// 128-bit XXH3; four words.
    Xxh3,
    /// Seeded 64-bit FNV-1a finished with splitmix64; two words.
    Fnv,
}

impl HashProvider for HashFunction {
    fn words(&self) -> usize {
        match self {
            HashFunction::Wyhash | HashFunction::Xxh3 => 4,
            HashFunction::Fnv => 2,
        }
    }

    fn seed(&self, stream: &mut SeedStream) -> u64 {
        let s = stream.next_seed();
        match self {
            HashFunction::Wyhash => skip_weak_wyhash_seed(s),
            _ => s,
        }
    }

    #[inline]
    fn compute(&self, key: &[u8], seed: u64) -> HashWords {
        match self {
            HashFunction::Wyhash => {
                let base = wyhash::wyhash(key, seed);
                HashWords::from_u64s(base, splitmix64(base ^ 0x9E37_79B9_7F4A_7C15))
            }
            HashFunction::Xxh3 => {
                let h = xxh3_128_with_seed(key, seed);
                HashWords::from_u64s(h as u64, (h >> 64) as u64)
            }
            // raw FNV-1a halves move together on trailing bytes
            HashFunction::Fnv => HashWords::from_u64s(splitmix64(fnv1a(key, seed)), 0),
        }
    }

    fn describe(&self, seed: u64) -> String {
        let name = match self {
            HashFunction::Wyhash => "wyhash",
            HashFunction::Xxh3 => "xxh3_128_with_seed",
            HashFunction::Fnv => "fnv1a_mix",
        };
        format!("{name}(key, keylen, {seed:#018x})")
    }
}

#[inline]
fn fnv1a(data: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ FNV_OFFSET;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Low words wyhash mixes poorly as seeds.
const WYHASH_WEAK_SEEDS: [u32; 2] = [0x14cc_886e, 0xd637_dbf3];

#[inline]
fn skip_weak_wyhash_seed(s: u64) -> u64 {
    if WYHASH_WEAK_SEEDS.contains(&(s as u32)) {
        s.wrapping_add(1)
    } else {
        s
    }
}

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Deterministically tweak base salt by round (FNV-like).
#[inline]
fn mix_salt(base: u64, round: u32) -> u64 {
    let mut h = FNV_OFFSET ^ base;
    h ^= round as u64;
    h = h.wrapping_mul(FNV_PRIME);
    h ^ (h >> 33)
}
