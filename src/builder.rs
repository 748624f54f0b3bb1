use std::collections::TryReserveError;

use log::{debug, info};
use thiserror::Error;

use crate::bdz::{self, Bdz, RankIndex};
use crate::chm::{self, Chm};
use crate::graph::{Fudge, Hypergraph, Layout, Shape};
use crate::hash::{HashFunction, HashProvider, SeedStream};
use crate::keys::KeySet;
use crate::peel::PeelOrder;

#[cfg(feature = "serde")]
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Which construction to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Order-preserving on a 2-uniform hypergraph.
    Chm,
    /// Order-preserving on a 3-uniform hypergraph.
    Chm3,
    /// Ternary labels + rank on a 3-uniform hypergraph.
    #[default]
    Bdz,
}

impl Algorithm {
    pub fn arity(self) -> u8 {
        match self {
            Algorithm::Chm => 2,
            Algorithm::Chm3 | Algorithm::Bdz => 3,
        }
    }

    /// Smallest vertex/key ratio at which acyclic hypergraphs are likely.
    pub fn min_load_factor(self) -> f64 {
        match self {
            Algorithm::Chm => 2.0,
            Algorithm::Chm3 => 1.24,
            Algorithm::Bdz => 1.23,
        }
    }
}

/// Vertex/key ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum LoadFactor {
    /// The algorithm's minimum.
    #[default]
    Minimum,
    /// A fixed ratio, at least the algorithm's minimum.
    Fixed(f64),
    /// Next power of two at or above the key count, doubled until the ratio
    /// reaches the minimum.
    NextPowerOfTwo,
}

/// Build parameters.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub algorithm: Algorithm,
    pub load_factor: LoadFactor,
    /// Resolve within-edge vertex collisions by bit toggling instead of
    /// retrying. Reserves a few extra vertices.
    pub allow_fudging: bool,
    /// How many seeds to try before giving up.
    pub max_attempts: u32,
    /// Derive seeds from a counter over `seed` (reproducible) instead of
    /// drawing them from the OS entropy source.
    pub predictable: bool,
    /// Base salt of the predictable seed stream.
    pub seed: u64,
    /// Use 16-bit hash words when there are at most 65534 keys.
    pub reduced_width: bool,
    pub layout: Layout,
    /// Keep the keys so lookups can reject non-members.
    pub embed_keys: bool,
    /// BDZ only: make `index` return input positions instead of ranks.
    pub embed_map: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            load_factor: LoadFactor::default(),
            allow_fudging: false,
            max_attempts: 4096,
            predictable: true,
            seed: 0xC0FF_EE00_D15E_A5E,
            reduced_width: false,
            layout: Layout::default(),
            embed_keys: false,
            embed_map: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum MphError {
    #[error("empty key set is not supported")]
    Empty,
    #[error("too many keys for 32-bit indices: {n}")]
    TooManyKeys { n: usize },
    #[error("load factor {c} is below the minimum of {min} for {algorithm:?}")]
    LoadFactor { c: f64, min: f64, algorithm: Algorithm },
    #[error("load factor {c} needs more than {max} vertices for {n} keys")]
    TooManyVertices { c: f64, n: u32, max: u32 },
    #[error("hash function yields {available} words, arity {arity} needs more")]
    HashWords { available: usize, arity: u8 },
    #[error("vertex count {va} must have the low bits {mask:#b} set when fudging")]
    VertexCount { va: u32, mask: u32 },
    #[error("duplicate key detected during build (positions {first} and {second})")]
    DuplicateKey { first: usize, second: usize },
    #[error("no acyclic hypergraph after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serde")]
    #[error("serialization error: {0}")]
    Serde(#[from] Box<bincode::ErrorKind>),
}

/// Why a single construction attempt failed. Only the low-level
/// [`Hypergraph`] API returns this; the builder retries on `Collision` and
/// `Cyclic`.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("within-edge vertex collision")]
    Collision,
    #[error("hypergraph is cyclic")]
    Cyclic,
    #[error(transparent)]
    Fatal(#[from] MphError),
}

/// Bookkeeping of a finished construction.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub shape: Shape,
    /// Seed of the successful attempt.
    pub seed: u64,
    /// Collision rules the evaluator must replay.
    pub fudge: Fudge,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

impl Meta {
    pub fn load_factor(&self) -> f64 {
        self.shape.load_factor()
    }
}

/// A constructed minimal perfect hash function.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub enum PerfectHash<H = HashFunction> {
    Chm(Chm<H>),
    Bdz(Bdz<H>),
}

impl<H: HashProvider> PerfectHash<H> {
    /// O(1) lookup: unique index in `[0, n)` for keys of the set.
    #[inline]
    pub fn index(&self, key: &[u8]) -> u32 {
        match self {
            PerfectHash::Chm(f) => f.index(key),
            PerfectHash::Bdz(f) => f.index(key),
        }
    }

    #[inline]
    pub fn index_str(&self, s: &str) -> u32 {
        self.index(s.as_bytes())
    }

    #[inline]
    pub fn index_u32(&self, key: u32) -> u32 {
        self.index(&key.to_le_bytes())
    }

    pub fn get(&self, key: &[u8]) -> Option<u32> {
        match self {
            PerfectHash::Chm(f) => f.get(key),
            PerfectHash::Bdz(f) => f.get(key),
        }
    }

    pub fn get_u32(&self, key: u32) -> Option<u32> {
        self.get(&key.to_le_bytes())
    }

    pub fn meta(&self) -> &Meta {
        match self {
            PerfectHash::Chm(f) => f.meta(),
            PerfectHash::Bdz(f) => f.meta(),
        }
    }

    pub fn len(&self) -> usize {
        self.meta().shape.n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attempts(&self) -> u32 {
        self.meta().attempts
    }

    pub fn load_factor(&self) -> f64 {
        self.meta().load_factor()
    }

    /// Hash invocation for the successful seed, as text.
    pub fn describe(&self) -> String {
        let seed = self.meta().seed;
        match self {
            PerfectHash::Chm(f) => f.hasher().describe(seed),
            PerfectHash::Bdz(f) => f.hasher().describe(seed),
        }
    }
}

#[cfg(feature = "serde")]
impl<H: HashProvider + Serialize + DeserializeOwned> PerfectHash<H> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MphError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MphError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Largest usable vertex count; leaves headroom for the fudging reserve.
const MAX_VERTICES: u32 = u32::MAX - 4;

/// Where the one-off duplicate check stands within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DupCheck {
    /// No attempt has failed yet.
    NotYet,
    /// An attempt failed before its hypergraph was complete; check the next
    /// complete one.
    Pending,
    Done,
}

pub struct Builder<H = HashFunction> {
    cfg: BuildConfig,
    hasher: H,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            cfg: BuildConfig::default(),
            hasher: HashFunction::default(),
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HashProvider> Builder<H> {
    pub fn with_config(mut self, cfg: BuildConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_hasher<H2: HashProvider>(self, hasher: H2) -> Builder<H2> {
        Builder {
            cfg: self.cfg,
            hasher,
        }
    }

    /// Build from byte-string keys. Keys must be distinct.
    pub fn build<K, I>(self, keys: I) -> Result<PerfectHash<H>, MphError>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        self.build_keys(KeySet::from_bytes(keys))
    }

    /// Build from integer keys. Keys must be distinct.
    pub fn build_u32<I: IntoIterator<Item = u32>>(self, keys: I) -> Result<PerfectHash<H>, MphError> {
        self.build_keys(KeySet::from_u32(keys))
    }

    pub fn build_keys(self, keys: KeySet) -> Result<PerfectHash<H>, MphError> {
        let n = keys.len();
        if n == 0 {
            return Err(MphError::Empty);
        }
        let n = u32::try_from(n)
            .ok()
            .filter(|&n| n < u32::MAX)
            .ok_or(MphError::TooManyKeys { n })?;

        let algorithm = self.cfg.algorithm;
        let narrow = self.cfg.reduced_width && n <= 65534;
        let available = if narrow {
            2 * self.hasher.words()
        } else {
            self.hasher.words()
        };
        if available < algorithm.arity() as usize {
            return Err(MphError::HashWords {
                available,
                arity: algorithm.arity(),
            });
        }
        let shape = self.shape(n, narrow)?;
        debug!(
            "{algorithm:?}: n = {n}, v = {}, va = {}, r = {}, 16-bit words: {narrow}",
            shape.v, shape.va, shape.r
        );

        let embed = self.cfg.embed_keys;
        let f = match algorithm {
            Algorithm::Chm => {
                let (graph, order, meta) = self.construct::<2>(&keys, shape)?;
                let g = chm::assign(&graph, &order)?;
                PerfectHash::Chm(Chm::new(meta, self.hasher, g, embed.then_some(keys)))
            }
            Algorithm::Chm3 => {
                let (graph, order, meta) = self.construct::<3>(&keys, shape)?;
                let g = chm::assign(&graph, &order)?;
                PerfectHash::Chm(Chm::new(meta, self.hasher, g, embed.then_some(keys)))
            }
            Algorithm::Bdz => {
                let (graph, order, meta) = self.construct::<3>(&keys, shape)?;
                let labels = bdz::assign(&graph, &order)?;
                let ranking = RankIndex::build(&labels)?;
                let output_order = bdz::output_order(&graph, &labels, &ranking)?;
                let embed_map = self.cfg.embed_map;
                let keys = match (embed, embed_map) {
                    (false, _) => None,
                    (true, true) => Some(keys),
                    (true, false) => Some(keys.permuted(&output_order)),
                };
                PerfectHash::Bdz(Bdz::new(
                    meta,
                    self.hasher,
                    labels,
                    ranking,
                    output_order,
                    embed_map,
                    keys,
                ))
            }
        };
        Ok(f)
    }

    /// Vertex counts for `n` keys.
    fn shape(&self, n: u32, narrow: bool) -> Result<Shape, MphError> {
        let algorithm = self.cfg.algorithm;
        let min = algorithm.min_load_factor();
        let k = algorithm.arity() as u64;
        let min_vertices: u64 = if k == 3 { 9 } else { 2 };
        let n64 = n as u64;

        let v = match self.cfg.load_factor {
            LoadFactor::NextPowerOfTwo => {
                let mut v = n64.next_power_of_two();
                while v < min_vertices || (v as f64) < min * n as f64 {
                    v *= 2;
                }
                v
            }
            lf => {
                let c = match lf {
                    LoadFactor::Fixed(c) => c,
                    _ => min,
                };
                if !(c >= min) {
                    return Err(MphError::LoadFactor { c, min, algorithm });
                }
                let want = c * n as f64;
                if want > MAX_VERTICES as f64 {
                    return Err(MphError::TooManyVertices { c, n, max: MAX_VERTICES });
                }
                match algorithm {
                    Algorithm::Bdz => {
                        let mut r = (want / 3.0).ceil() as u64;
                        if r % 2 == 0 {
                            r += 1;
                        }
                        if r == 1 {
                            r = 3;
                        }
                        (3 * r).max(min_vertices)
                    }
                    Algorithm::Chm | Algorithm::Chm3 => {
                        let want = want.ceil() as u64;
                        k * want.div_ceil(k).max(min_vertices / k)
                    }
                }
            }
        };

        if v > MAX_VERTICES as u64 {
            return Err(MphError::TooManyVertices {
                c: v as f64 / n as f64,
                n,
                max: MAX_VERTICES,
            });
        }
        let v = v as u32;
        let va = match (self.cfg.allow_fudging, k) {
            (false, _) => v,
            (true, 2) => (v + 1) | 1,
            (true, _) => (v + 3) | 3,
        };
        Ok(Shape {
            arity: k as u8,
            n,
            v,
            va,
            r: v / k as u32,
            layout: self.cfg.layout,
            narrow,
        })
    }

    /// Seed, build and peel until a hypergraph comes out acyclic.
    fn construct<const K: usize>(
        &self,
        keys: &KeySet,
        shape: Shape,
    ) -> Result<(Hypergraph<K>, PeelOrder, Meta), MphError> {
        self.construct_with(keys, shape, check_duplicates::<K>)
    }

    /// [`construct`](Self::construct) with the duplicate scan passed in. The
    /// scan runs at most once per run.
    fn construct_with<const K: usize, F>(
        &self,
        keys: &KeySet,
        shape: Shape,
        mut scan: F,
    ) -> Result<(Hypergraph<K>, PeelOrder, Meta), MphError>
    where
        F: FnMut(&Hypergraph<K>, &KeySet) -> Result<(), MphError>,
    {
        let mut stream = if self.cfg.predictable {
            SeedStream::predictable(self.cfg.seed)
        } else {
            SeedStream::random()
        };
        let mut dupes = DupCheck::NotYet;

        for attempt in 1..=self.cfg.max_attempts {
            let seed = self.hasher.seed(&mut stream);
            let failure =
                match Hypergraph::<K>::build(shape, keys, &self.hasher, seed, self.cfg.allow_fudging) {
                    Ok(mut graph) => {
                        if dupes == DupCheck::Pending {
                            scan(&graph, keys)?;
                            dupes = DupCheck::Done;
                        }
                        match graph.peel() {
                            Ok(order) => {
                                let meta = Meta {
                                    shape,
                                    seed,
                                    fudge: graph.fudge(),
                                    attempts: attempt,
                                };
                                info!(
                                    "built {}-uniform hypergraph for {} keys in {attempt} attempt(s), c = {:.3}, fudge = {:?}",
                                    K,
                                    shape.n,
                                    shape.load_factor(),
                                    meta.fudge
                                );
                                return Ok((graph, order, meta));
                            }
                            Err(Failure::Fatal(e)) => return Err(e),
                            Err(f) => {
                                if dupes == DupCheck::NotYet {
                                    scan(&graph, keys)?;
                                    dupes = DupCheck::Done;
                                }
                                f
                            }
                        }
                    }
                    Err(Failure::Fatal(e)) => return Err(e),
                    Err(f) => {
                        if dupes == DupCheck::NotYet {
                            dupes = DupCheck::Pending;
                        }
                        f
                    }
                };
            debug!("attempt {attempt} with seed {seed:#x} failed: {failure}");
        }
        Err(MphError::Exhausted {
            attempts: self.cfg.max_attempts,
        })
    }
}

fn check_duplicates<const K: usize>(graph: &Hypergraph<K>, keys: &KeySet) -> Result<(), MphError> {
    match graph.find_duplicate(keys)? {
        Some((first, second)) => Err(MphError::DuplicateKey { first, second }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashWords;
    use std::cell::RefCell;

    fn shape_for(cfg: BuildConfig, n: u32) -> Shape {
        Builder::new().with_config(cfg).shape(n, false).unwrap()
    }

    #[test]
    fn two_uniform_sizing_matches_load_factor() {
        let s = shape_for(
            BuildConfig {
                algorithm: Algorithm::Chm,
                load_factor: LoadFactor::Fixed(2.0),
                ..Default::default()
            },
            3,
        );
        assert_eq!((s.v, s.va, s.r), (6, 6, 3));
    }

    #[test]
    fn bdz_sizing_uses_odd_ranges() {
        let s = shape_for(BuildConfig::default(), 1);
        assert_eq!((s.v, s.r), (9, 3));

        let s = shape_for(BuildConfig::default(), 100);
        assert_eq!(s.r % 2, 1);
        assert_eq!(s.v, 3 * s.r);
        assert!(s.v >= 123 && s.v <= 129);

        let s = shape_for(
            BuildConfig {
                load_factor: LoadFactor::Fixed(1.24),
                ..Default::default()
            },
            100_000,
        );
        assert_eq!(s.r % 2, 1);
        assert_eq!(s.v, 3 * s.r);
        assert!(s.v as f64 >= 1.24 * 100_000.0);
    }

    #[test]
    fn chm3_has_a_minimum_range() {
        let s = shape_for(
            BuildConfig {
                algorithm: Algorithm::Chm3,
                ..Default::default()
            },
            1,
        );
        assert_eq!((s.v, s.r), (9, 3));
    }

    #[test]
    fn power_of_two_sizing() {
        let s = shape_for(
            BuildConfig {
                algorithm: Algorithm::Chm,
                load_factor: LoadFactor::NextPowerOfTwo,
                ..Default::default()
            },
            100,
        );
        assert_eq!((s.v, s.r), (256, 128));

        let s = shape_for(
            BuildConfig {
                load_factor: LoadFactor::NextPowerOfTwo,
                ..Default::default()
            },
            1000,
        );
        assert_eq!(s.v, 2048);
    }

    #[test]
    fn fudging_reserves_low_bits() {
        for (algorithm, mask) in [(Algorithm::Chm, 1), (Algorithm::Chm3, 3), (Algorithm::Bdz, 3)] {
            for n in [1, 7, 100, 1001] {
                let s = shape_for(
                    BuildConfig {
                        algorithm,
                        allow_fudging: true,
                        ..Default::default()
                    },
                    n,
                );
                assert_eq!(s.va & mask, mask);
                // toggled ids of the last vertex still fit
                assert!(((s.v - 1) | mask) < s.va);
            }
        }
    }

    #[test]
    fn load_factor_below_minimum_is_fatal() {
        let r = Builder::new()
            .with_config(BuildConfig {
                algorithm: Algorithm::Chm,
                load_factor: LoadFactor::Fixed(1.5),
                ..Default::default()
            })
            .build(["a", "b"]);
        assert!(matches!(r, Err(MphError::LoadFactor { .. })));

        let r = Builder::new()
            .with_config(BuildConfig {
                load_factor: LoadFactor::Fixed(f64::NAN),
                ..Default::default()
            })
            .build(["a", "b"]);
        assert!(matches!(r, Err(MphError::LoadFactor { .. })));
    }

    #[test]
    fn huge_load_factor_is_fatal() {
        for (algorithm, c) in [
            (Algorithm::Chm, 1e30),
            (Algorithm::Chm3, 1e12),
            (Algorithm::Bdz, f64::INFINITY),
        ] {
            let r = Builder::new()
                .with_config(BuildConfig {
                    algorithm,
                    load_factor: LoadFactor::Fixed(c),
                    ..Default::default()
                })
                .build(["a", "b"]);
            assert!(
                matches!(r, Err(MphError::TooManyVertices { n: 2, .. })),
                "{algorithm:?}: {r:?}"
            );
        }
    }

    #[test]
    fn fnv_builds_order_preserving_functions() {
        let keys: Vec<String> = (0..2000).map(|i| format!("word-{i:06}")).collect();
        let f = Builder::new()
            .with_config(BuildConfig {
                algorithm: Algorithm::Chm,
                load_factor: LoadFactor::Fixed(2.5),
                ..Default::default()
            })
            .with_hasher(HashFunction::Fnv)
            .build(&keys)
            .unwrap();
        assert!(f.attempts() <= 20, "{} attempts", f.attempts());
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(f.index_str(k), i as u32);
        }

        let f = Builder::new()
            .with_config(BuildConfig {
                algorithm: Algorithm::Chm,
                ..Default::default()
            })
            .with_hasher(HashFunction::Fnv)
            .build_u32(0..1000)
            .unwrap();
        for i in 0..1000 {
            assert_eq!(f.index_u32(i), i);
        }
    }

    /// Puts every key on the same edge, so each attempt is cyclic.
    struct SameEdge;

    impl HashProvider for SameEdge {
        fn words(&self) -> usize {
            3
        }
        fn compute(&self, _key: &[u8], seed: u64) -> HashWords {
            HashWords([seed as u32, (seed >> 21) as u32, (seed >> 42) as u32, 0])
        }
        fn describe(&self, _seed: u64) -> String {
            "same-edge".into()
        }
    }

    /// Collides within every edge for the first `collide` seeds, then puts
    /// every key on one edge.
    struct Staged {
        collide: usize,
        seeds: RefCell<Vec<u64>>,
    }

    impl HashProvider for Staged {
        fn words(&self) -> usize {
            3
        }
        fn compute(&self, _key: &[u8], seed: u64) -> HashWords {
            let mut seeds = self.seeds.borrow_mut();
            if seeds.last() != Some(&seed) {
                seeds.push(seed);
            }
            if seeds.len() <= self.collide {
                HashWords([7, 7, 7, 0])
            } else {
                HashWords([1, 2, 3, 0])
            }
        }
        fn describe(&self, _seed: u64) -> String {
            "staged".into()
        }
    }

    #[test]
    fn duplicate_scan_runs_once_after_cycles() {
        let b = Builder::new()
            .with_config(BuildConfig {
                max_attempts: 8,
                ..Default::default()
            })
            .with_hasher(SameEdge);
        let keys = KeySet::from_bytes(["a", "b", "c"]);
        let shape = b.shape(3, false).unwrap();
        let mut scans = 0;
        let r = b.construct_with::<3, _>(&keys, shape, |_, _| {
            scans += 1;
            Ok(())
        });
        assert!(matches!(r, Err(MphError::Exhausted { attempts: 8 })));
        assert_eq!(scans, 1);
    }

    #[test]
    fn duplicate_scan_waits_for_a_complete_hypergraph() {
        let b = Builder::new()
            .with_config(BuildConfig {
                layout: Layout::Shared,
                max_attempts: 8,
                ..Default::default()
            })
            .with_hasher(Staged {
                collide: 3,
                seeds: RefCell::default(),
            });
        let keys = KeySet::from_bytes(["a", "b", "c"]);
        let shape = b.shape(3, false).unwrap();
        let mut scanned_at = Vec::new();
        let r = b.construct_with::<3, _>(&keys, shape, |_, _| {
            scanned_at.push(b.hasher.seeds.borrow().len());
            Ok(())
        });
        assert!(matches!(r, Err(MphError::Exhausted { attempts: 8 })));
        // three collisions, then the first complete hypergraph is scanned
        assert_eq!(scanned_at, [4]);
        assert_eq!(b.hasher.seeds.borrow().len(), 8);
    }

    #[test]
    fn two_word_hash_is_too_narrow_for_three_vertices() {
        let r = Builder::new().with_hasher(HashFunction::Fnv).build(["a", "b"]);
        assert!(matches!(
            r,
            Err(MphError::HashWords {
                available: 2,
                arity: 3
            })
        ));

        // 16-bit halves give it four words
        let f = Builder::new()
            .with_config(BuildConfig {
                reduced_width: true,
                ..Default::default()
            })
            .with_hasher(HashFunction::Fnv)
            .build(["a", "b"])
            .unwrap();
        assert!(f.meta().shape.narrow);
    }

    #[test]
    fn empty_key_set_is_rejected() {
        let r = Builder::new().build(Vec::<&[u8]>::new());
        assert!(matches!(r, Err(MphError::Empty)));
    }

    #[test]
    fn zero_attempts_exhausts_immediately() {
        let r = Builder::new()
            .with_config(BuildConfig {
                max_attempts: 0,
                ..Default::default()
            })
            .build(["a"]);
        assert!(matches!(r, Err(MphError::Exhausted { attempts: 0 })));
    }
}
