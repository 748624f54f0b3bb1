//! perfhash: minimal perfect hashing by hypergraph peeling.
//!
//! - Build once on a set of **unique** keys (bytes or `u32`).
//! - Keys become edges of a random 2- or 3-uniform hypergraph; peeling proves
//!   it acyclic and orders the edges; the order drives a per-vertex value
//!   assignment.
//! - CHM: one value in `[0, n)` per vertex, `f(k)` is the key's input position.
//! - BDZ: 2 bits per vertex plus a rank index, `f(k)` is a rank in `[0, n)`.
//! - If an attempt finds a cycle, we rehash with another seed. Duplicate keys
//!   are detected after the first failure and abort the build.
//!
//! ```
//! use perfhash::{Algorithm, BuildConfig, Builder};
//!
//! let keys = ["apple", "banana", "cherry"];
//! let f = Builder::new()
//!     .with_config(BuildConfig { algorithm: Algorithm::Chm, ..Default::default() })
//!     .build(keys)
//!     .unwrap();
//! for (i, k) in keys.iter().enumerate() {
//!     assert_eq!(f.index_str(k), i as u32);
//! }
//! ```

pub mod bdz;
mod builder;
pub mod chm;
mod dupes;
pub mod graph;
pub mod hash;
pub mod keys;
pub mod peel;
mod util;

pub use bdz::Bdz;
pub use builder::{
    Algorithm, BuildConfig, Builder, Failure, LoadFactor, Meta, MphError, PerfectHash,
};
pub use chm::Chm;
pub use graph::{Fudge, Hypergraph, Layout, Shape};
pub use hash::{HashFunction, HashProvider, HashWords, SeedStream};
pub use keys::KeySet;
pub use peel::PeelOrder;
pub use util::TwoBitArray;
