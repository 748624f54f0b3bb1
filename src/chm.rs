//! Order-preserving construction (CHM) on 2- or 3-uniform hypergraphs.
//!
//! Query: `f(k) = (g[v0] + g[v1] (+ g[v2])) % n`, which is the key's input
//! position.

use crate::builder::{Meta, MphError};
use crate::graph::Hypergraph;
use crate::hash::{HashFunction, HashProvider};
use crate::keys::KeySet;
use crate::peel::PeelOrder;
use crate::util::{try_vec, BitSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Assign one value in `[0, n)` per vertex so that every edge sums to its own
/// id mod n.
///
/// Edges are taken in assignment order, where each edge still has a vertex no
/// earlier edge touched; that vertex absorbs the difference, so no value is
/// ever overwritten.
pub fn assign<const K: usize>(graph: &Hypergraph<K>, order: &PeelOrder) -> Result<Vec<u32>, MphError> {
    let shape = graph.shape();
    let n = shape.n as u64;
    let mut g = try_vec(shape.va as usize, 0u32)?;
    let mut visited = BitSet::new(shape.va as usize)?;

    for &e in order.assignment_order() {
        let verts = graph.edges()[e as usize];
        let free = verts.iter().position(|&v| !visited.test(v as usize));
        debug_assert!(free.is_some(), "edge {e} has no unvisited vertex");
        let p = free.unwrap_or(K - 1);

        let others = verts
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != p)
            .map(|(_, &v)| g[v as usize] as u64)
            .sum::<u64>()
            % n;
        g[verts[p] as usize] = ((e as u64 + n - others) % n) as u32;
        for v in verts {
            visited.set(v as usize);
        }
    }
    Ok(g)
}

/// Order-preserving minimal perfect hash function.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Chm<H = HashFunction> {
    meta: Meta,
    hasher: H,
    g: Vec<u32>, // len == va, values in [0..n)
    keys: Option<KeySet>,
}

impl<H: HashProvider> Chm<H> {
    pub(crate) fn new(meta: Meta, hasher: H, g: Vec<u32>, keys: Option<KeySet>) -> Self {
        Self { meta, hasher, g, keys }
    }

    #[inline]
    pub fn index(&self, key: &[u8]) -> u32 {
        let shape = &self.meta.shape;
        let words = self.hasher.compute(key, self.meta.seed);
        let sum: u64 = if shape.arity == 2 {
            let [a, b] = shape.vertices::<2>(&words, self.meta.fudge);
            self.g[a as usize] as u64 + self.g[b as usize] as u64
        } else {
            let [a, b, c] = shape.vertices::<3>(&words, self.meta.fudge);
            self.g[a as usize] as u64 + self.g[b as usize] as u64 + self.g[c as usize] as u64
        };
        (sum % shape.n as u64) as u32
    }

    #[inline]
    pub fn index_u32(&self, key: u32) -> u32 {
        self.index(&key.to_le_bytes())
    }

    /// Like [`index`](Self::index), but rejects keys outside the set when the
    /// keys were embedded. Without embedded keys every key maps somewhere.
    pub fn get(&self, key: &[u8]) -> Option<u32> {
        let i = self.index(key);
        match &self.keys {
            Some(keys) if !keys.matches(i as usize, key) => None,
            _ => Some(i),
        }
    }

    pub fn get_u32(&self, key: u32) -> Option<u32> {
        self.get(&key.to_le_bytes())
    }

    /// Per-vertex value table.
    pub fn values(&self) -> &[u32] {
        &self.g
    }

    pub fn keys(&self) -> Option<&KeySet> {
        self.keys.as_ref()
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn len(&self) -> usize {
        self.meta.shape.n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
