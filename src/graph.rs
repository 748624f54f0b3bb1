//! Random k-uniform hypergraph over the key set.
//!
//! Every key becomes one edge whose k vertices come from k hash words. A
//! vertex only stores its degree and the XOR of its incident edge ids: once
//! the degree is 1 the XOR *is* the remaining edge, so peeling never needs
//! adjacency lists.

use bitflags::bitflags;

use crate::builder::{Failure, MphError};
use crate::hash::{HashProvider, HashWords};
use crate::keys::KeySet;
use crate::util::try_vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

bitflags! {
    /// Collision rules that were needed while building the edges. The
    /// evaluator replays exactly these rules.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Fudge: u8 {
        /// `v1 == v0`: toggle bit 0 of `v1`.
        const SECOND = 1;
        /// `v2` equals `v0` or `v1`: toggle bit 0 of `v2`, then bit 1 if it
        /// still collides.
        const THIRD = 2;
    }
}

/// How hash words are turned into vertex ids.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// Word j lands in the j-th range of size `r`: `h_j % r + j * r`.
    #[default]
    Partitioned,
    /// Every word ranges over all `v` vertices: `h_j % v`.
    Shared,
}

/// Attempt-invariant geometry of the hypergraph for one construction run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub arity: u8,
    /// Number of edges (keys).
    pub n: u32,
    /// Vertex count used by the modular mapping.
    pub v: u32,
    /// Allocated vertices; `>= v`, with reserve for fudged ids.
    pub va: u32,
    /// Range size, `v / arity`.
    pub r: u32,
    pub layout: Layout,
    /// Use 16-bit hash words.
    pub narrow: bool,
}

impl Shape {
    /// Map hash words to the (unfudged) vertices of an edge.
    #[inline]
    pub fn map<const K: usize>(&self, words: &HashWords) -> [u32; K] {
        let mut out = [0u32; K];
        for (j, slot) in out.iter_mut().enumerate() {
            let w = words.word(j, self.narrow);
            *slot = match self.layout {
                Layout::Partitioned => w % self.r + j as u32 * self.r,
                Layout::Shared => w % self.v,
            };
        }
        out
    }

    /// Vertices of an edge at evaluation time: the mapping plus the collision
    /// rules recorded during construction.
    #[inline]
    pub fn vertices<const K: usize>(&self, words: &HashWords, fudge: Fudge) -> [u32; K] {
        let mut v = self.map::<K>(words);
        if !fudge.is_empty() {
            fudge_edge(&mut v, fudge);
        }
        v
    }

    /// Achieved ratio of vertices to keys.
    pub fn load_factor(&self) -> f64 {
        self.v as f64 / self.n as f64
    }

    /// Low bits that must be set in `va` when fudging is allowed.
    pub fn fudge_mask(&self) -> u32 {
        if self.arity == 2 { 1 } else { 3 }
    }
}

/// Apply the enabled collision `rules` to an edge; returns the rules that
/// actually changed it.
#[inline]
pub fn fudge_edge<const K: usize>(v: &mut [u32; K], rules: Fudge) -> Fudge {
    let mut applied = Fudge::empty();
    for j in 1..K {
        let rule = if j == 1 { Fudge::SECOND } else { Fudge::THIRD };
        if !rules.contains(rule) || !v[..j].contains(&v[j]) {
            continue;
        }
        v[j] ^= 1;
        if v[..j].contains(&v[j]) {
            v[j] ^= 2;
        }
        applied |= rule;
    }
    applied
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vertex {
    /// Incident edges still present.
    pub degree: u32,
    /// XOR of the incident edge ids still present.
    pub edges: u32,
}

/// One construction attempt's hypergraph.
#[derive(Debug)]
pub struct Hypergraph<const K: usize> {
    shape: Shape,
    edges: Vec<[u32; K]>,
    verts: Vec<Vertex>,
    fudge: Fudge,
}

impl<const K: usize> Hypergraph<K> {
    /// Hash every key with `seed` and wire the resulting edges in.
    ///
    /// A within-edge collision fails the attempt unless `allow_fudging` is
    /// set, in which case it is resolved by bit toggling and recorded.
    pub fn build<H: HashProvider + ?Sized>(
        shape: Shape,
        keys: &KeySet,
        hasher: &H,
        seed: u64,
        allow_fudging: bool,
    ) -> Result<Self, Failure> {
        debug_assert_eq!(K, shape.arity as usize);
        debug_assert_eq!(keys.len(), shape.n as usize);
        let mask = shape.fudge_mask();
        if allow_fudging && shape.va & mask != mask {
            return Err(MphError::VertexCount { va: shape.va, mask }.into());
        }

        let n = shape.n as usize;
        let mut edges = try_vec(n, [0u32; K]).map_err(MphError::from)?;
        let verts = try_vec(shape.va as usize, Vertex::default()).map_err(MphError::from)?;
        let mut fudge = Fudge::empty();

        for (i, edge) in edges.iter_mut().enumerate() {
            let words = keys.hash(i, hasher, seed);
            let mut v = shape.map::<K>(&words);
            let applied = fudge_edge(&mut v, Fudge::all());
            if !applied.is_empty() {
                if !allow_fudging {
                    return Err(Failure::Collision);
                }
                fudge |= applied;
            }
            *edge = v;
        }

        let mut graph = Self {
            shape,
            edges,
            verts,
            fudge,
        };
        for e in 0..n as u32 {
            graph.add_edge(e);
        }
        Ok(graph)
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn edges(&self) -> &[[u32; K]] {
        &self.edges
    }

    #[inline]
    pub fn vertex(&self, v: u32) -> Vertex {
        self.verts[v as usize]
    }

    #[inline]
    pub fn fudge(&self) -> Fudge {
        self.fudge
    }

    #[inline]
    pub(crate) fn add_edge(&mut self, e: u32) {
        for &v in &self.edges[e as usize] {
            let vx = &mut self.verts[v as usize];
            vx.edges ^= e;
            vx.degree += 1;
        }
    }

    #[inline]
    pub(crate) fn remove_edge(&mut self, e: u32) {
        for &v in &self.edges[e as usize] {
            let vx = &mut self.verts[v as usize];
            vx.edges ^= e;
            vx.degree -= 1;
        }
    }
}
