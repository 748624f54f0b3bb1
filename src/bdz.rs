//! Space-efficient construction (BDZ) on 3-uniform hypergraphs.
//!
//! Every vertex gets a 2-bit label. For each edge exactly one vertex, the
//! first one unvisited at assignment time, is authoritative, and the labels
//! are chosen so that `(g[v0] + g[v1] + g[v2]) % 3` names its slot. Only
//! authoritative vertices carry a label in `{0, 1, 2}`; all others hold the
//! sentinel 3, which also counts as 0 mod 3. Ranking the authoritative vertex
//! among the labeled ones compacts the `va` vertices down to `[0, n)`.
//!
//! Query: `rank(h[(g[h0] + g[h1] + g[h2]) % 3])`.

use std::io::Write;

use crate::builder::{Meta, MphError};
use crate::graph::Hypergraph;
use crate::hash::{HashFunction, HashProvider};
use crate::keys::KeySet;
use crate::peel::PeelOrder;
use crate::util::{try_vec, BitSet, TwoBitArray};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Label of a vertex that is not authoritative for any edge.
pub const UNVISITED: u8 = 3;

/// log2 of the vertices covered by one rank block.
pub const BLOCK_BITS: u32 = 7;
/// Vertices covered by one rank block.
pub const BLOCK: usize = 1 << BLOCK_BITS;

/// Number of labeled (non-sentinel) 2-bit fields in a packed byte.
pub static RANK_LUT: [u8; 256] = rank_lut();

const fn rank_lut() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut b = 0;
    while b < 256 {
        let mut shift = 0;
        while shift < 8 {
            if (b >> shift) & 3 != 3 {
                t[b] += 1;
            }
            shift += 2;
        }
        b += 1;
    }
    t
}

/// Label the vertices of a peeled 3-uniform hypergraph.
///
/// Edges are taken in assignment order. Position `p` is the first vertex not
/// yet visited; later unvisited vertices are marked visited with the sentinel,
/// and `p` gets `(6 + p - others) % 3`, i.e. the 6/7/8 constants for
/// `p = 0/1/2`.
pub fn assign(graph: &Hypergraph<3>, order: &PeelOrder) -> Result<TwoBitArray, MphError> {
    let va = graph.shape().va as usize;
    let mut g = TwoBitArray::new(va, UNVISITED)?;
    let mut visited = BitSet::new(va)?;

    for &e in order.assignment_order() {
        let verts = graph.edges()[e as usize];
        let free = verts.iter().position(|&v| !visited.test(v as usize));
        debug_assert!(free.is_some(), "edge {e} has no unvisited vertex");
        let p = free.unwrap_or(2);

        for &v in &verts[p + 1..] {
            if !visited.test(v as usize) {
                g.set(v as usize, UNVISITED);
                visited.set(v as usize);
            }
        }
        let others: u32 = verts
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != p)
            .map(|(_, &v)| g.get(v as usize) as u32)
            .sum();
        g.set(verts[p] as usize, ((6 + p as u32 - others) % 3) as u8);
        visited.set(verts[p] as usize);
    }
    Ok(g)
}

/// Slot of the authoritative vertex of an edge.
#[inline]
pub fn select(labels: &TwoBitArray, verts: &[u32; 3]) -> usize {
    let sum: u32 = verts.iter().map(|&v| labels.get(v as usize) as u32).sum();
    (sum % 3) as usize
}

/// Prefix counts of labeled vertices, one entry per block boundary.
///
/// `blocks[i]` is the number of labeled vertices in `[0, i * BLOCK)`; there
/// are `ceil(len / BLOCK) + 1` entries.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankIndex {
    blocks: Vec<u32>,
}

impl RankIndex {
    pub fn build(labels: &TwoBitArray) -> Result<Self, MphError> {
        let mut blocks = try_vec(labels.len().div_ceil(BLOCK) + 1, 0u32)?;
        let mut sum = 0u32;
        for (i, chunk) in labels.as_bytes().chunks(BLOCK / 4).enumerate() {
            sum += chunk.iter().map(|&b| RANK_LUT[b as usize] as u32).sum::<u32>();
            blocks[i + 1] = sum;
        }
        Ok(Self { blocks })
    }

    /// Number of labeled vertices strictly below `v`.
    #[inline]
    pub fn rank(&self, labels: &TwoBitArray, v: usize) -> u32 {
        let block = v >> BLOCK_BITS;
        let mut r = self.blocks[block];
        let bytes = labels.as_bytes();
        let end_byte = v >> 2;
        for &b in &bytes[block * (BLOCK / 4)..end_byte] {
            r += RANK_LUT[b as usize] as u32;
        }
        for i in end_byte << 2..v {
            if labels.get(i) != UNVISITED {
                r += 1;
            }
        }
        r
    }

    pub fn blocks(&self) -> &[u32] {
        &self.blocks
    }
}

/// `order[rank] = key position` for every key of the peeled hypergraph.
pub fn output_order(
    graph: &Hypergraph<3>,
    labels: &TwoBitArray,
    ranking: &RankIndex,
) -> Result<Vec<u32>, MphError> {
    let mut order = try_vec(graph.edges().len(), u32::MAX)?;
    for (i, verts) in graph.edges().iter().enumerate() {
        let v = verts[select(labels, verts)];
        let r = ranking.rank(labels, v as usize) as usize;
        debug_assert_eq!(order[r], u32::MAX, "rank {r} assigned twice");
        order[r] = i as u32;
    }
    Ok(order)
}

/// Ternary-label + rank minimal perfect hash function.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Bdz<H = HashFunction> {
    meta: Meta,
    hasher: H,
    labels: TwoBitArray,
    ranking: RankIndex,
    output_order: Vec<u32>, // rank -> key position
    embed_map: bool,
    keys: Option<KeySet>,
}

impl<H: HashProvider> Bdz<H> {
    pub(crate) fn new(
        meta: Meta,
        hasher: H,
        labels: TwoBitArray,
        ranking: RankIndex,
        output_order: Vec<u32>,
        embed_map: bool,
        keys: Option<KeySet>,
    ) -> Self {
        Self {
            meta,
            hasher,
            labels,
            ranking,
            output_order,
            embed_map,
            keys,
        }
    }

    /// Rank of the key's authoritative vertex: its index in `[0, n)`
    /// regardless of `embed_map`.
    #[inline]
    pub fn rank(&self, key: &[u8]) -> u32 {
        let words = self.hasher.compute(key, self.meta.seed);
        let verts = self.meta.shape.vertices::<3>(&words, self.meta.fudge);
        let v = verts[select(&self.labels, &verts)];
        self.ranking.rank(&self.labels, v as usize)
    }

    /// Index of `key`: its rank, or its input position when the output map
    /// is embedded. Unspecified (but in range of `u32`) for other keys.
    #[inline]
    pub fn index(&self, key: &[u8]) -> u32 {
        let r = self.rank(key);
        if self.embed_map {
            self.output_order.get(r as usize).copied().unwrap_or(r)
        } else {
            r
        }
    }

    #[inline]
    pub fn index_u32(&self, key: u32) -> u32 {
        self.index(&key.to_le_bytes())
    }

    /// Like [`index`](Self::index), but rejects keys outside the set when the
    /// keys were embedded.
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

    /// Write the output map: line `i` holds the input position of the key
    /// whose rank is `i`.
    pub fn write_map<W: Write>(&self, mut w: W) -> Result<(), MphError> {
        for i in &self.output_order {
            writeln!(w, "{i}")?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn labels(&self) -> &TwoBitArray {
        &self.labels
    }

    pub fn ranking(&self) -> &RankIndex {
        &self.ranking
    }

    pub fn output_order(&self) -> &[u32] {
        &self.output_order
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
