//! Acyclicity test by peeling.

use log::trace;

use crate::builder::{Failure, MphError};
use crate::graph::Hypergraph;
use crate::util::try_vec;

/// Edge ids of a fully peeled hypergraph.
///
/// The buffer is filled back to front while edges are removed, so a forward
/// walk is assignment order (the last edge removed comes first) and a
/// backward walk is removal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeelOrder {
    order: Vec<u32>,
}

impl PeelOrder {
    #[inline]
    pub fn assignment_order(&self) -> &[u32] {
        &self.order
    }

    pub fn removal_order(&self) -> impl Iterator<Item = u32> + '_ {
        self.order.iter().rev().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<const K: usize> Hypergraph<K> {
    /// Peel degree-1 vertices until the graph is empty.
    ///
    /// One sweep over all vertices, then repeated sweeps over the vertices of
    /// the edges removed so far (newest first) until every edge is out or a
    /// sweep makes no progress. Fails with [`Failure::Cyclic`] if a 2-core
    /// remains. Only vertex records are consumed; edges stay intact.
    pub fn peel(&mut self) -> Result<PeelOrder, Failure> {
        let n = self.shape().n as usize;
        let mut order = try_vec(n, 0u32).map_err(MphError::from)?;
        let mut out = n;

        for v in 0..self.shape().va {
            self.remove_vertex(v, &mut order, &mut out);
        }
        let first_sweep = n - out;

        let mut i = n;
        while out > 0 && i > out {
            i -= 1;
            let e = order[i];
            let verts = self.edges()[e as usize];
            for v in verts {
                self.remove_vertex(v, &mut order, &mut out);
            }
        }

        trace!(
            "peeled {} of {n} edges ({first_sweep} in the first sweep)",
            n - out
        );
        if out != 0 {
            return Err(Failure::Cyclic);
        }
        Ok(PeelOrder { order })
    }

    #[inline]
    fn remove_vertex(&mut self, v: u32, order: &mut [u32], out: &mut usize) {
        let vx = self.vertex(v);
        if vx.degree == 1 {
            *out -= 1;
            order[*out] = vx.edges;
            self.remove_edge(vx.edges);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::shape;
    use crate::graph::Layout;
    use crate::hash::{HashFunction, HashProvider, HashWords};
    use crate::keys::KeySet;

    /// Feeds fixed vertex ids straight through as hash words.
    struct Fixed(Vec<[u32; 3]>);

    impl HashProvider for Fixed {
        fn words(&self) -> usize {
            3
        }
        fn compute(&self, key: &[u8], _seed: u64) -> HashWords {
            let i = u32::from_le_bytes([key[0], key[1], key[2], key[3]]) as usize;
            let [a, b, c] = self.0[i];
            HashWords([a, b, c, 0])
        }
        fn describe(&self, _seed: u64) -> String {
            "fixed".into()
        }
    }

    fn graph(edges: Vec<[u32; 3]>, r: u32) -> Hypergraph<3> {
        let n = edges.len() as u32;
        let keys = KeySet::from_u32(0..n);
        let s = shape(3, n, 3 * r, 3 * r, Layout::Partitioned);
        Hypergraph::<3>::build(s, &keys, &Fixed(edges), 0, false).unwrap()
    }

    #[test]
    fn forest_peels_completely() {
        // words are taken mod r and offset per range
        let mut g = graph(vec![[0, 0, 0], [0, 1, 1], [2, 1, 2]], 3);
        let order = g.peel().unwrap();
        let mut ids = order.assignment_order().to_vec();
        ids.sort_unstable();
        assert_eq!(ids, [0, 1, 2]);
        for v in 0..9 {
            assert_eq!(g.vertex(v).degree, 0);
        }
    }

    #[test]
    fn every_edge_has_a_private_vertex_at_assignment() {
        let keys = KeySet::from_u32(0..500);
        let s = shape(3, 500, 630, 630, Layout::Partitioned);
        let mut seed = 0;
        let (g, order) = loop {
            let mut g = Hypergraph::<3>::build(s, &keys, &HashFunction::Wyhash, seed, false)
                .unwrap();
            if let Ok(o) = g.peel() {
                break (g, o);
            }
            seed += 1;
        };
        let mut seen = vec![false; 630];
        for &e in order.assignment_order() {
            let verts = g.edges()[e as usize];
            assert!(verts.iter().any(|&v| !seen[v as usize]));
            for v in verts {
                seen[v as usize] = true;
            }
        }
        assert_eq!(order.removal_order().count(), 500);
    }

    #[test]
    fn cycle_is_detected() {
        // edges 0 and 1 share all three vertices
        let mut g = graph(vec![[0, 0, 0], [0, 0, 0], [1, 1, 1]], 2);
        assert!(matches!(g.peel(), Err(Failure::Cyclic)));
        // the edge array survives for the duplicate check
        assert_eq!(g.edges()[0], g.edges()[1]);
    }
}
