use std::cmp::Ordering;

use log::warn;

use crate::builder::MphError;
use crate::graph::Hypergraph;
use crate::keys::KeySet;
use crate::util::try_vec;

impl<const K: usize> Hypergraph<K> {
    /// Look for two positions holding the same key.
    ///
    /// Equal keys always hash to the same edge, so sorting edge ids by
    /// (vertices, key content) puts any duplicates next to each other. Equal
    /// vertices with different keys are plain hash collisions and are not
    /// reported. Returns the two positions, lowest first.
    pub fn find_duplicate(&self, keys: &KeySet) -> Result<Option<(usize, usize)>, MphError> {
        let edges = self.edges();
        let mut ids = try_vec(edges.len(), 0usize)?;
        for (i, id) in ids.iter_mut().enumerate() {
            *id = i;
        }
        ids.sort_unstable_by(|&a, &b| {
            edges[a].cmp(&edges[b]).then_with(|| keys.cmp_keys(a, b))
        });

        for w in ids.windows(2) {
            let (a, b) = (w[0], w[1]);
            if edges[a] == edges[b] && keys.cmp_keys(a, b) == Ordering::Equal {
                warn!("duplicate key {:?} at positions {} and {}", keys.display(a), a.min(b), a.max(b));
                return Ok(Some((a.min(b), a.max(b))));
            }
        }
        Ok(None)
    }
}
