//! Split snapshots of a [`Forest`].
//!
//! # Overview
//! A ForestSnapshot records the label set of every component and every
//! non-trivial split (bipartition) inside a component. Two binary forests
//! with equal snapshots are the same forest up to node numbering, which lets
//! the distance operations answer identical inputs without searching.
//!
//! # What is a split?
//! Each internal edge divides its component's leaves into two groups:
//! ```text
//!   A       C
//!    \     /
//!     x---y        edge x-y splits {A,B} | {C,D}
//!    /     \
//!   B       D
//! ```
//!
//! # Canonicalization
//! Each component is oriented away from its smallest label, and a split is
//! stored as the side below the edge, which never contains that label. Label
//! indices come from the shared [`LabelMap`](crate::labels::LabelMap), so the
//! same split in two forests has the same bitset.

use std::collections::HashSet;

use crate::bitset::Bitset;
use crate::forest::{Forest, NodeId};

/// Immutable split summary of a forest.
///
/// # Fields
/// - `components`: label set of each component, ordered by smallest label
/// - `parts`: non-trivial splits, both sides holding at least two labels
/// - `words`: number of u64 words per bitset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestSnapshot {
    pub components: Vec<Bitset>,
    pub parts: HashSet<Bitset>,
    pub words: usize,
}

impl ForestSnapshot {
    pub fn from_forest(forest: &Forest) -> Self {
        let words = forest.label_bound().div_ceil(64);
        let mut components = Vec::new();
        let mut parts = HashSet::new();

        for component in forest.components() {
            let Some(root) = component.labels.first().and_then(|&l| forest.node_of(l)) else {
                continue;
            };
            let size = component.labels.len();
            for bits in Self::compute_bitsets(forest, root, words) {
                let below = bits.count_ones();
                if below >= 2 && below + 2 <= size {
                    parts.insert(bits);
                }
            }

            let mut all = Bitset::zeros(words);
            for &label in &component.labels {
                all.set(label);
            }
            components.push(all);
        }

        ForestSnapshot { components, parts, words }
    }

    /// Leaf bitset below every non-root node of the component of `root`.
    ///
    /// # Algorithm
    /// Iterative DFS records a preorder with parents; walking it backwards
    /// ORs each node's set into its parent's.
    fn compute_bitsets(forest: &Forest, root: NodeId, words: usize) -> Vec<Bitset> {
        let mut parent: Vec<Option<NodeId>> = vec![None; forest.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(u) = stack.pop() {
            order.push(u);
            for &v in forest.neighbors(u) {
                if Some(v) != parent[u] {
                    parent[v] = Some(u);
                    stack.push(v);
                }
            }
        }

        let mut below: Vec<Option<Bitset>> = vec![None; forest.nodes.len()];
        let mut out = Vec::with_capacity(order.len());
        for &u in order.iter().rev() {
            let mut bits = below[u].take().unwrap_or_else(|| Bitset::zeros(words));
            if let Some(label) = forest.label(u) {
                bits.set(label);
            }
            if let Some(p) = parent[u] {
                below[p]
                    .get_or_insert_with(|| Bitset::zeros(words))
                    .or_assign(&bits);
                out.push(bits);
            }
        }
        out
    }

    pub fn split_count(&self) -> usize {
        self.parts.len()
    }

    /// Same components and same splits.
    pub fn same_topology(&self, other: &ForestSnapshot) -> bool {
        self.components == other.components && self.parts == other.parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::tests::{caterpillar, quartet};

    /// ```text
    /// caterpillar 0 1 2 3 4 5
    ///
    ///   0   2   3   4
    ///    \  |   |  /
    ///     s0-s1-s2-s3
    ///    /           \
    ///   1             5
    /// ```
    /// Internal edges s0-s1, s1-s2, s2-s3 give {2,3,4,5}, {3,4,5}, {4,5}.
    #[test]
    fn test_caterpillar_splits() {
        let snap = ForestSnapshot::from_forest(&caterpillar(&[0, 1, 2, 3, 4, 5]));
        assert_eq!(snap.split_count(), 3);
        let mut expected = Bitset::zeros(1);
        expected.set(4);
        expected.set(5);
        assert!(snap.parts.contains(&expected));
        assert_eq!(snap.components.len(), 1);
    }

    #[test]
    fn test_same_topology_ignores_numbering() {
        let a = ForestSnapshot::from_forest(&quartet(0, 1, 2, 3));
        let b = ForestSnapshot::from_forest(&quartet(2, 3, 1, 0));
        let c = ForestSnapshot::from_forest(&quartet(0, 2, 1, 3));
        assert!(a.same_topology(&b));
        assert!(!a.same_topology(&c));
    }

    #[test]
    fn test_components_distinguish_forests() {
        let whole = quartet(0, 1, 2, 3);
        let mut cut = whole.clone();
        cut.cut_edge(4, 5);
        let a = ForestSnapshot::from_forest(&whole);
        let b = ForestSnapshot::from_forest(&cut);
        assert_eq!(b.components.len(), 2);
        assert_eq!(b.split_count(), 0);
        assert!(!a.same_topology(&b));
    }
}
