//! Canonical form of a [`Forest`].
//!
//! Two input trees are parsed independently, so the same topology can arrive
//! with any node numbering and neighbor order. Normalization removes both:
//!
//! 1. every unlabeled node of degree two is suppressed;
//! 2. each component is oriented away from its smallest leaf, and every
//!    node lists its parent first, then its children by the smallest label
//!    below them;
//! 3. nodes are renumbered in that preorder, components in order of their
//!    smallest label, dropping tombstones.
//!
//! ```text
//!  (C,(A,D),B) rooted  -->  suppress root  -->  A: 0   hub: 1 [0, 2(D), 3(..)]
//! ```
//!
//! Forests that are isomorphic under their labels therefore normalize to equal
//! values, and normalizing twice changes nothing.

use crate::forest::{Forest, Label, Node, NodeId};

impl Forest {
    /// Brings the forest into canonical form in place.
    pub fn normalize(&mut self) {
        normalize(self);
    }

    /// Canonical copy, leaving `self` untouched.
    pub fn normalized(&self) -> Forest {
        let mut forest = self.clone();
        forest.normalize();
        forest
    }

    pub fn is_normalized(&self) -> bool {
        *self == self.normalized()
    }
}

pub fn normalize(forest: &mut Forest) {
    for u in 0..forest.nodes.len() {
        forest.suppress(u);
    }

    let len = forest.nodes.len();
    let mut parent: Vec<Option<NodeId>> = vec![None; len];
    let mut min_below: Vec<Label> = vec![Label::MAX; len];
    // Preorder of old ids with their children already sorted.
    let mut emitted: Vec<(NodeId, Vec<NodeId>)> = Vec::with_capacity(len);

    for component in forest.components() {
        let Some(root) = component.labels.first().and_then(|&l| forest.node_of(l)) else {
            continue;
        };

        let mut order = Vec::with_capacity(component.nodes.len());
        let mut stack = vec![root];
        while let Some(u) = stack.pop() {
            order.push(u);
            for &v in &forest.nodes[u].neighbors {
                if Some(v) != parent[u] {
                    parent[v] = Some(u);
                    stack.push(v);
                }
            }
        }
        for &u in order.iter().rev() {
            let own = forest.nodes[u].label.unwrap_or(Label::MAX);
            min_below[u] = forest.nodes[u]
                .neighbors
                .iter()
                .filter(|&&v| Some(v) != parent[u])
                .map(|&v| min_below[v])
                .fold(own, Label::min);
        }

        let mut stack = vec![root];
        while let Some(u) = stack.pop() {
            let mut children: Vec<NodeId> = forest.nodes[u]
                .neighbors
                .iter()
                .copied()
                .filter(|&v| Some(v) != parent[u])
                .collect();
            children.sort_by_key(|&v| min_below[v]);
            stack.extend(children.iter().rev());
            emitted.push((u, children));
        }
    }

    let mut new_id = vec![0; len];
    for (i, (old, _)) in emitted.iter().enumerate() {
        new_id[*old] = i;
    }

    let width = forest.label_bound();
    let mut leaf_index = vec![None; width];
    let mut nodes = Vec::with_capacity(emitted.len());
    for (old, children) in &emitted {
        let mut neighbors = Vec::with_capacity(children.len() + 1);
        neighbors.extend(parent[*old].map(|p| new_id[p]));
        neighbors.extend(children.iter().map(|&c| new_id[c]));
        let label = forest.nodes[*old].label;
        if let Some(l) = label {
            leaf_index[l] = Some(nodes.len());
        }
        nodes.push(Node { neighbors, label, deleted: false });
    }
    // Trailing slots of labels that left the forest carry no information.
    let used = leaf_index.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
    leaf_index.truncate(used.max(forest.universe));

    forest.nodes = nodes;
    forest.leaf_index = leaf_index;
}
