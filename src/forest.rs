//! Labeled forest model.
//!
//! A [`Forest`] is an arena of [`Node`]s connected by undirected edges. Leaves
//! carry a [`Label`] from a dense namespace; a reverse index gives the owning
//! node of every label in O(1). Deleted nodes stay in the arena as tombstones
//! so node ids held by a caller never shift while a search mutates its working
//! copy; [`Forest::normalize`](crate::normalize) compacts them away.
//!
//! ```text
//!   A       C         specs:  0 -> [4]        label A
//!    \     /                  1 -> [4]        label B
//!     4---5                   2 -> [5]        label C
//!    /     \                  3 -> [5]        label D
//!   B       D                 4 -> [0, 1, 5]
//!                             5 -> [2, 3, 4]
//! ```

use std::collections::VecDeque;

use itertools::Itertools;

use crate::errors::ForestError;
use crate::labels::LabelMap;

/// Dense taxon identifier shared by the two forests of one computation.
pub type Label = usize;
/// Index of a node inside one forest's arena.
pub type NodeId = usize;

/// One `(node-id, neighbor-ids, optional leaf-label)` tuple handed to
/// [`Forest::new`]. Node ids are arbitrary but unique within one forest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeSpec {
    pub id: NodeId,
    pub neighbors: Vec<NodeId>,
    pub label: Option<Label>,
}

impl NodeSpec {
    pub fn new(id: NodeId, neighbors: Vec<NodeId>, label: Option<Label>) -> Self {
        Self { id, neighbors, label }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Node {
    pub(crate) neighbors: Vec<NodeId>,
    pub(crate) label: Option<Label>,
    pub(crate) deleted: bool,
}

impl Node {
    fn tombstone() -> Self {
        Node { neighbors: Vec::new(), label: None, deleted: true }
    }

    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }

    pub fn label(&self) -> Option<Label> {
        self.label
    }

    pub fn degree(&self) -> usize {
        self.neighbors.len()
    }
}

/// Connected part of a forest: its live node ids and its labels, both sorted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component {
    pub nodes: Vec<NodeId>,
    pub labels: Vec<Label>,
}

/// How leaf labels are written by [`Forest::to_newick`].
#[derive(Clone, Copy, Debug)]
pub enum LabelStyle<'a> {
    /// Anonymized output: the numeric label.
    Indices,
    /// Original taxon names through the reverse label map.
    Names(&'a LabelMap),
}

impl LabelStyle<'_> {
    fn text(&self, label: Label) -> String {
        match self {
            LabelStyle::Indices => label.to_string(),
            LabelStyle::Names(map) => map
                .name(label)
                .map_or_else(|| label.to_string(), str::to_owned),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Forest {
    pub(crate) nodes: Vec<Node>,
    pub(crate) leaf_index: Vec<Option<NodeId>>,
    pub(crate) universe: usize,
}

impl Forest {
    /// Builds a forest from node tuples over the labels `0..universe`.
    ///
    /// # Errors
    /// Rejects duplicate node ids or labels, labels outside the universe,
    /// references to undeclared nodes, one-sided or repeated edges, self loops,
    /// cycles, unlabeled nodes of degree below two and labeled nodes of degree
    /// above one.
    pub fn new(specs: Vec<NodeSpec>, universe: usize) -> Result<Self, ForestError> {
        let mut dense = std::collections::HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if dense.insert(spec.id, i).is_some() {
                return Err(ForestError::DuplicateNodeId(spec.id));
            }
        }

        let mut nodes = Vec::with_capacity(specs.len());
        let mut leaf_index = vec![None; universe];
        for (i, spec) in specs.iter().enumerate() {
            let mut neighbors = Vec::with_capacity(spec.neighbors.len());
            for &neighbor in &spec.neighbors {
                let &j = dense
                    .get(&neighbor)
                    .ok_or(ForestError::DanglingEdge { node: spec.id, neighbor })?;
                if j == i {
                    return Err(ForestError::SelfLoop(spec.id));
                }
                if neighbors.contains(&j) {
                    return Err(ForestError::ParallelEdge { node: spec.id, neighbor });
                }
                neighbors.push(j);
            }

            match spec.label {
                Some(label) => {
                    if label >= universe {
                        return Err(ForestError::LabelOutOfRange { label, universe });
                    }
                    if leaf_index[label].is_some() {
                        return Err(ForestError::DuplicateLabel(label));
                    }
                    if neighbors.len() > 1 {
                        return Err(ForestError::LabeledInternalNode(spec.id));
                    }
                    leaf_index[label] = Some(i);
                }
                None if neighbors.len() < 2 => return Err(ForestError::UnlabeledLeaf(spec.id)),
                None => {}
            }
            nodes.push(Node { neighbors, label: spec.label, deleted: false });
        }

        for (i, node) in nodes.iter().enumerate() {
            for &j in &node.neighbors {
                if !nodes[j].neighbors.contains(&i) {
                    return Err(ForestError::AsymmetricEdge { from: specs[i].id, to: specs[j].id });
                }
            }
        }

        let forest = Forest { nodes, leaf_index, universe };
        let edges = forest.nodes.iter().map(Node::degree).sum::<usize>() / 2;
        if edges + forest.component_count() != forest.nodes.len() {
            return Err(ForestError::Cycle);
        }
        Ok(forest)
    }

    pub fn universe(&self) -> usize {
        self.universe
    }

    /// Live node, `None` for tombstones and out-of-range ids.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).filter(|n| !n.deleted)
    }

    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].neighbors
    }

    pub fn label(&self, id: NodeId) -> Option<Label> {
        self.nodes[id].label
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.nodes[id].neighbors.len()
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].label.is_some()
    }

    /// Node carrying `label`, if the label is present.
    pub fn node_of(&self, label: Label) -> Option<NodeId> {
        self.leaf_index.get(label).copied().flatten()
    }

    /// Present labels in ascending order.
    pub fn labels(&self) -> Vec<Label> {
        self.leaf_index
            .iter()
            .enumerate()
            .filter_map(|(label, node)| node.map(|_| label))
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_index.iter().flatten().count()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter(|(_, n)| !n.deleted).map(|(i, _)| i)
    }

    pub fn node_count(&self) -> usize {
        self.node_ids().count()
    }

    /// Every edge once, as `(u, v)` with `u < v`.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.node_ids()
            .flat_map(|u| {
                self.nodes[u]
                    .neighbors
                    .iter()
                    .filter(move |&&v| u < v)
                    .map(move |&v| (u, v))
            })
            .collect()
    }

    /// Components ordered by their smallest label.
    pub fn components(&self) -> Vec<Component> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        for start in self.node_ids() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut nodes = Vec::new();
            let mut labels = Vec::new();
            let mut stack = vec![start];
            while let Some(u) = stack.pop() {
                nodes.push(u);
                labels.extend(self.nodes[u].label);
                for &v in &self.nodes[u].neighbors {
                    if !seen[v] {
                        seen[v] = true;
                        stack.push(v);
                    }
                }
            }
            nodes.sort_unstable();
            labels.sort_unstable();
            out.push(Component { nodes, labels });
        }
        out.sort_by_key(|c| c.labels.first().copied().unwrap_or(Label::MAX));
        out
    }

    pub fn component_count(&self) -> usize {
        self.components().len()
    }

    /// Node sequence from `from` to `to`, both included.
    pub fn path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let mut parent: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        parent[from] = Some(from);
        let mut queue = VecDeque::from([from]);
        while let Some(u) = queue.pop_front() {
            if u == to {
                break;
            }
            for &v in &self.nodes[u].neighbors {
                if parent[v].is_none() {
                    parent[v] = Some(u);
                    queue.push_back(v);
                }
            }
        }
        parent[to]?;
        let mut path = vec![to];
        let mut cur = to;
        while cur != from {
            cur = parent[cur]?;
            path.push(cur);
        }
        path.reverse();
        Some(path)
    }

    /// Nodes of the minimal subtree connecting the leaves of `labels`.
    ///
    /// Oriented away from the first present label, a node belongs to the
    /// spanning subtree exactly when some target leaf lies at or below it.
    /// Labels that are absent are ignored.
    pub fn spanning_nodes(&self, labels: &[Label]) -> Vec<NodeId> {
        let targets: Vec<NodeId> = labels.iter().filter_map(|&l| self.node_of(l)).collect();
        let Some(&root) = targets.first() else {
            return Vec::new();
        };
        let mut is_target = vec![false; self.nodes.len()];
        for &t in &targets {
            is_target[t] = true;
        }

        let mut parent: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(u) = stack.pop() {
            order.push(u);
            for &v in &self.nodes[u].neighbors {
                if Some(v) != parent[u] {
                    parent[v] = Some(u);
                    stack.push(v);
                }
            }
        }

        let mut below = vec![0usize; self.nodes.len()];
        for &u in order.iter().rev() {
            if is_target[u] {
                below[u] += 1;
            }
            if let Some(p) = parent[u] {
                below[p] += below[u];
            }
        }
        order.into_iter().filter(|&u| below[u] > 0).collect()
    }

    /// Restriction of this forest to disjoint label blocks: one component per
    /// block, the block's spanning subtree with degree-2 nodes suppressed.
    /// The result is normalized.
    ///
    /// # Errors
    /// [`ForestError::OverlappingBlocks`] when two blocks' spanning subtrees
    /// share a node, i.e. the blocks do not form an agreement forest here.
    pub fn restrict_to(&self, blocks: &[Vec<Label>]) -> Result<Forest, ForestError> {
        let mut owner: Vec<Option<usize>> = vec![None; self.nodes.len()];
        for (b, block) in blocks.iter().enumerate() {
            for u in self.spanning_nodes(block) {
                if owner[u].replace(b).is_some() {
                    return Err(ForestError::OverlappingBlocks(u));
                }
            }
        }

        let specs = owner
            .iter()
            .enumerate()
            .filter_map(|(u, block)| {
                let b = (*block)?;
                let neighbors = self.nodes[u]
                    .neighbors
                    .iter()
                    .copied()
                    .filter(|&v| owner[v] == Some(b))
                    .collect();
                Some(NodeSpec::new(u, neighbors, self.nodes[u].label))
            })
            .collect();

        let mut restricted = Forest::new(specs, self.label_bound())?;
        restricted.normalize();
        Ok(restricted)
    }

    /// First node violating the binary shape (leaves of degree at most one,
    /// internal nodes of degree three), with its degree.
    pub fn first_non_binary(&self) -> Option<(NodeId, usize)> {
        self.node_ids().map(|u| (u, self.degree(u))).find(|&(u, degree)| {
            if self.is_leaf(u) { degree > 1 } else { degree != 3 }
        })
    }

    /// Canonical text: one Newick string per component, components ordered by
    /// smallest label and separated by a space. Each component is written from
    /// the neighbor of its smallest leaf, children in canonical order, so
    /// isomorphic forests render identically.
    ///
    /// ```text
    /// AB|CD quartet   ->  (A,B,(C,D));
    /// forest {A} {B,C} ->  A; (B,C);
    /// ```
    pub fn to_newick(&self, style: LabelStyle<'_>) -> String {
        let canon = self.normalized();
        canon
            .components()
            .iter()
            .filter_map(|c| c.labels.first())
            .map(|&first| canon.component_newick(first, &style))
            .join(" ")
    }

    fn component_newick(&self, first: Label, style: &LabelStyle<'_>) -> String {
        let mut out = String::new();
        let Some(root) = self.node_of(first) else {
            return out;
        };
        match self.nodes[root].neighbors.first() {
            None => out.push_str(&style.text(first)),
            Some(&hub) if self.is_leaf(hub) => {
                out.push('(');
                out.push_str(&style.text(first));
                out.push(',');
                self.write_subtree(hub, None, style, &mut out);
                out.push(')');
            }
            Some(&hub) => self.write_subtree(hub, None, style, &mut out),
        }
        out.push(';');
        out
    }

    fn write_subtree(&self, u: NodeId, from: Option<NodeId>, style: &LabelStyle<'_>, out: &mut String) {
        if let Some(label) = self.nodes[u].label {
            out.push_str(&style.text(label));
            return;
        }
        out.push('(');
        let mut first = true;
        for &v in &self.nodes[u].neighbors {
            if Some(v) == from {
                continue;
            }
            if !first {
                out.push(',');
            }
            first = false;
            self.write_subtree(v, Some(u), style, out);
        }
        out.push(')');
    }

    // Working-copy mutation, used by the search.

    /// Smallest bound above every label index in use.
    pub(crate) fn label_bound(&self) -> usize {
        self.leaf_index.len().max(self.universe)
    }

    pub(crate) fn add_node(&mut self, label: Option<Label>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node { neighbors: Vec::new(), label, deleted: false });
        if let Some(label) = label {
            self.index_leaf(label, Some(id));
        }
        id
    }

    fn index_leaf(&mut self, label: Label, node: Option<NodeId>) {
        if label >= self.leaf_index.len() {
            self.leaf_index.resize(label + 1, None);
        }
        self.leaf_index[label] = node;
    }

    fn bury(&mut self, u: NodeId) {
        if let Some(label) = self.nodes[u].label {
            self.index_leaf(label, None);
        }
        self.nodes[u] = Node::tombstone();
    }

    fn replace_neighbor(&mut self, node: NodeId, old: NodeId, new: NodeId) {
        if let Some(slot) = self.nodes[node].neighbors.iter_mut().find(|x| **x == old) {
            *slot = new;
        }
    }

    pub(crate) fn connect(&mut self, u: NodeId, v: NodeId) {
        self.nodes[u].neighbors.push(v);
        self.nodes[v].neighbors.push(u);
    }

    /// Removes the edge `u - v` without touching node degrees elsewhere.
    pub(crate) fn disconnect(&mut self, u: NodeId, v: NodeId) -> bool {
        let Some(i) = self.nodes[u].neighbors.iter().position(|&x| x == v) else {
            return false;
        };
        self.nodes[u].neighbors.remove(i);
        self.nodes[v].neighbors.retain(|&x| x != u);
        true
    }

    /// Splices out `u` if it is an unlabeled node of degree two, keeping the
    /// position of the merged edge in both neighbors' lists.
    pub(crate) fn suppress(&mut self, u: NodeId) -> bool {
        let node = &self.nodes[u];
        if node.deleted || node.label.is_some() || node.neighbors.len() != 2 {
            return false;
        }
        let (x, y) = (node.neighbors[0], node.neighbors[1]);
        self.replace_neighbor(x, u, y);
        self.replace_neighbor(y, u, x);
        self.nodes[u] = Node::tombstone();
        true
    }

    /// Deletes an edge, splitting its component, and suppresses the endpoints.
    pub(crate) fn cut_edge(&mut self, u: NodeId, v: NodeId) -> bool {
        if !self.disconnect(u, v) {
            return false;
        }
        self.suppress(u);
        self.suppress(v);
        true
    }

    /// Cuts the pendant edge of a leaf. `false` if the leaf was already isolated.
    pub(crate) fn detach_leaf(&mut self, label: Label) -> bool {
        let Some(u) = self.node_of(label) else {
            return false;
        };
        let Some(&v) = self.nodes[u].neighbors.first() else {
            return false;
        };
        self.cut_edge(u, v)
    }

    pub(crate) fn remove_leaf(&mut self, label: Label) -> bool {
        let Some(u) = self.node_of(label) else {
            return false;
        };
        self.detach_leaf(label);
        self.bury(u);
        true
    }

    /// Replaces the sibling leaves `a` and `c` by one leaf labeled `merged`.
    pub(crate) fn contract_cherry(&mut self, a: Label, c: Label, merged: Label) {
        let (Some(na), Some(nc)) = (self.node_of(a), self.node_of(c)) else {
            return;
        };
        if self.nodes[na].neighbors.contains(&nc) {
            self.disconnect(na, nc);
            self.bury(na);
            self.bury(nc);
            self.add_node(Some(merged));
            return;
        }
        let Some(&hub) = self.nodes[na].neighbors.first() else {
            return;
        };
        self.disconnect(na, hub);
        self.disconnect(nc, hub);
        self.bury(na);
        self.bury(nc);
        self.nodes[hub].label = Some(merged);
        self.index_leaf(merged, Some(hub));
    }

    /// Inserts a fresh unlabeled node in the middle of edge `u - v`.
    pub(crate) fn subdivide(&mut self, u: NodeId, v: NodeId) -> NodeId {
        let w = self.add_node(None);
        self.replace_neighbor(u, v, w);
        self.replace_neighbor(v, u, w);
        self.nodes[w].neighbors = vec![u, v];
        w
    }

    /// Edges of the component containing `start`, as `(u, v)` with `u < v`.
    pub(crate) fn component_edges(&self, start: NodeId) -> Vec<(NodeId, NodeId)> {
        let mut seen = vec![false; self.nodes.len()];
        seen[start] = true;
        let mut stack = vec![start];
        let mut edges = Vec::new();
        while let Some(u) = stack.pop() {
            for &v in &self.nodes[u].neighbors {
                if u < v {
                    edges.push((u, v));
                } else {
                    edges.push((v, u));
                }
                if !seen[v] {
                    seen[v] = true;
                    stack.push(v);
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Labels reachable from `root` without passing through `from`.
    pub(crate) fn leaves_beyond(&self, root: NodeId, from: NodeId) -> Vec<Label> {
        let mut labels = Vec::new();
        let mut stack = vec![(root, from)];
        while let Some((u, parent)) = stack.pop() {
            labels.extend(self.nodes[u].label);
            stack.extend(self.nodes[u].neighbors.iter().filter(|&&v| v != parent).map(|&v| (v, u)));
        }
        labels.sort_unstable();
        labels
    }
}
