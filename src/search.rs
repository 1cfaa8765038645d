//! Exact maximum agreement forest search.
//!
//! # Overview
//! The first forest `T1` is only ever reduced by removing or contracting
//! leaves; the second forest `F2` is where edges get cut. Every search state
//! repeatedly
//!
//! 1. finishes leaves that are isolated in `F2` (they are complete
//!    components of the agreement forest) and cuts leaves that are isolated
//!    in `T1` out of `F2`;
//! 2. takes the `T1` cherry `(a, c)` with the smallest labels;
//! 3. contracts it into a fresh label when `a` and `c` are siblings in `F2`,
//!    or otherwise branches.
//!
//! ```text
//!  a and c in different F2 components     ->  cut a | cut c
//!  F2 path a - v1 - ... - vm - c,         ->  cut a | cut c |
//!  pendant subtree Bi hanging at vi            keep Bj, cut every other Bi
//! ```
//!
//! The branching is exhaustive, so the best terminal state is a maximum
//! agreement forest. `cost` counts cuts, so at a terminal state it is the
//! number of components minus one.
//!
//! # Protection
//! A protected label must not end up as a singleton component. Branches that
//! would isolate a protected leaf are skipped. The rules that add protections
//! only exclude agreement forests that another branch still reaches.
//!
//! # Tie-breaking
//! Cherries are picked by smallest label; children are explored in the order
//! cut `a`, cut `c`, keep `B1` .. keep `Bm`. Among equally small forests the
//! first one found is reported.

use std::collections::HashSet;

use log::{debug, trace};

use crate::bitset::Bitset;
use crate::bounds;
use crate::config::{DistanceConfig, Optimizations};
use crate::forest::{Forest, Label, NodeId};
use crate::replug;

/// Which edits a search may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MoveSet {
    /// Arbitrary edge cuts in the second forest.
    Tbr,
    /// Removal of whole leaves, weighted by the number of taxa they stand for.
    Replug,
}

/// Whether a reported distance is proven.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SearchStatus {
    Optimal,
    /// The node limit stopped the search; the distance is the best upper
    /// bound found and `lower` the best proven lower bound.
    Bounded { lower: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Solution {
    pub(crate) cost: usize,
    /// Agreement forest as sorted label blocks, ordered by first label.
    pub(crate) blocks: Vec<Vec<Label>>,
}

/// Subtree hanging off the `F2` path between the cherry leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Pendant {
    pub(crate) attach: NodeId,
    pub(crate) root: NodeId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Relation {
    Siblings,
    Apart,
    /// Pendants ordered from the `a` end of the path to the `c` end.
    Path(Vec<Pendant>),
}

pub(crate) enum Step {
    Terminal(Solution),
    Branch(Vec<SearchState>),
}

#[derive(Clone, Debug)]
pub(crate) struct SearchState {
    pub(crate) t1: Forest,
    pub(crate) f2: Forest,
    /// Original labels behind each working label.
    groups: Vec<Vec<Label>>,
    finished: Vec<Vec<Label>>,
    pub(crate) cost: usize,
    protected: Bitset,
}

impl SearchState {
    pub(crate) fn new(f1: &Forest, f2: &Forest) -> Self {
        let base = f1.label_bound().max(f2.label_bound());
        SearchState {
            t1: f1.clone(),
            f2: f2.clone(),
            groups: (0..base).map(|l| vec![l]).collect(),
            finished: Vec::new(),
            cost: f2.component_count().saturating_sub(1),
            protected: Bitset::with_capacity(2 * base),
        }
    }

    pub(crate) fn is_protected(&self, label: Label) -> bool {
        self.protected.contains(label)
    }

    pub(crate) fn protect(&mut self, label: Label) {
        self.protected.set(label);
    }

    pub(crate) fn group_size(&self, label: Label) -> usize {
        self.groups[label].len()
    }

    fn is_protected_leaf(&self, node: NodeId) -> bool {
        self.f2.label(node).is_some_and(|l| self.is_protected(l))
    }

    /// Applies the forced moves until none is left.
    pub(crate) fn tidy(&mut self) {
        loop {
            let mut changed = false;
            for label in self.f2.labels() {
                let Some(n2) = self.f2.node_of(label) else {
                    continue;
                };
                if self.f2.degree(n2) == 0 {
                    self.finish(label);
                    changed = true;
                } else if self.t1.node_of(label).is_some_and(|n1| self.t1.degree(n1) == 0) {
                    self.detach(label);
                    self.finish(label);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn finish(&mut self, label: Label) {
        self.finished.push(self.groups[label].clone());
        self.t1.remove_leaf(label);
        self.f2.remove_leaf(label);
    }

    /// Cuts the leaf out of `F2`.
    pub(crate) fn detach(&mut self, label: Label) {
        if self.f2.detach_leaf(label) {
            self.cost += 1;
        }
    }

    pub(crate) fn cut_pendant(&mut self, pendant: Pendant) {
        if self.f2.cut_edge(pendant.attach, pendant.root) {
            self.cost += 1;
        }
    }

    /// Removes the leaf from both forests; every taxon behind it becomes a
    /// singleton and costs one move.
    pub(crate) fn discard(&mut self, label: Label) {
        self.cost += self.groups[label].len();
        self.finished.extend(self.groups[label].iter().map(|&l| vec![l]));
        self.t1.remove_leaf(label);
        self.f2.remove_leaf(label);
    }

    pub(crate) fn contract(&mut self, a: Label, c: Label) -> Label {
        let merged = self.groups.len();
        let mut group = self.groups[a].clone();
        group.extend_from_slice(&self.groups[c]);
        group.sort_unstable();
        self.groups.push(group);
        self.t1.contract_cherry(a, c, merged);
        self.f2.contract_cherry(a, c, merged);
        merged
    }

    /// `T1` cherry `(a, c)`: `a` is the smallest label with a leaf sibling,
    /// `c` its smallest leaf sibling. `None` once `T1` has no leaves left.
    pub(crate) fn next_cherry(&self) -> Option<(Label, Label)> {
        for a in self.t1.labels() {
            let Some(na) = self.t1.node_of(a) else {
                continue;
            };
            let Some(&hub) = self.t1.neighbors(na).first() else {
                continue;
            };
            if let Some(c) = self.t1.label(hub) {
                return Some((a, c));
            }
            let sibling = self.t1
                .neighbors(hub)
                .iter()
                .filter(|&&v| v != na)
                .filter_map(|&v| self.t1.label(v))
                .min();
            if let Some(c) = sibling {
                return Some((a, c));
            }
        }
        None
    }

    pub(crate) fn relation(&self, a: Label, c: Label) -> Relation {
        let (Some(na), Some(nc)) = (self.f2.node_of(a), self.f2.node_of(c)) else {
            return Relation::Apart;
        };
        let Some(path) = self.f2.path(na, nc) else {
            return Relation::Apart;
        };
        if path.len() <= 3 {
            return Relation::Siblings;
        }
        let pendants = path
            .windows(3)
            .flat_map(|w| {
                let (prev, v, next) = (w[0], w[1], w[2]);
                self.f2
                    .neighbors(v)
                    .iter()
                    .filter(move |&&x| x != prev && x != next)
                    .map(move |&root| Pendant { attach: v, root })
            })
            .collect();
        Relation::Path(pendants)
    }

    pub(crate) fn solution(&self) -> Solution {
        let mut blocks = self.finished.clone();
        blocks.extend(self.f2.labels().into_iter().map(|l| self.groups[l].clone()));
        for block in &mut blocks {
            block.sort_unstable();
        }
        blocks.sort();
        Solution { cost: self.cost, blocks }
    }

    /// Runs forced moves and contractions up to the next branching point.
    pub(crate) fn advance(mut self, moves: MoveSet, opts: &Optimizations, enumerate: bool) -> Step {
        loop {
            self.tidy();
            let Some((a, c)) = self.next_cherry() else {
                return Step::Terminal(self.solution());
            };
            match self.relation(a, c) {
                Relation::Siblings => {
                    self.contract(a, c);
                }
                relation => {
                    let children = match moves {
                        MoveSet::Tbr => tbr_children(&self, a, c, relation, opts, enumerate),
                        MoveSet::Replug => replug::children(&self, a, c, relation, opts),
                    };
                    return Step::Branch(children);
                }
            }
        }
    }
}

fn tbr_children(
    state: &SearchState,
    a: Label,
    c: Label,
    relation: Relation,
    opts: &Optimizations,
    enumerate: bool,
) -> Vec<SearchState> {
    let mut children = Vec::new();
    if !state.is_protected(a) {
        let mut child = state.clone();
        child.detach(a);
        children.push(child);
    }
    if !state.is_protected(c) {
        let mut child = state.clone();
        child.detach(c);
        if opts.protect_a {
            child.protect(a);
        }
        children.push(child);
    }

    let Relation::Path(pendants) = relation else {
        return children;
    };
    let skip = if opts.two_b && !enumerate {
        two_b_skips(state, a, c, &pendants)
    } else {
        vec![false; pendants.len()]
    };

    let mut first_keep = true;
    for keep in 0..pendants.len() {
        if skip[keep] {
            continue;
        }
        let isolates_protected = pendants
            .iter()
            .enumerate()
            .any(|(i, p)| i != keep && state.is_protected_leaf(p.root));
        if isolates_protected {
            continue;
        }
        let mut child = state.clone();
        for (i, &pendant) in pendants.iter().enumerate() {
            if i != keep {
                child.cut_pendant(pendant);
            }
        }
        child.tidy();
        let merged = child.contract(a, c);
        if opts.protect_b && !first_keep {
            child.protect(merged);
        }
        first_keep = false;
        children.push(child);
    }
    children
}

/// Keep-branches made redundant by the 2B rule.
///
/// With path `a - v1 - v2 - c` and a leaf `b` hanging at `v1` that sits next
/// to the cherry in `T1`, every agreement forest that cuts `b` and keeps
/// `a, c` together maps to one of the same size where `c` is a singleton and
/// `b` joins `a`. That forest lies in the cut-`c` branch, which exists when
/// `c` is unprotected. The case of `b` at `v2` is symmetric.
fn two_b_skips(state: &SearchState, a: Label, c: Label, pendants: &[Pendant]) -> Vec<bool> {
    let mut skip = vec![false; pendants.len()];
    if pendants.len() != 2 {
        return skip;
    }
    if let Some(b) = state.f2.label(pendants[0].root) {
        if !state.is_protected(c) && beside_cherry(&state.t1, a, c, b) {
            skip[1] = true;
        }
    }
    if let Some(b) = state.f2.label(pendants[1].root) {
        if !state.is_protected(a) && beside_cherry(&state.t1, a, c, b) {
            skip[0] = true;
        }
    }
    skip
}

/// Whether `b` is adjacent to the parent of the cherry `(a, c)` in `t1`,
/// either directly or through the next internal node.
fn beside_cherry(t1: &Forest, a: Label, c: Label, b: Label) -> bool {
    let (Some(na), Some(nc), Some(nb)) = (t1.node_of(a), t1.node_of(c), t1.node_of(b)) else {
        return false;
    };
    let Some(&hub) = t1.neighbors(na).first() else {
        return false;
    };
    if hub == nc {
        return false;
    }
    if t1.neighbors(hub).contains(&nb) {
        return true;
    }
    t1.neighbors(hub)
        .iter()
        .filter(|&&q| q != na && q != nc && !t1.is_leaf(q))
        .any(|&q| t1.neighbors(q).contains(&nb))
}

/// Lower bound on the cost still to be paid from `state`.
fn remaining_bound(state: &SearchState, moves: MoveSet, opts: &Optimizations) -> usize {
    if opts.branch_and_bound {
        bounds::approximate(state, moves).conflicts
    } else {
        0
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Limits {
    /// Only solutions cheaper than this are of interest.
    pub(crate) ceiling: Option<usize>,
    pub(crate) node_limit: Option<u64>,
}

pub(crate) struct Outcome {
    pub(crate) best: Option<Solution>,
    pub(crate) complete: bool,
}

/// Depth-first branch and bound from `root`.
///
/// `floor` is a proven lower bound on the optimum: an incumbent reaching it
/// ends the search. `seed` is an incumbent known before searching.
pub(crate) fn solve(
    root: SearchState,
    moves: MoveSet,
    opts: &Optimizations,
    floor: usize,
    seed: Option<Solution>,
    limits: Limits,
) -> Outcome {
    let mut best = seed;
    let mut stack = vec![root];
    let mut expanded = 0u64;
    let mut complete = true;

    while let Some(state) = stack.pop() {
        let window = best.as_ref().map(|b| b.cost).into_iter().chain(limits.ceiling).min();
        if window.is_some_and(|w| w <= floor) {
            break;
        }
        if limits.node_limit.is_some_and(|limit| expanded >= limit) {
            complete = false;
            break;
        }
        expanded += 1;

        let bound = state.cost + remaining_bound(&state, moves, opts);
        if window.is_some_and(|w| bound >= w) {
            continue;
        }
        match state.advance(moves, opts, false) {
            Step::Terminal(found) => {
                if window.is_none_or(|w| found.cost < w) {
                    trace!("incumbent improved to cost {}", found.cost);
                    best = Some(found);
                }
            }
            Step::Branch(children) => stack.extend(children.into_iter().rev()),
        }
    }

    debug!(
        "{moves:?} search expanded {expanded} states, best cost {:?}, complete {complete}",
        best.as_ref().map(|b| b.cost)
    );
    Outcome { best, complete }
}

/// Minimum agreement forest under `moves`, seeded and bounded by the
/// estimators and cut short by the configured node limit.
pub(crate) fn minimum(
    f1: &Forest,
    f2: &Forest,
    moves: MoveSet,
    config: &DistanceConfig,
) -> (Solution, SearchStatus) {
    let opts = config.optimizations;
    let root = SearchState::new(f1, f2);
    let estimate = bounds::estimate(&root, moves);
    let seeded = match moves {
        MoveSet::Tbr => opts.approx_estimate,
        MoveSet::Replug => opts.replug_estimate,
    };
    let seed = seeded.then(|| estimate.upper.clone());
    let limits = Limits { ceiling: None, node_limit: config.node_limit };
    let outcome = solve(root, moves, &opts, estimate.lower, seed, limits);

    let best = match outcome.best {
        Some(found) if found.cost <= estimate.upper.cost => found,
        _ => estimate.upper,
    };
    let status = if outcome.complete || best.cost <= estimate.lower {
        SearchStatus::Optimal
    } else {
        SearchStatus::Bounded { lower: estimate.lower }
    };
    (best, status)
}

/// Lazy walk over every distinct agreement forest of cost `target`.
pub(crate) struct PartitionIter {
    stack: Vec<SearchState>,
    moves: MoveSet,
    opts: Optimizations,
    target: usize,
    seen: HashSet<Vec<Vec<Label>>>,
}

impl PartitionIter {
    pub(crate) fn new(root: SearchState, moves: MoveSet, opts: Optimizations, target: usize) -> Self {
        PartitionIter { stack: vec![root], moves, opts, target, seen: HashSet::new() }
    }
}

impl Iterator for PartitionIter {
    type Item = Vec<Vec<Label>>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(state) = self.stack.pop() {
            if state.cost + remaining_bound(&state, self.moves, &self.opts) > self.target {
                continue;
            }
            match state.advance(self.moves, &self.opts, true) {
                Step::Terminal(found) => {
                    if found.cost == self.target && self.seen.insert(found.blocks.clone()) {
                        return Some(found.blocks);
                    }
                }
                Step::Branch(children) => self.stack.extend(children.into_iter().rev()),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::tests::{caterpillar, quartet};

    fn optimum(f1: &Forest, f2: &Forest, opts: Optimizations) -> Solution {
        let root = SearchState::new(f1, f2);
        solve(root, MoveSet::Tbr, &opts, 0, None, Limits::default())
            .best
            .unwrap()
    }

    #[test]
    fn test_cherry_selection_prefers_small_labels() {
        let f = caterpillar(&[3, 5, 0, 1, 4, 2]);
        let state = SearchState::new(&f, &f);
        // cherries are {3,5} and {4,2}; 2 is the smallest label in any cherry
        assert_eq!(state.next_cherry(), Some((2, 4)));
    }

    #[test]
    fn test_relation_path_pendants() {
        let t = caterpillar(&[0, 1, 2, 3, 4, 5]);
        let state = SearchState::new(&t, &t);
        match state.relation(0, 5) {
            Relation::Path(pendants) => {
                let roots: Vec<_> = pendants.iter().map(|p| state.f2.label(p.root)).collect();
                assert_eq!(roots, vec![Some(1), Some(2), Some(3), Some(4)]);
            }
            other => panic!("unexpected relation {other:?}"),
        }
        assert_eq!(state.relation(0, 1), Relation::Siblings);
    }

    #[test]
    fn test_identical_trees_cost_nothing() {
        let t = caterpillar(&[0, 1, 2, 3, 4, 5, 6]);
        let best = optimum(&t, &t, Optimizations::default());
        assert_eq!(best.cost, 0);
        assert_eq!(best.blocks, vec![vec![0, 1, 2, 3, 4, 5, 6]]);
    }

    #[test]
    fn test_quartet_swap() {
        let best = optimum(&quartet(0, 1, 2, 3), &quartet(0, 2, 1, 3), Optimizations::default());
        assert_eq!(best.cost, 1);
        assert_eq!(best.blocks.len() - 1, 1);
        assert_eq!(best.blocks.len(), 2);
    }

    #[test]
    fn test_optimizations_agree() {
        let t1 = caterpillar(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let t2 = caterpillar(&[0, 4, 7, 2, 6, 1, 5, 3]);
        let fast = optimum(&t1, &t2, Optimizations::default());
        let slow = optimum(&t1, &t2, Optimizations::none());
        assert_eq!(fast.cost, slow.cost);
        assert_eq!(fast.blocks.len() - 1, fast.cost);
    }

    #[test]
    fn test_minimum_with_node_limit_is_bounded_or_optimal() {
        let t1 = caterpillar(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let t2 = caterpillar(&[7, 3, 5, 1, 6, 0, 4, 2]);
        let exact = minimum(&t1, &t2, MoveSet::Tbr, &DistanceConfig::default());
        assert_eq!(exact.1, SearchStatus::Optimal);

        let config = DistanceConfig::default().with_node_limit(1);
        let (found, status) = minimum(&t1, &t2, MoveSet::Tbr, &config);
        assert!(found.cost >= exact.0.cost);
        match status {
            SearchStatus::Optimal => assert_eq!(found.cost, exact.0.cost),
            SearchStatus::Bounded { lower } => assert!(lower <= exact.0.cost),
        }
    }

    #[test]
    fn test_partitions_are_distinct_and_optimal() {
        let t1 = quartet(0, 1, 2, 3);
        let t2 = quartet(0, 2, 1, 3);
        let root = SearchState::new(&t1, &t2);
        let all: Vec<_> = PartitionIter::new(root, MoveSet::Tbr, Optimizations::default(), 1).collect();
        // every single-leaf removal resolves the quartet
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|blocks| blocks.len() == 2));
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_forest_inputs() {
        let whole = quartet(0, 1, 2, 3);
        let mut split = whole.clone();
        split.cut_edge(4, 5);
        let split = split.normalized();
        let best = optimum(&whole, &split, Optimizations::default());
        assert_eq!(best.cost, 1);
        assert_eq!(best.blocks, vec![vec![0, 1], vec![2, 3]]);
        let reverse = optimum(&split, &whole, Optimizations::default());
        assert_eq!(reverse.blocks, best.blocks);
    }
}
