//! Unrooted SPR distance.
//!
//! Iterative deepening over trees, starting at the exact TBR distance (or
//! the TBR lower bound) and stopping below the replug distance, which single
//! leaf moves always achieve. A state reached with `r` moves left is dropped
//! unless its TBR distance to the target is at most `r`.
//!
//! Every state first has the cherries it shares with the target contracted,
//! the same step the agreement forest search takes for sibling cherries, so
//! states shrink as they approach the target. When the TBR distance `t`
//! equals the moves left, each remaining move must lower it by one. Such a
//! move cuts an edge that leaves every component of some maximum agreement
//! forest whole, so only those edges are cut:
//!
//! ```text
//!  T  = cut e, regraft        F'' = maximum agreement forest of T, t + 1 blocks
//!  T' : tbr(T') = t - 1  =>   F'' = blocks of F' split at the new edge
//!                             every block of F'' lies on one side of e
//! ```
//!
//! With slack left, the whole neighbourhood is searched.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::bitset::Bitset;
use crate::bounds;
use crate::config::{DistanceConfig, Optimizations};
use crate::forest::{Forest, Label, NodeId};
use crate::search::{self, Limits, MoveSet, PartitionIter, SearchState, SearchStatus};

/// Every distinct tree one uSPR move away from `tree`, normalized.
///
/// A move cuts an edge, suppresses the node left behind on the pruned side's
/// former neighbour, and regrafts the pruned subtree onto any other edge of
/// the remaining tree.
pub fn spr_neighbors(tree: &Forest) -> Vec<Forest> {
    let home = tree.normalized();
    let cuts = home.edges();
    regrafts(&home, &cuts)
}

/// Distinct trees reached from the normalized `home` by cutting one of
/// `cuts` and regrafting either side.
fn regrafts(home: &Forest, cuts: &[(NodeId, NodeId)]) -> Vec<Forest> {
    let mut seen = HashSet::new();
    seen.insert(home.clone());
    let mut out = Vec::new();

    for &(x, y) in cuts {
        for (stay, moving) in [(x, y), (y, x)] {
            if home.is_leaf(stay) {
                continue;
            }
            let rest: Vec<_> = home.neighbors(stay).iter().copied().filter(|&v| v != moving).collect();
            let Some(&anchor) = rest.first() else {
                continue;
            };
            let mut pruned = home.clone();
            pruned.disconnect(stay, moving);
            pruned.suppress(stay);

            for (p, q) in pruned.component_edges(anchor) {
                let mut grafted = pruned.clone();
                let joint = grafted.subdivide(p, q);
                grafted.connect(joint, moving);
                grafted.normalize();
                if seen.insert(grafted.clone()) {
                    out.push(grafted);
                }
            }
        }
    }
    out
}

/// Leaves sharing a neighbour with `a`, or adjacent to it.
fn leaf_siblings(f: &Forest, a: Label) -> Vec<Label> {
    let Some(na) = f.node_of(a) else {
        return Vec::new();
    };
    let Some(&hub) = f.neighbors(na).first() else {
        return Vec::new();
    };
    if let Some(c) = f.label(hub) {
        return vec![c];
    }
    f.neighbors(hub).iter().filter(|&&v| v != na).filter_map(|&v| f.label(v)).collect()
}

fn are_siblings(f: &Forest, a: Label, c: Label) -> bool {
    let (Some(na), Some(nc)) = (f.node_of(a), f.node_of(c)) else {
        return false;
    };
    let hub = f.neighbors(na).first();
    f.neighbors(na).contains(&nc) || (hub.is_some() && hub == f.neighbors(nc).first())
}

fn common_cherry(tree: &Forest, target: &Forest) -> Option<(Label, Label)> {
    tree.labels().into_iter().find_map(|a| {
        leaf_siblings(tree, a)
            .into_iter()
            .find(|&c| are_siblings(target, a, c))
            .map(|c| (a, c))
    })
}

/// Tree and target with every common cherry contracted into its smaller
/// label, both normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Reduced {
    tree: Forest,
    target: Forest,
}

impl Reduced {
    fn new(mut tree: Forest, mut target: Forest) -> Self {
        while let Some((a, c)) = common_cherry(&tree, &target) {
            let merged = a.min(c);
            tree.contract_cherry(a, c, merged);
            target.contract_cherry(a, c, merged);
        }
        tree.normalize();
        target.normalize();
        Reduced { tree, target }
    }

    fn is_solved(&self) -> bool {
        self.tree == self.target
    }
}

/// Exact TBR distance from `tree` to `target` if it is at most `budget`.
fn tbr_within(tree: &Forest, target: &Forest, budget: usize, opts: &Optimizations) -> Option<usize> {
    let root = SearchState::new(tree, target);
    let estimate = bounds::estimate(&root, MoveSet::Tbr);
    if estimate.lower > budget {
        return None;
    }
    if estimate.upper.cost <= estimate.lower {
        return Some(estimate.lower);
    }
    let seed = (estimate.upper.cost <= budget).then_some(estimate.upper);
    let limits = Limits { ceiling: Some(budget + 1), node_limit: None };
    search::solve(root, MoveSet::Tbr, opts, estimate.lower, seed, limits)
        .best
        .map(|found| found.cost)
}

/// Edges of `pair.tree` whose split keeps every block of at least one
/// maximum agreement forest of cost `cost` whole.
fn agreeing_cuts(pair: &Reduced, cost: usize, opts: &Optimizations) -> Vec<(NodeId, NodeId)> {
    let tree = &pair.tree;
    let edges = tree.edges();
    let sides: Vec<Bitset> = edges
        .iter()
        .map(|&(x, y)| {
            let mut side = Bitset::with_capacity(tree.label_bound());
            for label in tree.leaves_beyond(y, x) {
                side.set(label);
            }
            side
        })
        .collect();

    let mut keep = vec![false; edges.len()];
    let root = SearchState::new(tree, &pair.target);
    for blocks in PartitionIter::new(root, MoveSet::Tbr, *opts, cost) {
        for (kept, side) in keep.iter_mut().zip(&sides) {
            *kept = *kept
                || blocks.iter().all(|block| {
                    let inside = block.iter().filter(|&&l| side.contains(l)).count();
                    inside == 0 || inside == block.len()
                });
        }
        if keep.iter().all(|&k| k) {
            break;
        }
    }
    edges.into_iter().zip(keep).filter_map(|(edge, kept)| kept.then_some(edge)).collect()
}

struct Deepening<'a> {
    opts: &'a Optimizations,
    /// Most moves any visit of a state had left, this round.
    seen: HashMap<Reduced, usize>,
    expanded: u64,
    limit: Option<u64>,
}

impl Deepening<'_> {
    /// `Some(found)`, or `None` once the node limit is spent.
    fn run(&mut self, pair: &Reduced, remaining: usize) -> Option<bool> {
        if pair.is_solved() {
            return Some(true);
        }
        if remaining == 0 {
            return Some(false);
        }
        if self.limit.is_some_and(|limit| self.expanded >= limit) {
            return None;
        }
        self.expanded += 1;
        let Some(tbr) = tbr_within(&pair.tree, &pair.target, remaining, self.opts) else {
            return Some(false);
        };

        let moves = if tbr == remaining {
            let cuts = agreeing_cuts(pair, tbr, self.opts);
            trace!("tight state on {} leaves: {} cuts", pair.tree.leaf_count(), cuts.len());
            regrafts(&pair.tree, &cuts)
        } else {
            spr_neighbors(&pair.tree)
        };

        let rest = remaining - 1;
        for next in moves {
            let child = Reduced::new(next, pair.target.clone());
            if self.seen.get(&child).is_some_and(|&r| r >= rest) {
                continue;
            }
            self.seen.insert(child.clone(), rest);
            if self.run(&child, rest)? {
                return Some(true);
            }
        }
        Some(false)
    }
}

/// uSPR distance between two binary trees over the same labels.
///
/// The reported distance never exceeds the replug distance computed with the
/// same configuration.
pub(crate) fn distance(f1: &Forest, f2: &Forest, config: &DistanceConfig) -> (usize, SearchStatus) {
    let start = f1.normalized();
    let target = f2.normalized();
    if start == target {
        return (0, SearchStatus::Optimal);
    }
    let opts = config.optimizations;

    let floor = if opts.tbr_estimate {
        match search::minimum(&start, &target, MoveSet::Tbr, config) {
            (tbr, SearchStatus::Optimal) => tbr.cost,
            (_, SearchStatus::Bounded { lower }) => lower,
        }
    } else {
        bounds::estimate(&SearchState::new(&start, &target), MoveSet::Tbr).lower
    };
    let (replug, _) = search::minimum(&start, &target, MoveSet::Replug, config);
    let ceiling = replug.cost;

    let root = Reduced::new(start, target);
    let mut deepening = Deepening { opts: &opts, seen: HashMap::new(), expanded: 0, limit: config.node_limit };
    for k in floor.max(1)..ceiling {
        deepening.seen.clear();
        deepening.seen.insert(root.clone(), k);
        match deepening.run(&root, k) {
            Some(true) => {
                debug!("uSPR path of length {k} found after {} states", deepening.expanded);
                return (k, SearchStatus::Optimal);
            }
            Some(false) => debug!("no uSPR path of length {k}"),
            None => return (ceiling, SearchStatus::Bounded { lower: k }),
        }
    }
    (ceiling, SearchStatus::Optimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::tests::{caterpillar, quartet};

    #[test]
    fn test_neighbourhood_sizes() {
        // 2(n-3)(2n-7) neighbours for a binary tree on n leaves
        assert_eq!(spr_neighbors(&quartet(0, 1, 2, 3)).len(), 2);
        assert_eq!(spr_neighbors(&caterpillar(&[0, 1, 2, 3, 4])).len(), 12);
        assert_eq!(spr_neighbors(&caterpillar(&[0, 1, 2, 3, 4, 5])).len(), 30);
    }

    #[test]
    fn test_neighbours_are_binary_and_distinct() {
        let tree = caterpillar(&[0, 1, 2, 3, 4, 5]);
        let neighbours = spr_neighbors(&tree);
        let unique: HashSet<_> = neighbours.iter().collect();
        assert_eq!(unique.len(), neighbours.len());
        assert!(neighbours.iter().all(|t| t.first_non_binary().is_none()));
        assert!(!neighbours.contains(&tree.normalized()));
    }

    #[test]
    fn test_quartet_distance() {
        let (d, status) = distance(&quartet(0, 1, 2, 3), &quartet(0, 2, 1, 3), &DistanceConfig::default());
        assert_eq!(d, 1);
        assert_eq!(status, SearchStatus::Optimal);
    }

    #[test]
    fn test_estimate_switch_agrees() {
        let t1 = caterpillar(&[0, 1, 2, 3, 4, 5, 6]);
        let t2 = caterpillar(&[3, 6, 0, 5, 1, 4, 2]);
        let with = distance(&t1, &t2, &DistanceConfig::default());
        let mut opts = Optimizations::default();
        opts.tbr_estimate = false;
        let without = distance(&t1, &t2, &DistanceConfig::default().with_optimizations(opts));
        assert_eq!(with, without);
    }

    #[test]
    fn test_shared_cherries_are_contracted() {
        let same = Reduced::new(caterpillar(&[0, 1, 2, 3, 4, 5]), caterpillar(&[1, 0, 2, 3, 5, 4]));
        assert!(same.is_solved());
        assert_eq!(same.tree.leaf_count(), 1);

        // {0,1} and {4,5} are shared; what is left is the quartet 02|34 against 03|24
        let pair = Reduced::new(caterpillar(&[0, 1, 2, 3, 4, 5]), caterpillar(&[1, 0, 3, 2, 5, 4]));
        assert!(!pair.is_solved());
        assert_eq!(pair.tree.labels(), vec![0, 2, 3, 4]);
        assert_eq!(pair.target.labels(), vec![0, 2, 3, 4]);
        assert_eq!(spr_neighbors(&pair.tree).len(), 2);
    }

    #[test]
    fn test_agreeing_cuts_reach_every_tbr_step() {
        let exact = |tree: &Forest, target: &Forest| {
            search::minimum(tree, target, MoveSet::Tbr, &DistanceConfig::default()).0.cost
        };
        let pair = Reduced::new(caterpillar(&[0, 1, 2, 3, 4, 5, 6]), caterpillar(&[3, 6, 0, 5, 1, 4, 2]));
        let tbr = exact(&pair.tree, &pair.target);
        let cuts = agreeing_cuts(&pair, tbr, &Optimizations::default());
        assert!(!cuts.is_empty());

        let tight: HashSet<_> = regrafts(&pair.tree, &cuts).into_iter().collect();
        let steps: Vec<_> = spr_neighbors(&pair.tree)
            .into_iter()
            .filter(|next| exact(next, &pair.target) + 1 == tbr)
            .collect();
        assert!(steps.iter().all(|next| tight.contains(next)));
    }

    #[test]
    fn test_tbr_within_budget() {
        let t1 = caterpillar(&[0, 1, 2, 3, 4, 5, 6]);
        let t2 = caterpillar(&[3, 6, 0, 5, 1, 4, 2]);
        let tbr = search::minimum(&t1, &t2, MoveSet::Tbr, &DistanceConfig::default()).0.cost;
        let opts = Optimizations::default();
        assert_eq!(tbr_within(&t1, &t2, tbr, &opts), Some(tbr));
        assert_eq!(tbr_within(&t1, &t2, tbr + 2, &opts), Some(tbr));
        assert_eq!(tbr_within(&t1, &t2, tbr - 1, &opts), None);
    }

    #[test]
    fn test_never_above_replug() {
        let t1 = caterpillar(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let t2 = caterpillar(&[7, 2, 5, 0, 6, 3, 1, 4]);
        for config in [DistanceConfig::default(), DistanceConfig::default().with_node_limit(2)] {
            let (replug, _) = search::minimum(&t1, &t2, MoveSet::Replug, &config);
            let (d, status) = distance(&t1, &t2, &config);
            assert!(d <= replug.cost);
            if let SearchStatus::Bounded { lower } = status {
                assert!(lower <= d);
            }
        }
    }
}
