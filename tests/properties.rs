//! Randomized checks of the distance operations against brute-force oracles.

use std::collections::{HashSet, VecDeque};

use itertools::Itertools;
use proptest::collection::vec;
use proptest::prelude::*;
use rust_python_uspr::{
    agreement_forests, count_agreement_forests, lower_bound, replug_distance, spr_neighbors,
    tbr_distance, upper_bound, uspr_distance, DistanceConfig, Forest, Label, NodeSpec,
    Optimizations,
};

/// Binary tree on `order.len()` leaves grown by inserting leaf `k` on the
/// edge chosen by `picks[k]`.
fn build_tree(order: &[Label], picks: &[usize]) -> Forest {
    let mut adjacency: Vec<Vec<usize>> = vec![vec![1, 2, 3], vec![0], vec![0], vec![0]];
    let mut labels: Vec<Option<Label>> = vec![None, Some(order[0]), Some(order[1]), Some(order[2])];
    for k in 3..order.len() {
        let edges: Vec<(usize, usize)> = adjacency
            .iter()
            .enumerate()
            .flat_map(|(u, ns)| ns.iter().filter(move |&&v| u < v).map(move |&v| (u, v)))
            .collect();
        let (u, v) = edges[picks[k] % edges.len()];
        let w = adjacency.len();
        let leaf = w + 1;
        for (x, y) in [(u, v), (v, u)] {
            if let Some(slot) = adjacency[x].iter_mut().find(|n| **n == y) {
                *slot = w;
            }
        }
        adjacency.push(vec![u, v, leaf]);
        adjacency.push(vec![w]);
        labels.push(None);
        labels.push(Some(order[k]));
    }
    let specs = adjacency
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(id, (neighbors, label))| NodeSpec::new(id, neighbors, label))
        .collect();
    Forest::new(specs, order.len()).unwrap()
}

fn random_tree(n: usize) -> impl Strategy<Value = Forest> {
    (Just((0..n).collect::<Vec<Label>>()).prop_shuffle(), vec(any::<usize>(), n))
        .prop_map(|(order, picks)| build_tree(&order, &picks))
}

fn tree_pair(max_leaves: usize) -> impl Strategy<Value = (Forest, Forest)> {
    (4..=max_leaves).prop_flat_map(|n| (random_tree(n), random_tree(n)))
}

/// Whether `blocks` is an agreement forest of both trees.
fn agrees(t1: &Forest, t2: &Forest, blocks: &[Vec<Label>]) -> bool {
    match (t1.restrict_to(blocks), t2.restrict_to(blocks)) {
        (Ok(r1), Ok(r2)) => r1 == r2,
        _ => false,
    }
}

/// Label blocks left after deleting the edges of `t2` selected by `mask`.
fn blocks_after_cuts(t2: &Forest, edges: &[(usize, usize)], mask: usize) -> Vec<Vec<Label>> {
    let size = t2.node_ids().max().map_or(0, |m| m + 1);
    let mut parent: Vec<usize> = (0..size).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    for (k, &(u, v)) in edges.iter().enumerate() {
        if mask & (1 << k) == 0 {
            let (ru, rv) = (find(&mut parent, u), find(&mut parent, v));
            parent[ru] = rv;
        }
    }
    t2.labels()
        .into_iter()
        .filter_map(|l| t2.node_of(l).map(|u| (find(&mut parent, u), l)))
        .into_group_map()
        .into_values()
        .map(|mut block| {
            block.sort_unstable();
            block
        })
        .sorted()
        .collect()
}

/// Every maximum agreement forest, found by trying every set of cut edges.
fn brute_force_mafs(t1: &Forest, t2: &Forest) -> (usize, HashSet<Vec<Vec<Label>>>) {
    let t2 = t2.normalized();
    let edges = t2.edges();
    let mut best = usize::MAX;
    let mut found = HashSet::new();
    for mask in 0..(1usize << edges.len()) {
        let blocks = blocks_after_cuts(&t2, &edges, mask);
        let cost = blocks.len() - 1;
        if cost > best || !agrees(t1, &t2, &blocks) {
            continue;
        }
        if cost < best {
            best = cost;
            found.clear();
        }
        found.insert(blocks);
    }
    (best, found)
}

/// Fewest leaves whose removal leaves the two trees equal.
fn brute_force_replug(t1: &Forest, t2: &Forest) -> usize {
    let labels = t1.labels();
    for k in 0..labels.len() {
        for removed in labels.iter().copied().combinations(k) {
            let kept: Vec<Label> = labels.iter().copied().filter(|l| !removed.contains(l)).collect();
            if agrees(t1, t2, &[kept]) {
                return k;
            }
        }
    }
    labels.len()
}

/// Breadth-first search over single uSPR moves.
fn brute_force_uspr(t1: &Forest, t2: &Forest) -> usize {
    let target = t2.normalized();
    let start = t1.normalized();
    let mut seen = HashSet::from([start.clone()]);
    let mut queue = VecDeque::from([(start, 0)]);
    while let Some((tree, d)) = queue.pop_front() {
        if tree == target {
            return d;
        }
        for next in spr_neighbors(&tree) {
            if seen.insert(next.clone()) {
                queue.push_back((next, d + 1));
            }
        }
    }
    usize::MAX
}

fn tbr(t1: &Forest, t2: &Forest, opts: Optimizations) -> usize {
    let config = DistanceConfig::default().with_optimizations(opts);
    tbr_distance(t1, t2, &config).unwrap().distance
}

fn replug(t1: &Forest, t2: &Forest, opts: Optimizations) -> usize {
    let config = DistanceConfig::default().with_optimizations(opts);
    replug_distance(t1, t2, &config).unwrap().distance
}

fn single_switches_off() -> Vec<Optimizations> {
    let all = Optimizations::default();
    vec![
        Optimizations { protect_a: false, ..all },
        Optimizations { protect_b: false, ..all },
        Optimizations { two_b: false, ..all },
        Optimizations { branch_and_bound: false, ..all },
        Optimizations { approx_estimate: false, replug_estimate: false, ..all },
        Optimizations::none(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn normalization_is_idempotent(tree in (4usize..=8).prop_flat_map(random_tree)) {
        let once = tree.normalized();
        prop_assert!(once.is_normalized());
        prop_assert_eq!(once.normalized(), once.clone());
        prop_assert_eq!(tree.to_newick(rust_python_uspr::LabelStyle::Indices), once.to_newick(rust_python_uspr::LabelStyle::Indices));
    }

    #[test]
    fn identical_trees_have_distance_zero(tree in (4usize..=8).prop_flat_map(random_tree)) {
        let config = DistanceConfig::default().with_witness();
        let result = tbr_distance(&tree, &tree, &config).unwrap();
        prop_assert_eq!(result.distance, 0);
        prop_assert_eq!(result.witness.unwrap().component_count(), 1);
        prop_assert_eq!(uspr_distance(&tree, &tree, &config).unwrap().distance, 0);
        prop_assert_eq!(replug_distance(&tree, &tree, &config).unwrap().distance, 0);
    }

    #[test]
    fn tbr_matches_brute_force((t1, t2) in tree_pair(7)) {
        let (expected, mafs) = brute_force_mafs(&t1, &t2);
        let config = DistanceConfig::default().with_witness();
        let result = tbr_distance(&t1, &t2, &config).unwrap();
        prop_assert!(result.is_optimal());
        prop_assert_eq!(result.distance, expected);
        let witness = result.witness.unwrap();
        prop_assert_eq!(witness.component_count() - 1, result.distance);
        prop_assert_eq!(&witness.forest1, &witness.forest2);
        prop_assert!(mafs.contains(&witness.blocks));
    }

    #[test]
    fn enumeration_yields_every_maf_once((t1, t2) in tree_pair(6)) {
        let (_, expected) = brute_force_mafs(&t1, &t2);
        let config = DistanceConfig::default().with_optimizations(Optimizations::none());
        let forests = agreement_forests(&t1, &t2, &config).unwrap();
        let blocks: Vec<_> = forests.iter().map(|w| w.unwrap().blocks).collect();
        let unique: HashSet<_> = blocks.iter().cloned().collect();
        prop_assert_eq!(unique.len(), blocks.len());
        prop_assert_eq!(unique, expected);
        let fast = count_agreement_forests(&t1, &t2, &DistanceConfig::default()).unwrap();
        prop_assert_eq!(fast, blocks.len());
    }

    #[test]
    fn bounds_sandwich_tbr((t1, t2) in tree_pair(8)) {
        let d = tbr(&t1, &t2, Optimizations::default());
        prop_assert!(lower_bound(&t1, &t2).unwrap() <= d);
        prop_assert!(upper_bound(&t1, &t2).unwrap() >= d);
    }

    #[test]
    fn distances_are_symmetric((t1, t2) in tree_pair(7)) {
        let config = DistanceConfig::default();
        prop_assert_eq!(tbr(&t1, &t2, Optimizations::default()), tbr(&t2, &t1, Optimizations::default()));
        prop_assert_eq!(replug(&t1, &t2, Optimizations::default()), replug(&t2, &t1, Optimizations::default()));
        prop_assert_eq!(
            uspr_distance(&t1, &t2, &config).unwrap().distance,
            uspr_distance(&t2, &t1, &config).unwrap().distance
        );
    }

    #[test]
    fn move_sets_are_monotone((t1, t2) in tree_pair(7)) {
        let config = DistanceConfig::default();
        let tbr = tbr(&t1, &t2, Optimizations::default());
        let spr = uspr_distance(&t1, &t2, &config).unwrap().distance;
        let replug = replug(&t1, &t2, Optimizations::default());
        prop_assert!(tbr <= spr);
        prop_assert!(spr <= replug);
    }

    #[test]
    fn replug_matches_brute_force((t1, t2) in tree_pair(7)) {
        let config = DistanceConfig::default().with_witness();
        let result = replug_distance(&t1, &t2, &config).unwrap();
        prop_assert_eq!(result.distance, brute_force_replug(&t1, &t2));
        let witness = result.witness.unwrap();
        prop_assert_eq!(witness.component_count() - 1, result.distance);
        prop_assert!(witness.blocks.iter().filter(|b| b.len() > 1).count() <= 1);
    }

    #[test]
    fn uspr_matches_breadth_first_search((t1, t2) in tree_pair(6)) {
        let expected = brute_force_uspr(&t1, &t2);
        let config = DistanceConfig::default();
        prop_assert_eq!(uspr_distance(&t1, &t2, &config).unwrap().distance, expected);
        let mut slow = Optimizations::none();
        slow.tbr_estimate = false;
        let config = config.with_optimizations(slow);
        prop_assert_eq!(uspr_distance(&t1, &t2, &config).unwrap().distance, expected);
    }

    #[test]
    fn switches_never_change_results((t1, t2) in tree_pair(7)) {
        let tbr_all = tbr(&t1, &t2, Optimizations::default());
        let replug_all = replug(&t1, &t2, Optimizations::default());
        for opts in single_switches_off() {
            prop_assert_eq!(tbr(&t1, &t2, opts), tbr_all);
            prop_assert_eq!(replug(&t1, &t2, opts), replug_all);
        }
    }
}
