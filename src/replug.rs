//! Replug distance: the exact search restricted to leaf moves.
//!
//! A replug move prunes a single leaf and plugs it back in elsewhere, with no
//! bisection of the rest of the tree. The fewest such moves equals the number
//! of taxa outside a maximum agreement subtree, so the matching agreement
//! forests consist of one main component plus singleton leaves, and the only
//! edit the search may make is to discard a leaf (a contracted cherry counts
//! once per taxon it stands for).
//!
//! For a `T1` cherry `(a, c)` that is not a cherry of `F2` the branches are
//!
//! ```text
//!   discard a | discard c | keep Bj, discard every leaf of the other Bi
//! ```
//!
//! Every keep-branch keeps both `a` and `c` by definition, so the contracted
//! cherry is protected there: discarding it later would also discard `a`,
//! which the first branch already covers.

use crate::config::Optimizations;
use crate::forest::Label;
use crate::search::{Relation, SearchState};

pub(crate) fn children(
    state: &SearchState,
    a: Label,
    c: Label,
    relation: Relation,
    opts: &Optimizations,
) -> Vec<SearchState> {
    let mut children = Vec::new();
    if !state.is_protected(a) {
        let mut child = state.clone();
        child.discard(a);
        children.push(child);
    }
    if !state.is_protected(c) {
        let mut child = state.clone();
        child.discard(c);
        if opts.protect_a {
            child.protect(a);
        }
        children.push(child);
    }

    let Relation::Path(pendants) = relation else {
        return children;
    };
    let subtrees: Vec<Vec<Label>> = pendants
        .iter()
        .map(|p| state.f2.leaves_beyond(p.root, p.attach))
        .collect();

    for keep in 0..pendants.len() {
        let doomed: Vec<Label> = subtrees
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != keep)
            .flat_map(|(_, leaves)| leaves.iter().copied())
            .collect();
        if doomed.iter().any(|&l| state.is_protected(l)) {
            continue;
        }
        let mut child = state.clone();
        for label in doomed {
            child.discard(label);
        }
        child.tidy();
        let merged = child.contract(a, c);
        if opts.protect_b {
            child.protect(merged);
        }
        children.push(child);
    }
    children
}
