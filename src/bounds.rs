//! Polynomial-time bounds on the TBR (and replug) distance.
//!
//! Both estimators walk the same cherry sequence as the exact search but never
//! branch.
//!
//! - The lower bound resolves each conflict by applying *every* candidate edit
//!   at once (cut `a`, `c` and the first two pendant subtrees). Any agreement
//!   forest avoids at least one of those pieces, so each conflict costs the
//!   optimum at least one, and the number of conflicts met is a valid lower
//!   bound.
//! - The upper bound is the cheaper of two feasible agreement forests: the
//!   one left over by the lower-bound pass, and a greedy pass that cuts a
//!   single leaf per conflict.

use crate::search::{MoveSet, Relation, SearchState, Solution};

pub(crate) struct Approximation {
    /// Conflicts met; a lower bound on the cost still needed.
    pub(crate) conflicts: usize,
    pub(crate) solution: Solution,
}

pub(crate) struct Estimate {
    pub(crate) lower: usize,
    pub(crate) upper: Solution,
}

pub(crate) fn approximate(state: &SearchState, moves: MoveSet) -> Approximation {
    let mut state = state.clone();
    let mut conflicts = 0;
    loop {
        state.tidy();
        let Some((a, c)) = state.next_cherry() else {
            break;
        };
        let relation = state.relation(a, c);
        if relation == Relation::Siblings {
            state.contract(a, c);
            continue;
        }
        conflicts += 1;
        match moves {
            MoveSet::Tbr => {
                if let Relation::Path(pendants) = &relation {
                    for &pendant in pendants.iter().take(2) {
                        state.cut_pendant(pendant);
                    }
                }
                state.detach(a);
                state.detach(c);
            }
            MoveSet::Replug => {
                let mut doomed = vec![a, c];
                if let Relation::Path(pendants) = &relation {
                    for pendant in pendants.iter().take(2) {
                        doomed.extend(state.f2.leaves_beyond(pendant.root, pendant.attach));
                    }
                }
                for label in doomed {
                    state.discard(label);
                }
            }
        }
    }
    Approximation { conflicts, solution: state.solution() }
}

/// One cut per conflict: the leaf `a` for TBR, the lighter of `a` and `c`
/// for replug.
pub(crate) fn greedy(state: &SearchState, moves: MoveSet) -> Solution {
    let mut state = state.clone();
    loop {
        state.tidy();
        let Some((a, c)) = state.next_cherry() else {
            break;
        };
        if state.relation(a, c) == Relation::Siblings {
            state.contract(a, c);
            continue;
        }
        match moves {
            MoveSet::Tbr => state.detach(a),
            MoveSet::Replug => {
                let lighter = if state.group_size(c) < state.group_size(a) { c } else { a };
                state.discard(lighter);
            }
        }
    }
    state.solution()
}

pub(crate) fn estimate(state: &SearchState, moves: MoveSet) -> Estimate {
    let approx = approximate(state, moves);
    let greedy = greedy(state, moves);
    let upper = if greedy.cost < approx.solution.cost { greedy } else { approx.solution };
    Estimate { lower: state.cost + approx.conflicts, upper }
}
