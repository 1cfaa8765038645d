//! Distance operations on pairs of labeled forests.
//!
//! Every operation normalizes private copies of its inputs, checks that both
//! carry the same labels and are binary, and only then searches:
//!
//! - [`lower_bound`] / [`upper_bound`]: polynomial-time estimates of the TBR
//!   distance, `lower <= tbr <= upper`.
//! - [`tbr_distance`]: exact TBR distance, `|MAF| - 1`, with an optional
//!   witnessing agreement forest.
//! - [`replug_distance`]: fewest single-leaf moves, optionally with witness.
//! - [`uspr_distance`]: unrooted SPR distance.
//! - [`agreement_forests`] / [`count_agreement_forests`]: every maximum
//!   agreement forest, lazily.
//!
//! Inputs with identical topology are answered from their split snapshots
//! without searching.

use crate::config::DistanceConfig;
use crate::errors::DistanceError;
use crate::forest::{Forest, Label, LabelStyle};
use crate::search::{self, MoveSet, PartitionIter, SearchState, SearchStatus, Solution};
use crate::snapshot::ForestSnapshot;
use crate::{bounds, uspr};

/// Agreement forest realised in both inputs.
///
/// `forest1` and `forest2` are the restrictions of the two inputs to
/// `blocks`; being an agreement forest, they are equal once normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    /// Label set of each component, sorted, ordered by smallest label.
    pub blocks: Vec<Vec<Label>>,
    pub forest1: Forest,
    pub forest2: Forest,
}

impl Witness {
    fn from_blocks(f1: &Forest, f2: &Forest, blocks: Vec<Vec<Label>>) -> Result<Self, DistanceError> {
        let forest1 = f1.restrict_to(&blocks)?;
        let forest2 = f2.restrict_to(&blocks)?;
        Ok(Witness { blocks, forest1, forest2 })
    }

    pub fn component_count(&self) -> usize {
        self.blocks.len()
    }

    /// Canonical text of the agreement forest.
    pub fn to_newick(&self, style: LabelStyle<'_>) -> String {
        self.forest1.to_newick(style)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistanceResult {
    pub distance: usize,
    pub status: SearchStatus,
    /// Present when requested and the operation produces one.
    pub witness: Option<Witness>,
}

impl DistanceResult {
    pub fn is_optimal(&self) -> bool {
        self.status == SearchStatus::Optimal
    }
}

/// Normalized, label-matched, binary copies of the inputs.
fn prepare(f1: &Forest, f2: &Forest) -> Result<(Forest, Forest), DistanceError> {
    let first = f1.labels();
    let second = f2.labels();
    if first != second {
        let only_first = first.iter().copied().filter(|l| second.binary_search(l).is_err()).collect();
        let only_second = second.iter().copied().filter(|l| first.binary_search(l).is_err()).collect();
        return Err(DistanceError::LabelMismatch { only_first, only_second });
    }

    let n1 = f1.normalized();
    let n2 = f2.normalized();
    for forest in [&n1, &n2] {
        if let Some((node, degree)) = forest.first_non_binary() {
            return Err(DistanceError::NotBinary { node, degree });
        }
    }
    Ok((n1, n2))
}

fn require_tree(forest: &Forest) -> Result<(), DistanceError> {
    match forest.component_count() {
        0 | 1 => Ok(()),
        components => Err(DistanceError::NotATree { components }),
    }
}

/// The components themselves, when both forests have the same topology.
fn identical(f1: &Forest, f2: &Forest) -> Option<Solution> {
    if !ForestSnapshot::from_forest(f1).same_topology(&ForestSnapshot::from_forest(f2)) {
        return None;
    }
    let blocks: Vec<Vec<Label>> = f1.components().into_iter().map(|c| c.labels).collect();
    Some(Solution { cost: blocks.len().saturating_sub(1), blocks })
}

fn finish(
    f1: &Forest,
    f2: &Forest,
    (best, status): (Solution, SearchStatus),
    config: &DistanceConfig,
) -> Result<DistanceResult, DistanceError> {
    let witness = if config.want_witness {
        Some(Witness::from_blocks(f1, f2, best.blocks)?)
    } else {
        None
    };
    Ok(DistanceResult { distance: best.cost, status, witness })
}

/// Proven lower bound on the TBR distance.
///
/// # Errors
/// [`DistanceError::LabelMismatch`] or [`DistanceError::NotBinary`].
pub fn lower_bound(f1: &Forest, f2: &Forest) -> Result<usize, DistanceError> {
    let (f1, f2) = prepare(f1, f2)?;
    Ok(bounds::estimate(&SearchState::new(&f1, &f2), MoveSet::Tbr).lower)
}

/// Size minus one of a feasible agreement forest.
///
/// # Errors
/// [`DistanceError::LabelMismatch`] or [`DistanceError::NotBinary`].
pub fn upper_bound(f1: &Forest, f2: &Forest) -> Result<usize, DistanceError> {
    let (f1, f2) = prepare(f1, f2)?;
    Ok(bounds::estimate(&SearchState::new(&f1, &f2), MoveSet::Tbr).upper.cost)
}

/// Exact TBR distance.
///
/// With a node limit the result may be [`SearchStatus::Bounded`]; the
/// distance is then the best upper bound found.
///
/// # Errors
/// [`DistanceError::LabelMismatch`] or [`DistanceError::NotBinary`].
pub fn tbr_distance(f1: &Forest, f2: &Forest, config: &DistanceConfig) -> Result<DistanceResult, DistanceError> {
    let (f1, f2) = prepare(f1, f2)?;
    let found = match identical(&f1, &f2) {
        Some(same) => (same, SearchStatus::Optimal),
        None => search::minimum(&f1, &f2, MoveSet::Tbr, config),
    };
    finish(&f1, &f2, found, config)
}

/// Fewest single-leaf prune-and-regraft moves turning one tree into the other.
///
/// # Errors
/// As [`tbr_distance`], plus [`DistanceError::NotATree`].
pub fn replug_distance(f1: &Forest, f2: &Forest, config: &DistanceConfig) -> Result<DistanceResult, DistanceError> {
    let (f1, f2) = prepare(f1, f2)?;
    require_tree(&f1)?;
    require_tree(&f2)?;
    let found = match identical(&f1, &f2) {
        Some(same) => (same, SearchStatus::Optimal),
        None => search::minimum(&f1, &f2, MoveSet::Replug, config),
    };
    finish(&f1, &f2, found, config)
}

/// Unrooted SPR distance. Never carries a witness.
///
/// # Errors
/// As [`replug_distance`].
pub fn uspr_distance(f1: &Forest, f2: &Forest, config: &DistanceConfig) -> Result<DistanceResult, DistanceError> {
    let (f1, f2) = prepare(f1, f2)?;
    require_tree(&f1)?;
    require_tree(&f2)?;
    if identical(&f1, &f2).is_some() {
        return Ok(DistanceResult { distance: 0, status: SearchStatus::Optimal, witness: None });
    }
    let (distance, status) = uspr::distance(&f1, &f2, config);
    Ok(DistanceResult { distance, status, witness: None })
}

/// Every maximum agreement forest of a pair, each reported once.
///
/// The handle owns normalized copies of the inputs; [`AgreementForests::iter`]
/// restarts the enumeration on every call.
#[derive(Clone, Debug)]
pub struct AgreementForests {
    f1: Forest,
    f2: Forest,
    distance: usize,
    config: DistanceConfig,
}

impl AgreementForests {
    pub fn distance(&self) -> usize {
        self.distance
    }

    fn partitions(&self) -> PartitionIter {
        let root = SearchState::new(&self.f1, &self.f2);
        PartitionIter::new(root, MoveSet::Tbr, self.config.optimizations, self.distance)
    }

    /// Lazily yields each agreement forest as a [`Witness`].
    pub fn iter(&self) -> impl Iterator<Item = Result<Witness, DistanceError>> + '_ {
        self.partitions()
            .map(|blocks| Witness::from_blocks(&self.f1, &self.f2, blocks))
    }

    /// Number of distinct maximum agreement forests.
    pub fn count(&self) -> usize {
        self.partitions().count()
    }
}

/// Enumeration handle over all maximum agreement forests. The node limit of
/// `config` is ignored: enumeration needs the proven optimum.
///
/// # Errors
/// [`DistanceError::LabelMismatch`] or [`DistanceError::NotBinary`].
pub fn agreement_forests(f1: &Forest, f2: &Forest, config: &DistanceConfig) -> Result<AgreementForests, DistanceError> {
    let (f1, f2) = prepare(f1, f2)?;
    let config = DistanceConfig { node_limit: None, want_witness: false, ..*config };
    let (best, _) = search::minimum(&f1, &f2, MoveSet::Tbr, &config);
    Ok(AgreementForests { f1, f2, distance: best.cost, config })
}

/// # Errors
/// As [`agreement_forests`].
pub fn count_agreement_forests(f1: &Forest, f2: &Forest, config: &DistanceConfig) -> Result<usize, DistanceError> {
    Ok(agreement_forests(f1, f2, config)?.count())
}
