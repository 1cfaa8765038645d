//! Batch evaluation over many tree pairs.
//!
//! Pairs are independent, so every batch runs them in parallel with rayon;
//! each pair gets its own label map and forests. Parsed phylotree trees keep
//! interior caches and cannot cross threads, so they are turned into owned
//! forests first and only the forests go to the pool; a matrix shares one
//! label map and converts each tree once. A malformed pair fails
//! only its own slot, while mismatched input lengths fail the whole batch.

use log::warn;
use phylotree::tree::Tree;
use rayon::prelude::*;

use crate::config::DistanceConfig;
use crate::distances::{self, DistanceResult};
use crate::errors::DistanceError;
use crate::forest::{Forest, LabelStyle};
use crate::io::{forests_from_newick, forests_from_trees, forests_over_shared_taxa};
use crate::labels::LabelMap;
use crate::search::SearchStatus;

/// Distance computed for every pair of a matrix or paired run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    Tbr,
    TbrLower,
    TbrUpper,
    Uspr,
    Replug,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Tbr => "TBR",
            Metric::TbrLower => "TBR lower bound",
            Metric::TbrUpper => "TBR upper bound",
            Metric::Uspr => "uSPR",
            Metric::Replug => "Replug",
        }
    }
}

/// One metric on one forest pair.
pub fn evaluate(metric: Metric, f1: &Forest, f2: &Forest, config: &DistanceConfig) -> Result<usize, DistanceError> {
    let exact = |result: DistanceResult| {
        if let SearchStatus::Bounded { lower } = result.status {
            warn!("{} search stopped at the node limit: {lower} <= d <= {}", metric.label(), result.distance);
        }
        result.distance
    };
    match metric {
        Metric::Tbr => distances::tbr_distance(f1, f2, config).map(exact),
        Metric::TbrLower => distances::lower_bound(f1, f2),
        Metric::TbrUpper => distances::upper_bound(f1, f2),
        Metric::Uspr => distances::uspr_distance(f1, f2, config).map(exact),
        Metric::Replug => distances::replug_distance(f1, f2, config).map(exact),
    }
}

/// All-vs-all symmetric matrix of `metric` over `trees`.
///
/// # Errors
/// The first pair that fails aborts the matrix.
pub fn pairwise(trees: &[Tree], metric: Metric, config: &DistanceConfig) -> Result<Vec<Vec<usize>>, DistanceError> {
    let (_, forests) = forests_over_shared_taxa(trees)?;
    let n = forests.len();
    let pairs: Vec<(usize, usize, usize)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| Ok::<_, DistanceError>((i, j, evaluate(metric, &forests[i], &forests[j], config)?)))
        .collect::<Result<_, DistanceError>>()?;

    let mut matrix = vec![vec![0usize; n]; n];
    for (i, j, d) in pairs {
        matrix[i][j] = d;
        matrix[j][i] = d;
    }
    Ok(matrix)
}

fn check_lengths<A, B>(first: &[A], second: &[B]) -> Result<(), DistanceError> {
    if first.len() != second.len() {
        return Err(DistanceError::BatchLengthMismatch { first: first.len(), second: second.len() });
    }
    Ok(())
}

/// `metric` between `first[i]` and `second[i]` for every `i`.
pub fn paired(
    first: &[Tree],
    second: &[Tree],
    metric: Metric,
    config: &DistanceConfig,
) -> Result<Vec<Result<usize, DistanceError>>, DistanceError> {
    check_lengths(first, second)?;
    let jobs: Vec<Result<(Forest, Forest), DistanceError>> = first
        .iter()
        .zip(second)
        .map(|(a, b)| forests_from_trees(a, b).map(|(_, f1, f2)| (f1, f2)))
        .collect();
    Ok(jobs
        .into_par_iter()
        .enumerate()
        .map(|(i, job)| {
            let (f1, f2) = job?;
            evaluate(metric, &f1, &f2, config).inspect_err(|e| warn!("{} pair {i} failed: {e}", metric.label()))
        })
        .collect())
}

fn style(labels: &LabelMap, keep_labels: bool) -> LabelStyle<'_> {
    if keep_labels {
        LabelStyle::Names(labels)
    } else {
        LabelStyle::Indices
    }
}

/// What [`tbr_batch`] computes for each pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TbrRequest {
    /// Exact distance, with the witnessing agreement forest rendered.
    pub exact: bool,
    /// Lower and upper bounds.
    pub approx: bool,
    /// Render every maximum agreement forest.
    pub print_mafs: bool,
    /// Count maximum agreement forests; implied by `print_mafs`.
    pub count_mafs: bool,
    /// Taxon names instead of label indices in rendered forests.
    pub keep_labels: bool,
    pub config: DistanceConfig,
}

impl Default for TbrRequest {
    fn default() -> Self {
        Self {
            exact: true,
            approx: false,
            print_mafs: false,
            count_mafs: false,
            keep_labels: false,
            config: DistanceConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TbrReport {
    pub exact: Option<usize>,
    pub status: Option<SearchStatus>,
    pub lower: Option<usize>,
    pub upper: Option<usize>,
    /// Witness restricted to the first and the second tree.
    pub maf1: Option<String>,
    pub maf2: Option<String>,
    pub maf_count: Option<usize>,
    pub mafs: Vec<String>,
}

fn tbr_report(text1: &str, text2: &str, request: &TbrRequest) -> Result<TbrReport, DistanceError> {
    let (labels, f1, f2) = forests_from_newick(text1, text2)?;
    let style = style(&labels, request.keep_labels);
    let mut report = TbrReport::default();

    if request.approx {
        report.lower = Some(distances::lower_bound(&f1, &f2)?);
        report.upper = Some(distances::upper_bound(&f1, &f2)?);
    }
    if request.exact {
        let result = distances::tbr_distance(&f1, &f2, &request.config.with_witness())?;
        report.exact = Some(result.distance);
        report.status = Some(result.status);
        if let Some(witness) = result.witness {
            report.maf1 = Some(witness.forest1.to_newick(style));
            report.maf2 = Some(witness.forest2.to_newick(style));
        }
    }
    if request.print_mafs || request.count_mafs {
        let forests = distances::agreement_forests(&f1, &f2, &request.config)?;
        if request.print_mafs {
            report.mafs = forests
                .iter()
                .map(|witness| Ok::<_, DistanceError>(witness?.to_newick(style)))
                .collect::<Result<_, DistanceError>>()?;
            report.maf_count = Some(report.mafs.len());
        } else {
            report.maf_count = Some(forests.count());
        }
    }
    Ok(report)
}

/// TBR distance and friends for `tree1[i]` against `tree2[i]`.
///
/// # Errors
/// [`DistanceError::BatchLengthMismatch`] for the whole batch; everything
/// else is reported in the failing pair's slot.
pub fn tbr_batch<S: AsRef<str> + Sync>(
    tree1: &[S],
    tree2: &[S],
    request: &TbrRequest,
) -> Result<Vec<Result<TbrReport, DistanceError>>, DistanceError> {
    check_lengths(tree1, tree2)?;
    Ok(tree1
        .par_iter()
        .zip(tree2.par_iter())
        .enumerate()
        .map(|(i, (a, b))| {
            tbr_report(a.as_ref(), b.as_ref(), request)
                .inspect_err(|e| warn!("TBR pair {i} failed: {e}"))
        })
        .collect())
}

/// uSPR distance for `tree1[i]` against `tree2[i]`.
pub fn uspr_batch<S: AsRef<str> + Sync>(
    tree1: &[S],
    tree2: &[S],
    config: &DistanceConfig,
) -> Result<Vec<Result<DistanceResult, DistanceError>>, DistanceError> {
    check_lengths(tree1, tree2)?;
    Ok(tree1
        .par_iter()
        .zip(tree2.par_iter())
        .enumerate()
        .map(|(i, (a, b))| {
            let (_, f1, f2) = forests_from_newick(a.as_ref(), b.as_ref())?;
            distances::uspr_distance(&f1, &f2, config).inspect_err(|e| warn!("uSPR pair {i} failed: {e}"))
        })
        .collect())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplugReport {
    pub distance: usize,
    pub status: SearchStatus,
    pub maf1: Option<String>,
    pub maf2: Option<String>,
}

/// Replug distance for `tree1[i]` against `tree2[i]`, with the agreement
/// forest rendered when `config.want_witness` is set.
pub fn replug_batch<S: AsRef<str> + Sync>(
    tree1: &[S],
    tree2: &[S],
    keep_labels: bool,
    config: &DistanceConfig,
) -> Result<Vec<Result<ReplugReport, DistanceError>>, DistanceError> {
    check_lengths(tree1, tree2)?;
    Ok(tree1
        .par_iter()
        .zip(tree2.par_iter())
        .enumerate()
        .map(|(i, (a, b))| {
            let (labels, f1, f2) = forests_from_newick(a.as_ref(), b.as_ref())?;
            let style = style(&labels, keep_labels);
            let result = distances::replug_distance(&f1, &f2, config)
                .inspect_err(|e| warn!("Replug pair {i} failed: {e}"))?;
            let (maf1, maf2) = match &result.witness {
                Some(w) => (Some(w.forest1.to_newick(style)), Some(w.forest2.to_newick(style))),
                None => (None, None),
            };
            Ok::<_, DistanceError>(ReplugReport { distance: result.distance, status: result.status, maf1, maf2 })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_newick;

    const TREES: [&str; 3] = [
        "((A,B),(C,D),(E,F));",
        "(B,(C,D),(E,(F,A)));",
        "((A,C),(B,D),(E,F));",
    ];

    #[test]
    fn test_length_mismatch() {
        let result = tbr_batch(&TREES[..2], &TREES[..1], &TbrRequest::default());
        assert!(matches!(result, Err(DistanceError::BatchLengthMismatch { first: 2, second: 1 })));
        assert!(uspr_batch(&TREES[..1], &TREES[..3], &DistanceConfig::default()).is_err());
    }

    #[test]
    fn test_tbr_batch_reports() {
        let request = TbrRequest { approx: true, count_mafs: true, keep_labels: true, ..TbrRequest::default() };
        let reports = tbr_batch(&TREES[..2], &TREES[1..], &request).unwrap();
        let first = reports[0].as_ref().unwrap();
        assert_eq!(first.exact, Some(1));
        assert_eq!(first.status, Some(SearchStatus::Optimal));
        assert!(first.lower.unwrap() <= 1 && first.upper.unwrap() >= 1);
        assert_eq!(first.maf1, first.maf2);
        assert!(first.maf1.as_ref().unwrap().contains('A'));
        assert!(first.maf_count.unwrap() >= 1);
    }

    #[test]
    fn test_bad_pair_fails_alone() {
        let first = ["((A,B),(C,D));", "((A,B),(C,D));"];
        let second = ["((A,C),(B,D));", "((A,B),(C,E));"];
        let results = uspr_batch(&first, &second, &DistanceConfig::default()).unwrap();
        assert_eq!(results[0].as_ref().unwrap().distance, 1);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_replug_batch_renders_witness() {
        let config = DistanceConfig::default().with_witness();
        let reports = replug_batch(&TREES[..1], &TREES[1..2], false, &config).unwrap();
        let report = reports[0].as_ref().unwrap();
        assert_eq!(report.distance, 1);
        assert_eq!(report.maf1, report.maf2);
    }

    #[test]
    fn test_pairwise_matrix_is_symmetric() {
        let trees: Vec<Tree> = TREES.iter().map(|t| parse_newick(t).unwrap()).collect();
        let matrix = pairwise(&trees, Metric::Tbr, &DistanceConfig::default()).unwrap();
        for i in 0..trees.len() {
            assert_eq!(matrix[i][i], 0);
            for j in 0..trees.len() {
                assert_eq!(matrix[i][j], matrix[j][i]);
            }
        }
        assert_eq!(matrix[0][1], 1);

        let mut mixed = trees;
        mixed.push(parse_newick("((A,B),(C,D),(E,G));").unwrap());
        let result = pairwise(&mixed, Metric::Tbr, &DistanceConfig::default());
        assert!(matches!(result, Err(DistanceError::TaxaMismatch { .. })));
        assert!(pairwise(&[], Metric::Uspr, &DistanceConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_paired_trees_keep_order_and_isolate_failures() {
        let parse = |texts: &[&str]| texts.iter().map(|t| parse_newick(t).unwrap()).collect::<Vec<Tree>>();
        let first = parse(&["((A,B),(C,D),(E,F));", "((A,B),(C,D));", "((A,B),(C,D),(E,F));"]);
        let second = parse(&["(B,(C,D),(E,(F,A)));", "((A,B),(C,E));", "((A,B),(C,D),(E,F));"]);
        let results = paired(&first, &second, Metric::Uspr, &DistanceConfig::default()).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(matches!(results[1], Err(DistanceError::TaxaMismatch { .. })));
        assert_eq!(*results[2].as_ref().unwrap(), 0);
        assert!(paired(&first[..1], &second, Metric::Tbr, &DistanceConfig::default()).is_err());
    }
}
