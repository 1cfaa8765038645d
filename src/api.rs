//! Python binding layer for the rearrangement distances.
//!
//! Every function takes two equally long lists of Newick strings and
//! compares them position by position. Any failing pair raises `ValueError`.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::batch::{self, TbrRequest};
use crate::config::{DistanceConfig, Optimizations};
use crate::errors::DistanceError;
use crate::forest::LabelStyle;
use crate::io::forests_from_newick;

fn to_py(e: DistanceError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// First error of a batch, or every value.
fn unpack<T>(results: Result<Vec<Result<T, DistanceError>>, DistanceError>) -> PyResult<Vec<T>> {
    results
        .map_err(to_py)?
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.map_err(|e| PyValueError::new_err(format!("Tree pair {i}: {e}"))))
        .collect()
}

fn optimizations(opt: bool, protect_b: bool) -> Optimizations {
    let mut optimizations = Optimizations::from_switch(opt);
    optimizations.protect_b &= protect_b;
    optimizations
}

/// Compute TBR distances between paired trees.
///
/// Args:
///     tree1, tree2: Lists of Newick strings of equal length
///     keep_labels: Write taxon names instead of label indices in agreement forests (default: False)
///     opt: Enable the search optimizations (default: True)
///     protect_b: Enable the protect-B rule, only with opt (default: True)
///     tbr_approx: Compute lower and upper bounds (default: False)
///     tbr: Compute the exact distance and one maximum agreement forest (default: True)
///     approx_estimate: Seed the exact search with the bounds (default: True)
///
/// Returns:
///     A tuple (exact, lower, upper, maf1, maf2) of lists; entries not computed are None.
///
/// Raises:
///     ValueError: If the lists differ in length or a pair cannot be compared
#[pyfunction]
#[pyo3(signature = (tree1, tree2, keep_labels=false, opt=true, protect_b=true, tbr_approx=false, tbr=true, approx_estimate=true))]
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
fn tbr_dist(
    tree1: Vec<String>,
    tree2: Vec<String>,
    keep_labels: bool,
    opt: bool,
    protect_b: bool,
    tbr_approx: bool,
    tbr: bool,
    approx_estimate: bool,
) -> PyResult<(
    Vec<Option<usize>>,
    Vec<Option<usize>>,
    Vec<Option<usize>>,
    Vec<Option<String>>,
    Vec<Option<String>>,
)> {
    let mut optimizations = optimizations(opt, protect_b);
    optimizations.approx_estimate = approx_estimate;
    let request = TbrRequest {
        exact: tbr,
        approx: tbr_approx,
        keep_labels,
        config: DistanceConfig::default().with_optimizations(optimizations),
        ..TbrRequest::default()
    };
    let reports = unpack(batch::tbr_batch(&tree1, &tree2, &request))?;

    let mut out = (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for report in reports {
        out.0.push(report.exact);
        out.1.push(report.lower);
        out.2.push(report.upper);
        out.3.push(report.maf1);
        out.4.push(report.maf2);
    }
    Ok(out)
}

/// Every maximum agreement forest of each tree pair, as canonical text.
///
/// The number of forests for a pair is the length of its list.
#[pyfunction]
#[pyo3(signature = (tree1, tree2, keep_labels=false, opt=true, protect_b=true))]
fn tbr_mafs(
    tree1: Vec<String>,
    tree2: Vec<String>,
    keep_labels: bool,
    opt: bool,
    protect_b: bool,
) -> PyResult<Vec<Vec<String>>> {
    let request = TbrRequest {
        exact: false,
        print_mafs: true,
        keep_labels,
        config: DistanceConfig::default().with_optimizations(optimizations(opt, protect_b)),
        ..TbrRequest::default()
    };
    let reports = unpack(batch::tbr_batch(&tree1, &tree2, &request))?;
    Ok(reports.into_iter().map(|r| r.mafs).collect())
}

/// Compute unrooted SPR distances between paired trees.
///
/// Args:
///     tree1, tree2: Lists of Newick strings of equal length
///     opt: Enable the search optimizations (default: True)
///     tbr_estimate: Start the search at the exact TBR distance (default: True)
///
/// Raises:
///     ValueError: If the lists differ in length or a pair cannot be compared
#[pyfunction]
#[pyo3(signature = (tree1, tree2, opt=true, tbr_estimate=true))]
fn uspr_dist(tree1: Vec<String>, tree2: Vec<String>, opt: bool, tbr_estimate: bool) -> PyResult<Vec<usize>> {
    let mut optimizations = Optimizations::from_switch(opt);
    optimizations.tbr_estimate = tbr_estimate;
    let config = DistanceConfig::default().with_optimizations(optimizations);
    let results = unpack(batch::uspr_batch(&tree1, &tree2, &config))?;
    Ok(results.into_iter().map(|r| r.distance).collect())
}

/// Compute replug distances between paired trees.
///
/// Returns:
///     A tuple (distance, maf1, maf2) of lists.
#[pyfunction]
#[pyo3(signature = (tree1, tree2, keep_labels=false, replug_estimate=true))]
#[allow(clippy::type_complexity)]
fn replug_dist(
    tree1: Vec<String>,
    tree2: Vec<String>,
    keep_labels: bool,
    replug_estimate: bool,
) -> PyResult<(Vec<usize>, Vec<Option<String>>, Vec<Option<String>>)> {
    let mut optimizations = Optimizations::default();
    optimizations.replug_estimate = replug_estimate;
    let config = DistanceConfig::default().with_optimizations(optimizations).with_witness();
    let reports = unpack(batch::replug_batch(&tree1, &tree2, keep_labels, &config))?;

    let mut out = (Vec::new(), Vec::new(), Vec::new());
    for report in reports {
        out.0.push(report.distance);
        out.1.push(report.maf1);
        out.2.push(report.maf2);
    }
    Ok(out)
}

/// Canonical text of one tree, for checking how input is read.
#[pyfunction]
#[pyo3(signature = (tree, keep_labels=true))]
fn canonical_newick(tree: String, keep_labels: bool) -> PyResult<String> {
    let (labels, forest, _) = forests_from_newick(&tree, &tree).map_err(to_py)?;
    let style = if keep_labels { LabelStyle::Names(&labels) } else { LabelStyle::Indices };
    Ok(forest.to_newick(style))
}

/// Python module definition
#[pymodule]
fn rust_python_uspr(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(tbr_dist, m)?)?;
    m.add_function(wrap_pyfunction!(tbr_mafs, m)?)?;
    m.add_function(wrap_pyfunction!(uspr_dist, m)?)?;
    m.add_function(wrap_pyfunction!(replug_dist, m)?)?;
    m.add_function(wrap_pyfunction!(canonical_newick, m)?)?;
    Ok(())
}
