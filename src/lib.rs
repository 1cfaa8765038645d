//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `forest`, `normalize`: the labeled forest model and its canonical form.
//! - `labels`: interning of taxon names into dense labels.
//! - `snapshot`, `bitset`: split snapshots for identical-topology checks.
//! - `search`, `bounds`, `replug`, `uspr`: agreement forest search engine.
//! - `distances`: the public distance operations.
//! - `io`, `batch`: tree files, TSV output and parallel batches.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod config;
pub mod errors;
pub mod forest;
pub mod labels;
pub mod normalize;
pub mod snapshot;

mod bounds;
mod replug;
pub mod search;
pub mod uspr;

pub mod batch;
pub mod distances;
pub mod io;

#[cfg(feature = "python")]
pub mod api;

pub use config::{DistanceConfig, Optimizations};
pub use distances::{
    agreement_forests, count_agreement_forests, lower_bound, replug_distance, tbr_distance,
    upper_bound, uspr_distance, AgreementForests, DistanceResult, Witness,
};
pub use errors::{DistanceError, ForestError};
pub use forest::{Forest, Label, LabelStyle, NodeSpec};
pub use io::{forests_from_newick, read_trees, write_matrix_tsv};
pub use labels::LabelMap;
pub use search::{MoveSet, SearchStatus};
pub use snapshot::ForestSnapshot;
pub use uspr::spr_neighbors;
