//! Immutable configuration passed into every distance computation.

/// Independently switchable search optimizations.
///
/// `Default` enables everything. [`Optimizations::none`] turns off the four
/// pruning rules of the exact search and keeps the estimate switches, the
/// same split as the single "opt" switch of the batch interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Optimizations {
    /// In the branch that cuts `c`, forbid `a` from becoming a singleton.
    pub protect_a: bool,
    /// In all but the first "keep one pendant subtree" branch, forbid the
    /// contracted cherry from becoming a singleton.
    pub protect_b: bool,
    /// Drop a keep-branch that is equivalent to the cut-leaf branch when the
    /// cherry path has two pendant subtrees and one is a leaf beside the cherry.
    pub two_b: bool,
    /// Prune states whose cost plus lower bound cannot beat the incumbent.
    pub branch_and_bound: bool,
    /// Seed the TBR search with the estimators' agreement forest.
    pub approx_estimate: bool,
    /// Start the uSPR deepening at the exact TBR distance.
    pub tbr_estimate: bool,
    /// Seed the replug search with its estimator's agreement forest.
    pub replug_estimate: bool,
}

impl Default for Optimizations {
    fn default() -> Self {
        Self {
            protect_a: true,
            protect_b: true,
            two_b: true,
            branch_and_bound: true,
            approx_estimate: true,
            tbr_estimate: true,
            replug_estimate: true,
        }
    }
}

impl Optimizations {
    pub fn none() -> Self {
        Self {
            protect_a: false,
            protect_b: false,
            two_b: false,
            branch_and_bound: false,
            ..Self::default()
        }
    }

    /// `Default` when `enabled`, otherwise [`Optimizations::none`].
    pub fn from_switch(enabled: bool) -> Self {
        if enabled { Self::default() } else { Self::none() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DistanceConfig {
    pub optimizations: Optimizations,
    /// Materialize the witnessing agreement forests.
    pub want_witness: bool,
    /// Maximum number of search states to expand before returning the best
    /// bound found so far, tagged as bounded.
    pub node_limit: Option<u64>,
}

impl DistanceConfig {
    pub fn with_witness(mut self) -> Self {
        self.want_witness = true;
        self
    }

    pub fn with_node_limit(mut self, limit: u64) -> Self {
        self.node_limit = Some(limit);
        self
    }

    pub fn with_optimizations(mut self, optimizations: Optimizations) -> Self {
        self.optimizations = optimizations;
        self
    }
}
