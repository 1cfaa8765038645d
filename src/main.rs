use clap::{Parser, ValueEnum};
use itertools::Itertools;
use rust_python_uspr::batch::{pairwise, paired, Metric};
use rust_python_uspr::config::{DistanceConfig, Optimizations};
use rust_python_uspr::distances::agreement_forests;
use rust_python_uspr::errors::DistanceError;
use rust_python_uspr::forest::LabelStyle;
use rust_python_uspr::io::{forests_from_trees, read_trees, write_matrix_tsv, write_pairs_tsv};
use phylotree::tree::Tree;
use std::path::PathBuf;
use std::time::Instant;

/// Compute TBR, uSPR or replug distances between the trees of a BEAST/NEXUS
/// or Newick file and write them as a TSV: an all-vs-all matrix, or one row
/// per pair when a second file is given.
#[derive(Parser, Debug)]
#[command(name = "uspr-dists", version, about = "Rearrangement distances between unrooted trees")]
struct Args {
    /// Path to a BEAST .trees (NEXUS) file or a file with one Newick tree per line
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Second tree file; trees are then compared pairwise by position
    #[arg(short = 'j', long = "second")]
    second: Option<PathBuf>,

    /// Burn-in by number of trees (drop first N trees)
    #[arg(short = 't', long = "burnin-trees", default_value_t = 0)]
    burnin_trees: usize,

    /// Burn-in by state (keep trees with STATE_ > value)
    #[arg(short = 's', long = "burnin-states", default_value_t = 0)]
    burnin_states: usize,

    /// Output path for the TSV (`-` for stdout, `.gz` to compress)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Use TRANSLATE block to map taxon IDs to labels when available
    #[arg(long = "use-real-taxa", default_value_t = false)]
    use_real_taxa: bool,

    /// Distance to compute
    #[arg(long = "metric", value_enum, default_value_t = MetricArg::Tbr)]
    metric: MetricArg,

    /// Print every maximum agreement forest of each pair to stdout
    #[arg(long = "print-mafs", default_value_t = false)]
    print_mafs: bool,

    /// Print the number of maximum agreement forests of each pair
    #[arg(long = "count-mafs", default_value_t = false)]
    count_mafs: bool,

    /// Write taxon names rather than label indices in agreement forests
    #[arg(long = "keep-labels", default_value_t = false)]
    keep_labels: bool,

    /// Disable the protect-A, protect-B, 2B and branch-and-bound rules
    #[arg(long = "no-opt", default_value_t = false)]
    no_opt: bool,

    /// Disable the protect-A rule only
    #[arg(long = "no-protect-a", default_value_t = false)]
    no_protect_a: bool,

    /// Disable the protect-B rule only
    #[arg(long = "no-protect-b", default_value_t = false)]
    no_protect_b: bool,

    /// Disable the 2B rule only
    #[arg(long = "no-2b", default_value_t = false)]
    no_2b: bool,

    /// Disable branch-and-bound pruning only
    #[arg(long = "no-branch-and-bound", default_value_t = false)]
    no_branch_and_bound: bool,

    /// Do not seed the TBR search with the approximation
    #[arg(long = "no-approx-estimate", default_value_t = false)]
    no_approx_estimate: bool,

    /// Do not start the uSPR search at the exact TBR distance
    #[arg(long = "no-tbr-estimate", default_value_t = false)]
    no_tbr_estimate: bool,

    /// Do not seed the replug search with its approximation
    #[arg(long = "no-replug-estimate", default_value_t = false)]
    no_replug_estimate: bool,

    /// Stop each search after this many states and report the best bound
    #[arg(long = "node-limit")]
    node_limit: Option<u64>,

    /// Quiet mode: suppresses progress messages on stdout
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricArg { Tbr, TbrLower, TbrUpper, Uspr, Replug }

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Tbr => Metric::Tbr,
            MetricArg::TbrLower => Metric::TbrLower,
            MetricArg::TbrUpper => Metric::TbrUpper,
            MetricArg::Uspr => Metric::Uspr,
            MetricArg::Replug => Metric::Replug,
        }
    }
}

impl Args {
    fn config(&self) -> DistanceConfig {
        let mut opts = Optimizations::from_switch(!self.no_opt);
        opts.protect_a &= !self.no_protect_a;
        opts.protect_b &= !self.no_protect_b;
        opts.two_b &= !self.no_2b;
        opts.branch_and_bound &= !self.no_branch_and_bound;
        opts.approx_estimate = !self.no_approx_estimate;
        opts.tbr_estimate = !self.no_tbr_estimate;
        opts.replug_estimate = !self.no_replug_estimate;
        let config = DistanceConfig::default().with_optimizations(opts);
        match self.node_limit {
            Some(limit) => config.with_node_limit(limit),
            None => config,
        }
    }
}

fn main() {
    let args = Args::parse();
    let config = args.config();
    let metric = Metric::from(args.metric);

    let t0 = Instant::now();
    let (names, trees) = read_or_exit(&args, &args.input);
    let second = args.second.as_ref().map(|path| read_or_exit(&args, path));
    log_if(!args.quiet, format!("Read in {} trees {:.3}s", trees.len(), t0.elapsed().as_secs_f64()));

    let pairs: Vec<(usize, usize)> = match &second {
        Some((_, other)) => (0..trees.len().min(other.len())).map(|i| (i, i)).collect(),
        None => (0..trees.len()).tuple_combinations().collect(),
    };
    if args.print_mafs || args.count_mafs {
        let others = second.as_ref().map_or(&trees, |(_, t)| t);
        report_mafs(&args, &config, &pairs, &trees, others);
    }

    let t1 = Instant::now();
    log_if(!args.quiet, format!("Determining distances using {} for {} combinations", metric.label(), pairs.len()));
    let written = match &second {
        None => {
            let matrix = match pairwise(&trees, metric, &config) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("Failed to compute distances: {e}");
                    std::process::exit(3);
                }
            };
            log_if(!args.quiet, format!("Determining distances using {} {:.3}s", metric.label(), t1.elapsed().as_secs_f64()));
            write_matrix_tsv(&args.output, &names, &matrix)
        }
        Some((other_names, other_trees)) => {
            let results = match paired(&trees, other_trees, metric, &config) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Failed to compute distances: {e}");
                    std::process::exit(3);
                }
            };
            log_if(!args.quiet, format!("Determining distances using {} {:.3}s", metric.label(), t1.elapsed().as_secs_f64()));
            let rows: Vec<(String, String, Vec<String>)> = results
                .into_iter()
                .enumerate()
                .map(|(i, r)| {
                    let value = r.map_or_else(
                        |e| {
                            eprintln!("Pair {i} failed: {e}");
                            "NA".to_string()
                        },
                        |d| d.to_string(),
                    );
                    (names[i].clone(), other_names[i].clone(), vec![value])
                })
                .collect();
            write_pairs_tsv(&args.output, &[metric.label()], &rows)
        }
    };

    if let Err(e) = written {
        eprintln!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    log_write_done(!args.quiet, &args.output, t1.elapsed().as_secs_f64());
}

fn read_or_exit(args: &Args, path: &PathBuf) -> (Vec<String>, Vec<Tree>) {
    match read_trees(path, args.burnin_trees, args.burnin_states, args.use_real_taxa) {
        Ok(named) if !named.is_empty() => named.into_iter().unzip(),
        Ok(_) => {
            eprintln!("No trees parsed from {path:?}.");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Failed to read {path:?}: {e}");
            std::process::exit(2);
        }
    }
}

fn report_mafs(args: &Args, config: &DistanceConfig, pairs: &[(usize, usize)], first: &[Tree], second: &[Tree]) {
    for &(i, j) in pairs {
        let outcome = forests_from_trees(&first[i], &second[j]).and_then(|(labels, f1, f2)| {
            let forests = agreement_forests(&f1, &f2, config)?;
            let style = if args.keep_labels { LabelStyle::Names(&labels) } else { LabelStyle::Indices };
            let mut count = 0;
            for witness in forests.iter() {
                let witness = witness?;
                count += 1;
                if args.print_mafs {
                    println!("{}", witness.to_newick(style));
                }
            }
            Ok::<_, DistanceError>(count)
        });
        match outcome {
            Ok(count) => println!("{i}\t{j}\t{count} mAFs"),
            Err(e) => eprintln!("Pair {i}/{j} failed: {e}"),
        }
    }
}

fn log_if(show: bool, msg: String) {
    if show { println!("{}", msg); }
}

fn log_write_done(show: bool, output: &PathBuf, secs: f64) {
    if !show { return; }
    let is_stdout = output.as_os_str() == "-";
    if is_stdout {
        println!("Writing to stdout {secs:.3}s");
    } else {
        println!("Writing to output {secs:.3}s");
    }
}
