use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::warn;
use phylotree::tree::Tree;

use crate::errors::DistanceError;
use crate::forest::{Forest, NodeSpec};
use crate::labels::LabelMap;

/// Strip BEAST annotations from Newick strings.
///
/// BEAST format includes annotations like :[&rate=0.123]2.45 where 2.45 is the actual branch length.
/// This function removes the [&...] annotations while preserving the branch lengths.
fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// Parse one Newick string, tolerating BEAST annotations.
pub fn parse_newick(text: &str) -> Result<Tree, DistanceError> {
    let newick = strip_beast_annotations(text.trim());
    Tree::from_newick(&newick).map_err(|e| DistanceError::Parse(format!("{e}")))
}

/// Leaf names of a parsed tree, in the tree's leaf order.
pub fn leaf_names(tree: &Tree) -> Result<Vec<String>, DistanceError> {
    tree.get_leaves()
        .iter()
        .map(|id| {
            tree.get(id)
                .ok()
                .and_then(|node| node.name.clone())
                .filter(|name| !name.is_empty())
                .ok_or(DistanceError::UnnamedLeaf)
        })
        .collect()
}

/// Converts a parsed tree into a [`Forest`] over the labels of `labels`.
///
/// Walks the tree from its root; every node becomes a tuple of its children
/// and parent. Names on internal nodes (support values) are dropped, and a
/// degree-2 root is left for normalization to suppress.
pub fn forest_from_tree(tree: &Tree, labels: &LabelMap) -> Result<Forest, DistanceError> {
    let root = tree.get_root().map_err(|e| DistanceError::Parse(format!("{e}")))?;
    let mut specs = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = tree.get(&id).map_err(|e| DistanceError::Parse(format!("{e}")))?;
        let mut neighbors = node.children.clone();
        neighbors.extend(node.parent);

        let label = if node.children.is_empty() {
            let name = node.name.as_deref().filter(|n| !n.is_empty()).ok_or(DistanceError::UnnamedLeaf)?;
            let label = labels.get(name).ok_or_else(|| DistanceError::TaxaMismatch {
                only_first: Vec::new(),
                only_second: vec![name.to_string()],
            })?;
            Some(label)
        } else {
            None
        };

        stack.extend(node.children.iter().copied());
        specs.push(NodeSpec::new(id, neighbors, label));
    }
    Ok(Forest::new(specs, labels.len())?)
}

/// Shared label map and the two forests of one tree pair.
///
/// # Errors
/// Unnamed leaves, repeated names, or differing taxon sets.
pub fn forests_from_trees(first: &Tree, second: &Tree) -> Result<(LabelMap, Forest, Forest), DistanceError> {
    let labels = LabelMap::from_names(leaf_names(first)?)?;
    labels.check_same_taxa(leaf_names(second)?)?;
    let f1 = forest_from_tree(first, &labels)?;
    let f2 = forest_from_tree(second, &labels)?;
    Ok((labels, f1, f2))
}

/// One label map over the taxa of `trees[0]` and a forest per tree.
///
/// # Errors
/// As [`forests_from_trees`], for the first tree that does not fit.
pub fn forests_over_shared_taxa(trees: &[Tree]) -> Result<(LabelMap, Vec<Forest>), DistanceError> {
    let Some(first) = trees.first() else {
        return Ok((LabelMap::from_names(Vec::<String>::new())?, Vec::new()));
    };
    let labels = LabelMap::from_names(leaf_names(first)?)?;
    let forests = trees
        .iter()
        .map(|tree| {
            labels.check_same_taxa(leaf_names(tree)?)?;
            forest_from_tree(tree, &labels)
        })
        .collect::<Result<_, DistanceError>>()?;
    Ok((labels, forests))
}

pub fn forests_from_newick(first: &str, second: &str) -> Result<(LabelMap, Forest, Forest), DistanceError> {
    forests_from_trees(&parse_newick(first)?, &parse_newick(second)?)
}

/// Read named trees from a NEXUS/BEAST file or a plain Newick file (one tree
/// per non-empty line).
///
/// Burn-in applies to NEXUS input: `burnin_trees` drops the first trees,
/// `burnin_states` keeps trees with `STATE_` above the value. With both zero
/// nothing is dropped.
pub fn read_trees<P: AsRef<Path>>(
    path: P,
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
) -> Result<Vec<(String, Tree)>, DistanceError> {
    let content = fs::read_to_string(path.as_ref())?;

    let base_name = path
        .as_ref()
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".trees"))
        .unwrap_or("unknown");

    if !content.trim_start().to_ascii_uppercase().starts_with("#NEXUS") {
        return content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(idx, line)| Ok::<_, DistanceError>((format!("{base_name}_tree{idx}"), parse_newick(line)?)))
            .collect();
    }

    let taxons = parse_taxon_block(&content);

    collect_tree_blocks(&content)
        .into_iter()
        .enumerate()
        .map(|(idx, tree)| {
            let state = extract_state(tree.header);
            (idx, tree, state, format!("{base_name}_tree_STATE{state}"))
        })
        .filter(|(idx, _tree, state, _name)| {
            (burnin_trees == 0 && burnin_states == 0)
                || (burnin_trees > 0 && *idx >= burnin_trees)
                || (burnin_states > 0 && *state > burnin_states)
        })
        .map(|(idx, tree, _state, name)| {
            let mut phylo_tree = parse_newick(&tree.body).inspect_err(|e| {
                warn!("Failed to parse tree {} at index {idx}: {e}", path.as_ref().display());
            })?;
            if use_real_taxa {
                rename_leaf_nodes(&mut phylo_tree, &taxons);
            }
            Ok::<_, DistanceError>((name, phylo_tree))
        })
        .collect()
}

fn extract_state(header: &str) -> usize {
    if let Some(start) = header.to_ascii_uppercase().find("STATE_") {
        let rest = &header[start + 6..];
        let state = rest.chars().take_while(|c| c.is_ascii_digit()).collect::<String>();
        if let Ok(num) = state.parse::<usize>() {
            return num;
        }
    }
    0
}

struct TreeBlock<'a> {
    header: &'a str,
    body: String,
}

fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .skip_while(|line| !line.trim_start().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| {
            let (header, body) = line.split_once(" = ")?;
            Some(TreeBlock { header: header.trim(), body: body.trim().to_string() })
        })
        .collect()
}

fn parse_taxon_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        // 1 '1959.M.CD.59.ZR59',
        .filter_map(|line| {
            let line = line.trim().trim_end_matches(',').trim_end_matches(';');
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

/// Replace TRANSLATE ids on the leaves by taxon names; unknown ids stay.
pub fn rename_leaf_nodes(phylo_tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in phylo_tree.get_leaves() {
        if let Ok(node) = phylo_tree.get_mut(&leaf_id) {
            if let Some(name) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(name.clone());
            }
        }
    }
}

/// Buffered writer on `path`; a `.gz` suffix switches on gzip compression.
fn create_output(path: &Path) -> io::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(BufWriter::new(GzEncoder::new(file, Compression::default()))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Write a labeled square matrix as TSV to a file or, for `-`, to stdout.
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_matrix_tsv<P: AsRef<Path>, T: std::fmt::Display>(
    path: P,
    names: &[String],
    mat: &[Vec<T>],
) -> io::Result<()> {
    let mut out = create_output(path.as_ref())?;

    write!(&mut out, "\t")?;
    for (k, name) in names.iter().enumerate() {
        if k > 0 {
            write!(&mut out, "\t")?;
        }
        write!(&mut out, "{name}")?;
    }
    writeln!(&mut out)?;

    for (name, row) in names.iter().zip(mat) {
        write!(&mut out, "{name}")?;
        for val in row {
            write!(&mut out, "\t{val}")?;
        }
        writeln!(&mut out)?;
    }

    out.flush()
}

/// Write one row per tree pair: both names and the pair's columns.
pub fn write_pairs_tsv<P: AsRef<Path>>(
    path: P,
    header: &[&str],
    rows: &[(String, String, Vec<String>)],
) -> io::Result<()> {
    let mut out = create_output(path.as_ref())?;
    writeln!(&mut out, "tree1\ttree2\t{}", header.join("\t"))?;
    for (first, second, values) in rows {
        writeln!(&mut out, "{first}\t{second}\t{}", values.join("\t"))?;
    }
    out.flush()
}
