use thiserror::Error;

use crate::forest::{Label, NodeId};

/// Errors raised while building or restricting a [`Forest`](crate::forest::Forest).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForestError {
    #[error("Node id {0} is declared more than once")]
    DuplicateNodeId(NodeId),
    #[error("Label {0} appears on more than one leaf")]
    DuplicateLabel(Label),
    #[error("Label {label} is outside the label universe of size {universe}")]
    LabelOutOfRange { label: Label, universe: usize },
    #[error("Node {node} references node {neighbor}, which does not exist")]
    DanglingEdge { node: NodeId, neighbor: NodeId },
    #[error("Edge {from} -> {to} is not recorded on node {to}")]
    AsymmetricEdge { from: NodeId, to: NodeId },
    #[error("Node {0} is connected to itself")]
    SelfLoop(NodeId),
    #[error("Node {node} lists neighbor {neighbor} more than once")]
    ParallelEdge { node: NodeId, neighbor: NodeId },
    #[error("The node-neighbor graph contains a cycle")]
    Cycle,
    #[error("Node {0} has fewer than two neighbors but carries no label")]
    UnlabeledLeaf(NodeId),
    #[error("Node {0} is internal but carries a label")]
    LabeledInternalNode(NodeId),
    #[error("Blocks overlap at node {0}: their spanning subtrees are not disjoint")]
    OverlappingBlocks(NodeId),
}

/// Errors raised by the distance operations and the layers around them.
#[derive(Error, Debug)]
pub enum DistanceError {
    #[error(transparent)]
    Forest(#[from] ForestError),
    #[error("Label sets differ: only in first {only_first:?}, only in second {only_second:?}")]
    LabelMismatch {
        only_first: Vec<Label>,
        only_second: Vec<Label>,
    },
    #[error("Taxa differ: only in first {only_first:?}, only in second {only_second:?}")]
    TaxaMismatch {
        only_first: Vec<String>,
        only_second: Vec<String>,
    },
    #[error("Node {node} has degree {degree}; only binary trees are supported")]
    NotBinary { node: NodeId, degree: usize },
    #[error("Expected a single tree but found {components} components")]
    NotATree { components: usize },
    #[error("Tree contains a leaf without a name")]
    UnnamedLeaf,
    #[error("Taxon {0} appears more than once in the same tree")]
    DuplicateTaxon(String),
    #[error("Could not parse tree: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Number of trees in tree1 ({first}) and tree2 ({second}) must match")]
    BatchLengthMismatch { first: usize, second: usize },
}
