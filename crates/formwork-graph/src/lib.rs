//! Graph definition for formwork workflow versions.
//!
//! A published workflow version carries an immutable node/edge graph as its
//! `graph_json`. This crate provides the typed representation of that graph,
//! adjacency analysis for traversal, and structural validation.

mod edge;
mod error;
mod graph;
mod node;
mod workflow;

pub use edge::Edge;
pub use error::GraphError;
pub use graph::Graph;
pub use node::{
  AssertionKind, AssertionRule, CompareOp, FilterSpec, Node, NodeConfig, NodeKind, WriteOperation,
};
pub use workflow::WorkflowVersion;
