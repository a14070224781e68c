use std::collections::HashMap;

use crate::edge::Edge;
use crate::node::Node;

/// Graph structure for traversal.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Nodes by id.
  nodes: HashMap<String, Node>,
  /// All edges, in definition order.
  edges: Vec<Edge>,
  /// Adjacency list: node_id -> indices into `edges` for its outgoing edges.
  adjacency: HashMap<String, Vec<usize>>,
}

impl Graph {
  /// Build a graph from nodes and edges.
  pub fn new(nodes: &[Node], edges: &[Edge]) -> Self {
    let nodes: HashMap<String, Node> = nodes
      .iter()
      .map(|node| (node.node_id.clone(), node.clone()))
      .collect();

    let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
    for node_id in nodes.keys() {
      adjacency.entry(node_id.clone()).or_default();
    }
    for (index, edge) in edges.iter().enumerate() {
      adjacency.entry(edge.from.clone()).or_default().push(index);
    }

    Self {
      nodes,
      edges: edges.to_vec(),
      adjacency,
    }
  }

  /// Look up a node by id.
  pub fn node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  /// An edge by its index.
  pub fn edge(&self, index: usize) -> &Edge {
    &self.edges[index]
  }

  /// Indices of a node's outgoing edges.
  pub fn outgoing(&self, node_id: &str) -> &[usize] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }
}
