use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::Node;

/// A published workflow version.
///
/// Immutable once published; the graph is read-only input to the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVersion {
  pub workflow_id: String,
  pub version: u32,
  pub name: String,
  pub nodes: Vec<Node>,
  pub edges: Vec<Edge>,
  pub start_node_id: String,
}

impl WorkflowVersion {
  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes, &self.edges)
  }

  /// Get a node by id.
  pub fn node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.iter().find(|node| node.node_id == node_id)
  }

  /// Check the graph's structure. Any error here aborts a run before any
  /// node executes.
  pub fn validate(&self) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for node in &self.nodes {
      if !seen.insert(node.node_id.as_str()) {
        return Err(GraphError::DuplicateNode {
          node_id: node.node_id.clone(),
        });
      }
    }

    if !seen.contains(self.start_node_id.as_str()) {
      return Err(GraphError::MissingStartNode {
        node_id: self.start_node_id.clone(),
      });
    }

    for edge in &self.edges {
      for endpoint in [&edge.from, &edge.to] {
        if !seen.contains(endpoint.as_str()) {
          return Err(GraphError::DanglingEdge {
            from: edge.from.clone(),
            to: edge.to.clone(),
            missing: endpoint.clone(),
          });
        }
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::NodeConfig;

  fn conditional(node_id: &str) -> Node {
    Node {
      node_id: node_id.to_string(),
      config: NodeConfig::Conditional {
        expression: None,
        output_key: None,
      },
    }
  }

  fn edge(from: &str, to: &str) -> Edge {
    Edge {
      from: from.to_string(),
      to: to.to_string(),
      condition: None,
    }
  }

  fn workflow(nodes: Vec<Node>, edges: Vec<Edge>, start: &str) -> WorkflowVersion {
    WorkflowVersion {
      workflow_id: "wf-1".to_string(),
      version: 1,
      name: "Test".to_string(),
      nodes,
      edges,
      start_node_id: start.to_string(),
    }
  }

  #[test]
  fn test_validate_accepts_well_formed_graph() {
    let wf = workflow(
      vec![conditional("a"), conditional("b")],
      vec![edge("a", "b")],
      "a",
    );
    assert!(wf.validate().is_ok());
  }

  #[test]
  fn test_validate_rejects_unknown_start_node() {
    let wf = workflow(vec![conditional("a")], vec![], "nope");
    assert!(matches!(
      wf.validate(),
      Err(GraphError::MissingStartNode { .. })
    ));
  }

  #[test]
  fn test_validate_rejects_duplicate_node_ids() {
    let wf = workflow(vec![conditional("a"), conditional("a")], vec![], "a");
    assert!(matches!(wf.validate(), Err(GraphError::DuplicateNode { .. })));
  }

  #[test]
  fn test_validate_rejects_dangling_edge() {
    let wf = workflow(vec![conditional("a")], vec![edge("a", "ghost")], "a");
    match wf.validate() {
      Err(GraphError::DanglingEdge { missing, .. }) => assert_eq!(missing, "ghost"),
      other => panic!("expected dangling edge error, got {:?}", other.err()),
    }
  }

  #[test]
  fn test_graph_adjacency_tracks_outgoing_edges() {
    let wf = workflow(
      vec![conditional("a"), conditional("b"), conditional("c")],
      vec![edge("a", "b"), edge("a", "c"), edge("b", "c")],
      "a",
    );
    let graph = wf.graph();
    assert_eq!(graph.outgoing("a").len(), 2);
    assert_eq!(graph.outgoing("b"), &[2]);
    assert!(graph.outgoing("c").is_empty());
    assert_eq!(graph.edge(1).to, "c");
  }
}
