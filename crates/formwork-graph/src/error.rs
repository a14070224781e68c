/// Structural errors in a workflow-version graph.
///
/// Any of these is fatal: the run aborts before a single node executes and no
/// partial trace is produced.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
  /// The designated start node does not exist in the graph.
  #[error("start node '{node_id}' not found in graph")]
  MissingStartNode { node_id: String },

  /// Two nodes share the same id.
  #[error("duplicate node id '{node_id}'")]
  DuplicateNode { node_id: String },

  /// An edge references a node that does not exist.
  #[error("edge '{from}' -> '{to}' references unknown node '{missing}'")]
  DanglingEdge {
    from: String,
    to: String,
    missing: String,
  },
}
