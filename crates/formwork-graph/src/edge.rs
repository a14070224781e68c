use serde::{Deserialize, Serialize};

/// A directed edge between two nodes.
///
/// Traversed only if `condition` is absent or evaluates truthy against the
/// run's current variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
  pub from: String,
  pub to: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
}
