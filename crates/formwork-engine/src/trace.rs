//! Per-node audit records of a run.

use formwork_graph::{NodeKind, WriteOperation};
use formwork_store::RowValues;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution status of one visited node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Executed,
  Skipped,
  Failed,
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Success,
  Failed,
}

/// A side effect proposed or applied by a write node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffect {
  pub table_id: String,
  pub operation: WriteOperation,
  pub row_id: String,
  pub values: RowValues,
  /// False while held in the shadow overlay (preview), true once applied to
  /// the repository.
  pub committed: bool,
}

/// One entry per visited node; the audit record of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
  pub node_id: String,
  pub kind: NodeKind,
  pub status: NodeStatus,
  /// Condition of the edge this node was reached through, when it had one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition_result: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub outputs_delta: Option<Map<String, Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub side_effects: Option<Vec<SideEffect>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl TraceEntry {
  pub fn new(node_id: impl Into<String>, kind: NodeKind, status: NodeStatus) -> Self {
    Self {
      node_id: node_id.into(),
      kind,
      status,
      condition: None,
      condition_result: None,
      outputs_delta: None,
      side_effects: None,
      skip_reason: None,
      error: None,
    }
  }
}
