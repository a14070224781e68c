use std::collections::HashMap;

use formwork_store::FilterOp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work in the execution graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  #[serde(flatten)]
  pub config: NodeConfig,
}

impl Node {
  pub fn kind(&self) -> NodeKind {
    self.config.kind()
  }
}

/// Closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Input,
  Output,
  Query,
  Write,
  Validate,
  Script,
  Conditional,
}

/// Kind-specific node configuration.
///
/// Expression-valued fields (`value`, filter values, write `data` entries,
/// edge conditions) are evaluated against the run's variables at execution
/// time; everything else is static configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
  /// Reads `key` from the run input and stores it under `output_key`.
  Input {
    key: String,
    output_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
  },

  /// Evaluates `value` and records it in the run's final outputs under `key`.
  Output { key: String, value: String },

  /// Reads rows from a table through the repository.
  Query {
    table_id: String,
    #[serde(default)]
    filters: Vec<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    output_key: String,
  },

  /// Creates, updates or deletes a row. `row_id` is required for update and
  /// delete and identifies the target row.
  Write {
    table_id: String,
    operation: WriteOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    row_id: Option<String>,
    #[serde(default)]
    data: HashMap<String, String>,
    output_key: String,
  },

  /// Evaluates assertion rules against resolved variables.
  Validate {
    rules: Vec<AssertionRule>,
    output_key: String,
  },

  /// Hands `code` to the script sandbox with the resolved `input_keys`.
  Script {
    code: String,
    #[serde(default)]
    input_keys: Vec<String>,
    output_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
  },

  /// Branch point. Gating happens on outgoing edge conditions; the node
  /// itself may evaluate `expression` into `output_key` for downstream use.
  Conditional {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_key: Option<String>,
  },
}

impl NodeConfig {
  pub fn kind(&self) -> NodeKind {
    match self {
      NodeConfig::Input { .. } => NodeKind::Input,
      NodeConfig::Output { .. } => NodeKind::Output,
      NodeConfig::Query { .. } => NodeKind::Query,
      NodeConfig::Write { .. } => NodeKind::Write,
      NodeConfig::Validate { .. } => NodeKind::Validate,
      NodeConfig::Script { .. } => NodeKind::Script,
      NodeConfig::Conditional { .. } => NodeKind::Conditional,
    }
  }
}

/// Write operations against the tabular store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperation {
  Create,
  Update,
  Delete,
}

/// A single query filter; `value` is an expression evaluated at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
  pub column: String,
  #[serde(default)]
  pub op: FilterOp,
  pub value: String,
}

/// One assertion evaluated by a validate node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRule {
  /// Variable under test; an alias or a canonical id.
  pub field: String,
  #[serde(flatten)]
  pub kind: AssertionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AssertionKind {
  /// The field must equal the evaluated `value` expression.
  Equals { value: String },

  /// The field must be present and not null, "", [] or {}.
  NotEmpty,

  /// The field must compare against the evaluated `value` expression.
  Compare { op: CompareOp, value: String },

  /// The field must be a list; nested rules run against each element.
  ForEach { rules: Vec<AssertionRule> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
  Gt,
  Gte,
  Lt,
  Lte,
}
