//! Engine errors.
//!
//! Two tiers: [`EngineError`] is fatal and aborts the whole run;
//! [`NodeError`] is scoped to one node, converts to a `failed` trace entry,
//! and halts only the branch it occurred on.

use formwork_expr::ExpressionError;
use formwork_graph::GraphError;

/// Fatal, run-aborting errors. No partial trace is trusted after one of
/// these.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// Malformed graph (missing start node, dangling edge, duplicate id).
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// The run was cancelled.
  #[error("run cancelled")]
  Cancelled,
}

/// Node-scoped failures, recorded in the trace.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
  /// Malformed or failing expression.
  #[error(transparent)]
  Expression(#[from] ExpressionError),

  /// I/O failure from the tabular store. Not retried by the engine; retry
  /// policy belongs to the caller.
  #[error("repository error: {0}")]
  Repository(#[from] formwork_store::Error),

  /// Script exceeded its execution budget.
  #[error("script exceeded its {timeout_ms}ms budget")]
  ScriptTimeout { timeout_ms: u64 },

  /// Script reported a failure.
  #[error("script failed: {message}")]
  Script { message: String },

  /// The node's configuration cannot be executed.
  #[error("invalid node config: {message}")]
  InvalidConfig { message: String },
}
