//! Script sandbox contract.
//!
//! Script/transform nodes hand their code to a sandboxed runtime with no
//! filesystem or network access. The engine depends only on the
//! [`ScriptSandbox`] trait; production deployments plug in an external
//! runtime, while [`ExprSandbox`] is a built-in deterministic implementation
//! used by the CLI and tests. Timeouts are enforced by the engine at the call
//! site, not inside the sandbox.

use std::collections::HashMap;

use async_trait::async_trait;
use formwork_expr::{Evaluator, scope_with_aliases};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A script execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
  /// Script source.
  pub code: String,
  /// Variable keys the script reads; already resolved into `data`.
  pub input_keys: Vec<String>,
  /// Resolved input values, keyed by the requested key.
  pub data: HashMap<String, Value>,
  /// Alias -> canonical id map, passed through for scripts that resolve
  /// identifiers themselves.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub alias_map: Option<HashMap<String, String>>,
  /// Execution budget in milliseconds.
  pub timeout_ms: u64,
}

/// Outcome of a sandboxed script execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
  pub ok: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl ScriptOutcome {
  pub fn success(output: Value) -> Self {
    Self {
      ok: true,
      output: Some(output),
      error: None,
    }
  }

  pub fn failure(error: impl Into<String>) -> Self {
    Self {
      ok: false,
      output: None,
      error: Some(error.into()),
    }
  }
}

/// Sandboxed script runtime.
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
  async fn execute(&self, request: ScriptRequest) -> ScriptOutcome;
}

/// Built-in sandbox that evaluates the script body as a single expression
/// over the request data. Deterministic, no I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprSandbox;

#[async_trait]
impl ScriptSandbox for ExprSandbox {
  async fn execute(&self, request: ScriptRequest) -> ScriptOutcome {
    let scope = scope_with_aliases(&request.data, request.alias_map.as_ref());
    match Evaluator::new().eval(&request.code, &scope) {
      Ok(output) => ScriptOutcome::success(output),
      Err(e) => ScriptOutcome::failure(e.to_string()),
    }
  }
}
