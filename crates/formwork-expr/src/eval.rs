//! Expression evaluation against a variable scope.
//!
//! Expressions are minijinja expressions: literals, variable references, and
//! binary arithmetic/comparison/boolean operators (`amount > 100`,
//! `status == "approved" and retries < 3`). Evaluation is deterministic and
//! side-effect-free; identical inputs always yield identical values, which is
//! what cache keys and idempotency keys are derived from.
//!
//! Unknown variable references evaluate to null rather than failing, so
//! conditions stay robust against partially-filled runs.

use std::collections::HashMap;

use minijinja::Environment;
use serde_json::Value;
use thiserror::Error;

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Error)]
pub enum ExpressionError {
  /// The expression does not parse.
  #[error("invalid expression '{expression}': {message}")]
  Parse { expression: String, message: String },

  /// The expression parsed but failed to evaluate.
  #[error("failed to evaluate '{expression}': {message}")]
  Eval { expression: String, message: String },
}

/// Evaluates configured expression strings against run variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator;

impl Evaluator {
  pub fn new() -> Self {
    Self
  }

  /// Evaluate `expression` against `scope`, returning a JSON value.
  pub fn eval(
    &self,
    expression: &str,
    scope: &HashMap<String, Value>,
  ) -> Result<Value, ExpressionError> {
    let env = Environment::new();
    let compiled =
      env
        .compile_expression(expression)
        .map_err(|e| ExpressionError::Parse {
          expression: expression.to_string(),
          message: e.to_string(),
        })?;

    let value = compiled
      .eval(minijinja::Value::from_serialize(scope))
      .map_err(|e| ExpressionError::Eval {
        expression: expression.to_string(),
        message: e.to_string(),
      })?;

    serde_json::to_value(&value).map_err(|e| ExpressionError::Eval {
      expression: expression.to_string(),
      message: e.to_string(),
    })
  }

  /// Evaluate `expression` and reduce it to a boolean using template
  /// truthiness: null, false, zero and empty strings/collections are false.
  pub fn eval_truthy(
    &self,
    expression: &str,
    scope: &HashMap<String, Value>,
  ) -> Result<bool, ExpressionError> {
    let env = Environment::new();
    let compiled =
      env
        .compile_expression(expression)
        .map_err(|e| ExpressionError::Parse {
          expression: expression.to_string(),
          message: e.to_string(),
        })?;

    compiled
      .eval(minijinja::Value::from_serialize(scope))
      .map(|value| value.is_true())
      .map_err(|e| ExpressionError::Eval {
        expression: expression.to_string(),
        message: e.to_string(),
      })
  }
}
