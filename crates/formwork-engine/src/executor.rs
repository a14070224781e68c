//! Node executors.
//!
//! One handler per node kind, dispatched over the closed [`NodeConfig`]
//! enum. Each executor takes the node and the run context and produces a
//! [`NodeOutcome`]: a status, an outputs delta, and any side effects. The
//! runner merges the delta into the run variables and records the outcome in
//! the trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use formwork_expr::Evaluator;
use formwork_graph::{
  AssertionKind, AssertionRule, CompareOp, FilterSpec, Node, NodeConfig, WriteOperation,
};
use formwork_sandbox::{ScriptRequest, ScriptSandbox};
use formwork_store::{Filter, Row, RowRepository, RowValues};
use serde_json::{Value, json};

use crate::cache;
use crate::context::{ExecutionContext, ExecutionMode};
use crate::error::NodeError;
use crate::trace::{NodeStatus, SideEffect};

/// What a node executor produced.
#[derive(Debug)]
pub struct NodeOutcome {
  pub status: NodeStatus,
  pub outputs_delta: HashMap<String, Value>,
  pub side_effects: Vec<SideEffect>,
  pub skip_reason: Option<String>,
}

impl NodeOutcome {
  fn executed() -> Self {
    Self {
      status: NodeStatus::Executed,
      outputs_delta: HashMap::new(),
      side_effects: Vec::new(),
      skip_reason: None,
    }
  }

  fn skipped(reason: &str) -> Self {
    Self {
      status: NodeStatus::Skipped,
      outputs_delta: HashMap::new(),
      side_effects: Vec::new(),
      skip_reason: Some(reason.to_string()),
    }
  }

  fn with_output(mut self, key: &str, value: Value) -> Self {
    self.outputs_delta.insert(key.to_string(), value);
    self
  }
}

/// Shared collaborators for node execution.
pub(crate) struct Executors {
  pub repo: Arc<dyn RowRepository>,
  pub sandbox: Arc<dyn ScriptSandbox>,
  pub evaluator: Evaluator,
  pub default_script_timeout_ms: u64,
}

impl Executors {
  /// Dispatch a node to its executor.
  pub async fn execute(
    &self,
    node: &Node,
    ctx: &mut ExecutionContext,
  ) -> Result<NodeOutcome, NodeError> {
    match &node.config {
      NodeConfig::Input {
        key,
        output_key,
        default,
      } => self.input(ctx, key, output_key, default.as_ref()),
      NodeConfig::Output { key, value } => self.output(ctx, key, value),
      NodeConfig::Query {
        table_id,
        filters,
        limit,
        output_key,
      } => self.query(ctx, table_id, filters, *limit, output_key).await,
      NodeConfig::Write {
        table_id,
        operation,
        row_id,
        data,
        output_key,
      } => {
        self
          .write(node, ctx, table_id, *operation, row_id.as_deref(), data, output_key)
          .await
      }
      NodeConfig::Validate { rules, output_key } => self.validate(ctx, rules, output_key),
      NodeConfig::Script {
        code,
        input_keys,
        output_key,
        timeout_ms,
      } => {
        self
          .script(node, ctx, code, input_keys, output_key, *timeout_ms)
          .await
      }
      NodeConfig::Conditional {
        expression,
        output_key,
      } => self.conditional(ctx, expression.as_deref(), output_key.as_deref()),
    }
  }

  fn input(
    &self,
    ctx: &ExecutionContext,
    key: &str,
    output_key: &str,
    default: Option<&Value>,
  ) -> Result<NodeOutcome, NodeError> {
    let value = ctx
      .input
      .get(key)
      .cloned()
      .or_else(|| default.cloned())
      .unwrap_or(Value::Null);

    Ok(NodeOutcome::executed().with_output(output_key, value))
  }

  fn output(
    &self,
    ctx: &ExecutionContext,
    key: &str,
    value: &str,
  ) -> Result<NodeOutcome, NodeError> {
    let value = self.evaluator.eval(value, &ctx.scope())?;
    Ok(NodeOutcome::executed().with_output(key, value))
  }

  async fn query(
    &self,
    ctx: &mut ExecutionContext,
    table_id: &str,
    filters: &[FilterSpec],
    limit: Option<usize>,
    output_key: &str,
  ) -> Result<NodeOutcome, NodeError> {
    let scope = ctx.scope();
    let mut resolved = Vec::with_capacity(filters.len());
    for spec in filters {
      resolved.push(Filter {
        column: spec.column.clone(),
        op: spec.op,
        value: self.evaluator.eval(&spec.value, &scope)?,
      });
    }

    let key = cache::query_key(table_id, &resolved, limit);
    if let Some(rows) = ctx.cache.get_query(&key) {
      let mut outcome = NodeOutcome::executed().with_output(output_key, rows_to_value(rows));
      outcome.skip_reason = Some("cached".to_string());
      return Ok(outcome);
    }

    let rows = match ctx.mode() {
      ExecutionMode::Preview => {
        // Rows written earlier in this run take precedence over the store.
        let shadowed = ctx.shadow.matching(table_id, &resolved, limit);
        if !shadowed.is_empty() {
          shadowed
        } else {
          let fetched = self.fetch(ctx, table_id, &resolved, limit).await?;
          let mut rows = ctx.shadow.overlay(fetched);
          rows.retain(|row| resolved.iter().all(|f| f.matches(row)));
          rows
        }
      }
      ExecutionMode::Live => self.fetch(ctx, table_id, &resolved, limit).await?,
    };

    ctx.cache.insert_query(key, rows.clone());
    Ok(NodeOutcome::executed().with_output(output_key, rows_to_value(&rows)))
  }

  async fn fetch(
    &self,
    ctx: &mut ExecutionContext,
    table_id: &str,
    filters: &[Filter],
    limit: Option<usize>,
  ) -> Result<Vec<Row>, NodeError> {
    let started = Instant::now();
    let rows = self.repo.get_rows_with_values(table_id, filters, limit).await?;
    ctx.metrics.db_time_ms += started.elapsed().as_millis() as u64;
    ctx.metrics.query_count += 1;
    Ok(rows)
  }

  #[allow(clippy::too_many_arguments)]
  async fn write(
    &self,
    node: &Node,
    ctx: &mut ExecutionContext,
    table_id: &str,
    operation: WriteOperation,
    row_id: Option<&str>,
    data: &HashMap<String, String>,
    output_key: &str,
  ) -> Result<NodeOutcome, NodeError> {
    let scope = ctx.scope();

    let mut values = RowValues::new();
    for (column, expression) in data {
      values.insert(column.clone(), self.evaluator.eval(expression, &scope)?);
    }

    let target_row_id = match operation {
      WriteOperation::Create => None,
      WriteOperation::Update | WriteOperation::Delete => {
        let expression = row_id.ok_or_else(|| NodeError::InvalidConfig {
          message: format!("{operation:?} write on '{table_id}' requires row_id"),
        })?;
        match self.evaluator.eval(expression, &scope)? {
          Value::String(id) => Some(id),
          other => {
            return Err(NodeError::InvalidConfig {
              message: format!("row_id expression resolved to non-string value: {other}"),
            });
          }
        }
      }
    };

    let key = cache::side_effect_key(&node.node_id, operation, target_row_id.as_deref(), &values);
    if ctx.executed_side_effects.contains(&key) {
      return Ok(NodeOutcome::skipped("idempotency"));
    }

    let effect = match ctx.mode() {
      ExecutionMode::Preview => self.apply_shadow(ctx, table_id, operation, target_row_id, values),
      ExecutionMode::Live => {
        self
          .apply_live(ctx, table_id, operation, target_row_id, values)
          .await?
      }
    };

    ctx.executed_side_effects.insert(key);

    let output = match effect.operation {
      WriteOperation::Delete => json!({ "row_id": effect.row_id, "deleted": true }),
      _ => {
        let mut object = serde_json::Map::new();
        for (column, value) in &effect.values {
          object.insert(column.clone(), value.clone());
        }
        object.insert("row_id".to_string(), json!(effect.row_id));
        Value::Object(object)
      }
    };

    let mut outcome = NodeOutcome::executed().with_output(output_key, output);
    outcome.side_effects.push(effect);
    Ok(outcome)
  }

  /// Preview path: synthesize the result and record it in the shadow
  /// overlay; the repository is never called.
  fn apply_shadow(
    &self,
    ctx: &mut ExecutionContext,
    table_id: &str,
    operation: WriteOperation,
    target_row_id: Option<String>,
    values: RowValues,
  ) -> SideEffect {
    let row_id = match operation {
      WriteOperation::Create => {
        let row = Row {
          row_id: uuid::Uuid::new_v4().to_string(),
          table_id: table_id.to_string(),
          values: values.clone(),
        };
        ctx.shadow.record_create(row.clone());
        row.row_id
      }
      WriteOperation::Update => {
        // target_row_id is present; the dispatcher rejects update/delete
        // configs without one before this point.
        let row_id = target_row_id.unwrap_or_default();
        ctx.shadow.record_update(&row_id, &values);
        row_id
      }
      WriteOperation::Delete => {
        let row_id = target_row_id.unwrap_or_default();
        ctx.shadow.record_delete(&row_id);
        row_id
      }
    };

    SideEffect {
      table_id: table_id.to_string(),
      operation,
      row_id,
      values,
      committed: false,
    }
  }

  /// Live path: exactly one repository call per applied effect.
  async fn apply_live(
    &self,
    ctx: &mut ExecutionContext,
    table_id: &str,
    operation: WriteOperation,
    target_row_id: Option<String>,
    values: RowValues,
  ) -> Result<SideEffect, NodeError> {
    let started = Instant::now();
    let (row_id, values) = match operation {
      WriteOperation::Create => {
        let row = self
          .repo
          .create_row_with_values(table_id, values)
          .await?;
        (row.row_id, row.values)
      }
      WriteOperation::Update => {
        let row_id = target_row_id.unwrap_or_default();
        let row = self.repo.update_row_values(&row_id, values).await?;
        (row.row_id, row.values)
      }
      WriteOperation::Delete => {
        let row_id = target_row_id.unwrap_or_default();
        self.repo.delete_row(&row_id).await?;
        (row_id, values)
      }
    };
    ctx.metrics.db_time_ms += started.elapsed().as_millis() as u64;

    Ok(SideEffect {
      table_id: table_id.to_string(),
      operation,
      row_id,
      values,
      committed: true,
    })
  }

  fn validate(
    &self,
    ctx: &ExecutionContext,
    rules: &[AssertionRule],
    output_key: &str,
  ) -> Result<NodeOutcome, NodeError> {
    let scope = ctx.scope();
    let mut errors = Vec::new();
    let mut field_errors: HashMap<String, Vec<String>> = HashMap::new();

    self.apply_rules(ctx, &scope, rules, None, &mut errors, &mut field_errors)?;

    let success = errors.is_empty();
    let result = json!({
      "success": success,
      "errors": errors,
      "field_errors": field_errors,
    });

    Ok(NodeOutcome::executed().with_output(output_key, result))
  }

  /// Check rules against the run variables, or against one list element when
  /// recursing under a for-each rule.
  fn apply_rules(
    &self,
    ctx: &ExecutionContext,
    scope: &HashMap<String, Value>,
    rules: &[AssertionRule],
    element: Option<&Value>,
    errors: &mut Vec<String>,
    field_errors: &mut HashMap<String, Vec<String>>,
  ) -> Result<(), NodeError> {
    for rule in rules {
      let actual = match element {
        Some(element) => element.get(&rule.field).cloned(),
        None => ctx.resolve(&rule.field).cloned(),
      };
      // Field errors are keyed by canonical id so the originating UI field
      // is identified, not the alias it was configured with.
      let field_key = match element {
        Some(_) => rule.field.clone(),
        None => ctx.canonical_key(&rule.field),
      };

      match &rule.kind {
        AssertionKind::Equals { value } => {
          let expected = self.evaluator.eval(value, scope)?;
          if actual.as_ref() != Some(&expected) {
            record_error(
              errors,
              field_errors,
              &field_key,
              format!("'{}' must equal {expected}", rule.field),
            );
          }
        }
        AssertionKind::NotEmpty => {
          if is_empty(actual.as_ref()) {
            record_error(
              errors,
              field_errors,
              &field_key,
              format!("'{}' must not be empty", rule.field),
            );
          }
        }
        AssertionKind::Compare { op, value } => {
          let expected = self.evaluator.eval(value, scope)?;
          if !compare_holds(actual.as_ref(), *op, &expected) {
            record_error(
              errors,
              field_errors,
              &field_key,
              format!("'{}' must be {} {expected}", rule.field, compare_label(*op)),
            );
          }
        }
        AssertionKind::ForEach { rules } => match actual {
          Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
              let mut nested_errors = Vec::new();
              let mut nested_fields = HashMap::new();
              self.apply_rules(
                ctx,
                scope,
                rules,
                Some(item),
                &mut nested_errors,
                &mut nested_fields,
              )?;
              for error in nested_errors {
                errors.push(format!("{field_key}[{index}]: {error}"));
              }
              for (nested_key, messages) in nested_fields {
                field_errors
                  .entry(format!("{field_key}[{index}].{nested_key}"))
                  .or_default()
                  .extend(messages);
              }
            }
          }
          _ => {
            record_error(
              errors,
              field_errors,
              &field_key,
              format!("'{}' must be a list", rule.field),
            );
          }
        },
      }
    }

    Ok(())
  }

  async fn script(
    &self,
    node: &Node,
    ctx: &mut ExecutionContext,
    code: &str,
    input_keys: &[String],
    output_key: &str,
    timeout_ms: Option<u64>,
  ) -> Result<NodeOutcome, NodeError> {
    let mut data = HashMap::with_capacity(input_keys.len());
    for key in input_keys {
      let value = ctx.resolve(key).cloned().unwrap_or(Value::Null);
      data.insert(key.clone(), value);
    }

    let ordered: BTreeMap<String, Value> =
      data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let key = cache::script_key(&node.node_id, code, &ordered);
    if let Some(output) = ctx.cache.get_script(&key) {
      let output = output.clone();
      let mut outcome = NodeOutcome::executed().with_output(output_key, output);
      outcome.skip_reason = Some("cached".to_string());
      return Ok(outcome);
    }

    let timeout_ms = timeout_ms.unwrap_or(self.default_script_timeout_ms);
    let request = ScriptRequest {
      code: code.to_string(),
      input_keys: input_keys.to_vec(),
      data,
      alias_map: ctx.alias_map().cloned(),
      timeout_ms,
    };

    let started = Instant::now();
    let result = tokio::time::timeout(
      Duration::from_millis(timeout_ms),
      self.sandbox.execute(request),
    )
    .await;
    ctx.metrics.js_time_ms += started.elapsed().as_millis() as u64;

    let outcome = result.map_err(|_| NodeError::ScriptTimeout { timeout_ms })?;
    if !outcome.ok {
      return Err(NodeError::Script {
        message: outcome.error.unwrap_or_else(|| "script failed".to_string()),
      });
    }

    let output = outcome.output.unwrap_or(Value::Null);
    ctx.cache.insert_script(key, output.clone());
    Ok(NodeOutcome::executed().with_output(output_key, output))
  }

  fn conditional(
    &self,
    ctx: &ExecutionContext,
    expression: Option<&str>,
    output_key: Option<&str>,
  ) -> Result<NodeOutcome, NodeError> {
    let mut outcome = NodeOutcome::executed();
    if let Some(expression) = expression {
      let value = self.evaluator.eval(expression, &ctx.scope())?;
      if let Some(key) = output_key {
        outcome.outputs_delta.insert(key.to_string(), value);
      }
    }
    Ok(outcome)
  }
}

fn rows_to_value(rows: &[Row]) -> Value {
  Value::Array(rows.iter().map(row_to_value).collect())
}

/// Flatten a row for downstream expressions: column values at the top level,
/// `row_id` alongside them.
fn row_to_value(row: &Row) -> Value {
  let mut object = serde_json::Map::new();
  for (column, value) in &row.values {
    object.insert(column.clone(), value.clone());
  }
  object.insert("row_id".to_string(), json!(row.row_id));
  Value::Object(object)
}

fn record_error(
  errors: &mut Vec<String>,
  field_errors: &mut HashMap<String, Vec<String>>,
  field_key: &str,
  message: String,
) {
  errors.push(message.clone());
  field_errors
    .entry(field_key.to_string())
    .or_default()
    .push(message);
}

fn is_empty(value: Option<&Value>) -> bool {
  match value {
    None | Some(Value::Null) => true,
    Some(Value::String(s)) => s.is_empty(),
    Some(Value::Array(items)) => items.is_empty(),
    Some(Value::Object(object)) => object.is_empty(),
    Some(_) => false,
  }
}

fn compare_holds(actual: Option<&Value>, op: CompareOp, expected: &Value) -> bool {
  let ordering = match (actual, expected) {
    (Some(Value::Number(a)), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
      (Some(a), Some(b)) => a.partial_cmp(&b),
      _ => None,
    },
    (Some(Value::String(a)), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
    _ => None,
  };

  match ordering {
    Some(ordering) => match op {
      CompareOp::Gt => ordering.is_gt(),
      CompareOp::Gte => ordering.is_ge(),
      CompareOp::Lt => ordering.is_lt(),
      CompareOp::Lte => ordering.is_le(),
    },
    None => false,
  }
}

fn compare_label(op: CompareOp) -> &'static str {
  match op {
    CompareOp::Gt => ">",
    CompareOp::Gte => ">=",
    CompareOp::Lt => "<",
    CompareOp::Lte => "<=",
  }
}
