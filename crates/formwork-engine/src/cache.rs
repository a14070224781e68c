//! Per-run result caches and key derivation.
//!
//! The cache and the idempotency ledger live on the run's
//! `ExecutionContext`, so two invocations of the runner never share state:
//! deduplication only happens within a single traversal. Keys are derived
//! from resolved values; the evaluator is deterministic, so identical inputs
//! always produce identical keys.

use std::collections::{BTreeMap, HashMap};

use formwork_graph::WriteOperation;
use formwork_store::{Filter, Row, RowValues};
use serde_json::Value;

/// Memoized node outputs for one run.
#[derive(Debug, Default)]
pub struct RunCache {
  queries: HashMap<String, Vec<Row>>,
  scripts: HashMap<String, Value>,
}

impl RunCache {
  pub fn get_query(&self, key: &str) -> Option<&Vec<Row>> {
    self.queries.get(key)
  }

  pub fn insert_query(&mut self, key: String, rows: Vec<Row>) {
    self.queries.insert(key, rows);
  }

  pub fn get_script(&self, key: &str) -> Option<&Value> {
    self.scripts.get(key)
  }

  pub fn insert_script(&mut self, key: String, output: Value) {
    self.scripts.insert(key, output);
  }
}

/// Cache key for a query node: table + resolved filter values + limit.
pub fn query_key(table_id: &str, filters: &[Filter], limit: Option<usize>) -> String {
  let filters = serde_json::to_string(filters).unwrap_or_default();
  let limit = limit.map(|l| l.to_string()).unwrap_or_default();
  format!("{table_id}|{filters}|{limit}")
}

/// Cache key for a script node: node id + code + resolved inputs.
pub fn script_key(node_id: &str, code: &str, data: &BTreeMap<String, Value>) -> String {
  let data = serde_json::to_string(data).unwrap_or_default();
  format!("{node_id}|{code}|{data}")
}

/// Idempotency key for a write node: node id + operation + resolved values,
/// plus the resolved target row id for update/delete.
pub fn side_effect_key(
  node_id: &str,
  operation: WriteOperation,
  row_id: Option<&str>,
  values: &RowValues,
) -> String {
  let operation = serde_json::to_string(&operation).unwrap_or_default();
  let values = serde_json::to_string(values).unwrap_or_default();
  format!("{node_id}|{operation}|{}|{values}", row_id.unwrap_or(""))
}
