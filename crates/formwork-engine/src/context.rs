//! Per-run execution state.

use std::collections::{HashMap, HashSet};

use formwork_expr::{resolve_var, scope_with_aliases};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::RunCache;
use crate::shadow::ShadowStore;

/// How a run treats side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
  /// Side effects are applied to the repository as nodes execute.
  Live,
  /// Side effects are held in the shadow overlay and discarded with the run.
  Preview,
}

/// Observability counters for one run. Not correctness-critical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
  pub db_time_ms: u64,
  pub js_time_ms: u64,
  pub query_count: u64,
}

/// Mutable state for a single run invocation.
///
/// Created fresh at the top of `GraphRunner::run` and dropped when it
/// returns. Cache and ledger state never survives across invocations: two
/// separate runs against the same node and input both execute.
pub struct ExecutionContext {
  /// Resolved variable values, keyed by canonical id.
  pub vars: HashMap<String, Value>,
  /// The run's input payload, read by input nodes.
  pub input: Value,
  mode: ExecutionMode,
  alias_map: Option<HashMap<String, String>>,
  pub cache: RunCache,
  /// Idempotency ledger: side-effect keys already applied this run.
  pub executed_side_effects: HashSet<String>,
  pub shadow: ShadowStore,
  pub metrics: RunMetrics,
}

impl ExecutionContext {
  pub fn new(
    mode: ExecutionMode,
    input: Value,
    alias_map: Option<HashMap<String, String>>,
  ) -> Self {
    Self {
      vars: HashMap::new(),
      input,
      mode,
      alias_map,
      cache: RunCache::default(),
      executed_side_effects: HashSet::new(),
      shadow: ShadowStore::default(),
      metrics: RunMetrics::default(),
    }
  }

  /// The run's execution mode. Set once at construction; nothing mutates it
  /// mid-run.
  pub fn mode(&self) -> ExecutionMode {
    self.mode
  }

  pub fn alias_map(&self) -> Option<&HashMap<String, String>> {
    self.alias_map.as_ref()
  }

  /// Two-tier variable lookup: canonical id, then alias redirect. A missing
  /// alias resolves to `None`, never an error.
  pub fn resolve(&self, key: &str) -> Option<&Value> {
    resolve_var(key, &self.vars, self.alias_map.as_ref())
  }

  /// Canonical id for a field key: identity for keys that already are
  /// canonical, alias-map redirect otherwise.
  pub fn canonical_key(&self, key: &str) -> String {
    if self.vars.contains_key(key) {
      return key.to_string();
    }
    self
      .alias_map
      .as_ref()
      .and_then(|aliases| aliases.get(key))
      .cloned()
      .unwrap_or_else(|| key.to_string())
  }

  /// Expression scope: every variable plus alias overlays.
  pub fn scope(&self) -> HashMap<String, Value> {
    scope_with_aliases(&self.vars, self.alias_map.as_ref())
  }

  /// Merge a node's outputs into the run variables.
  pub fn merge_outputs(&mut self, delta: &HashMap<String, Value>) {
    for (key, value) in delta {
      self.vars.insert(key.clone(), value.clone());
    }
  }
}
