use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column values for one row, keyed by column id.
///
/// Ordered map: serializing the same values always yields the same bytes,
/// which cache keys and idempotency keys depend on.
pub type RowValues = BTreeMap<String, Value>;

/// A single row in a tabular-store table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
  pub row_id: String,
  pub table_id: String,
  pub values: RowValues,
}

/// Comparison operator for a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
  #[default]
  Eq,
  Ne,
  Gt,
  Gte,
  Lt,
  Lte,
  Contains,
}

/// A resolved query filter. The `value` is a concrete JSON value; expression
/// resolution happens before a filter reaches the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
  pub column: String,
  #[serde(default)]
  pub op: FilterOp,
  pub value: Value,
}

impl Filter {
  /// Whether `row` satisfies this filter. A missing column only matches
  /// `eq null` / `ne <value>`.
  pub fn matches(&self, row: &Row) -> bool {
    let actual = row.values.get(&self.column);
    match self.op {
      FilterOp::Eq => is_equal(actual, &self.value),
      FilterOp::Ne => !is_equal(actual, &self.value),
      FilterOp::Gt => compare(actual, &self.value).is_some_and(|o| o == Ordering::Greater),
      FilterOp::Gte => compare(actual, &self.value).is_some_and(|o| o != Ordering::Less),
      FilterOp::Lt => compare(actual, &self.value).is_some_and(|o| o == Ordering::Less),
      FilterOp::Lte => compare(actual, &self.value).is_some_and(|o| o != Ordering::Greater),
      FilterOp::Contains => contains(actual, &self.value),
    }
  }
}

fn is_equal(actual: Option<&Value>, expected: &Value) -> bool {
  match actual {
    Some(value) => value == expected,
    None => expected.is_null(),
  }
}

/// Numeric and string ordering; mixed or non-orderable types do not compare.
fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
  match (actual?, expected) {
    (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
    _ => None,
  }
}

fn contains(actual: Option<&Value>, needle: &Value) -> bool {
  match (actual, needle) {
    (Some(Value::String(haystack)), Value::String(needle)) => haystack.contains(needle.as_str()),
    (Some(Value::Array(items)), needle) => items.contains(needle),
    _ => false,
  }
}
