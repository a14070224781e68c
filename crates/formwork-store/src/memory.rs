//! In-memory row repository.
//!
//! Backs the CLI, preview tooling and the engine test suite. Each repository
//! method tracks how often it was called so callers can assert exactly when
//! the durable store was touched.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::types::{Filter, Row, RowValues};
use crate::{Error, RowRepository};

/// In-memory [`RowRepository`] implementation.
pub struct MemoryRowRepository {
  tables: RwLock<HashMap<String, Vec<Row>>>,
  read_calls: AtomicUsize,
  create_calls: AtomicUsize,
  update_calls: AtomicUsize,
  delete_calls: AtomicUsize,
}

impl MemoryRowRepository {
  pub fn new() -> Self {
    Self {
      tables: RwLock::new(HashMap::new()),
      read_calls: AtomicUsize::new(0),
      create_calls: AtomicUsize::new(0),
      update_calls: AtomicUsize::new(0),
      delete_calls: AtomicUsize::new(0),
    }
  }

  /// Seed a table with rows, generating row ids.
  pub fn seed_table(&self, table_id: &str, rows: Vec<RowValues>) {
    let mut tables = self.tables.write().unwrap();
    let table = tables.entry(table_id.to_string()).or_default();
    for values in rows {
      table.push(Row {
        row_id: uuid::Uuid::new_v4().to_string(),
        table_id: table_id.to_string(),
        values,
      });
    }
  }

  /// Snapshot of a table's rows, for assertions and seed inspection.
  pub fn rows(&self, table_id: &str) -> Vec<Row> {
    let tables = self.tables.read().unwrap();
    tables.get(table_id).cloned().unwrap_or_default()
  }

  pub fn read_calls(&self) -> usize {
    self.read_calls.load(Ordering::SeqCst)
  }

  pub fn create_calls(&self) -> usize {
    self.create_calls.load(Ordering::SeqCst)
  }

  pub fn update_calls(&self) -> usize {
    self.update_calls.load(Ordering::SeqCst)
  }

  pub fn delete_calls(&self) -> usize {
    self.delete_calls.load(Ordering::SeqCst)
  }

  /// Total calls to the three write methods.
  pub fn write_calls(&self) -> usize {
    self.create_calls() + self.update_calls() + self.delete_calls()
  }
}

impl Default for MemoryRowRepository {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl RowRepository for MemoryRowRepository {
  async fn get_rows_with_values(
    &self,
    table_id: &str,
    filters: &[Filter],
    limit: Option<usize>,
  ) -> Result<Vec<Row>, Error> {
    self.read_calls.fetch_add(1, Ordering::SeqCst);

    let tables = self.tables.read().unwrap();
    let mut rows: Vec<Row> = tables
      .get(table_id)
      .map(|table| {
        table
          .iter()
          .filter(|row| filters.iter().all(|f| f.matches(row)))
          .cloned()
          .collect()
      })
      .unwrap_or_default();

    if let Some(limit) = limit {
      rows.truncate(limit);
    }

    Ok(rows)
  }

  async fn create_row_with_values(
    &self,
    table_id: &str,
    values: RowValues,
  ) -> Result<Row, Error> {
    self.create_calls.fetch_add(1, Ordering::SeqCst);

    let row = Row {
      row_id: uuid::Uuid::new_v4().to_string(),
      table_id: table_id.to_string(),
      values,
    };

    let mut tables = self.tables.write().unwrap();
    tables
      .entry(table_id.to_string())
      .or_default()
      .push(row.clone());

    Ok(row)
  }

  async fn update_row_values(&self, row_id: &str, values: RowValues) -> Result<Row, Error> {
    self.update_calls.fetch_add(1, Ordering::SeqCst);

    let mut tables = self.tables.write().unwrap();
    for table in tables.values_mut() {
      if let Some(row) = table.iter_mut().find(|row| row.row_id == row_id) {
        row.values.extend(values);
        return Ok(row.clone());
      }
    }

    Err(Error::RowNotFound(row_id.to_string()))
  }

  async fn delete_row(&self, row_id: &str) -> Result<(), Error> {
    self.delete_calls.fetch_add(1, Ordering::SeqCst);

    let mut tables = self.tables.write().unwrap();
    for table in tables.values_mut() {
      if let Some(index) = table.iter().position(|row| row.row_id == row_id) {
        table.remove(index);
        return Ok(());
      }
    }

    Err(Error::RowNotFound(row_id.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::FilterOp;
  use serde_json::json;

  fn values(pairs: &[(&str, serde_json::Value)]) -> RowValues {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  #[tokio::test]
  async fn test_query_with_filters_and_limit() {
    let repo = MemoryRowRepository::new();
    repo.seed_table(
      "t1",
      vec![
        values(&[("name", json!("a")), ("age", json!(10))]),
        values(&[("name", json!("b")), ("age", json!(20))]),
        values(&[("name", json!("c")), ("age", json!(30))]),
      ],
    );

    let filters = vec![Filter {
      column: "age".to_string(),
      op: FilterOp::Gte,
      value: json!(20),
    }];

    let rows = repo
      .get_rows_with_values("t1", &filters, None)
      .await
      .unwrap();
    assert_eq!(rows.len(), 2);

    let rows = repo
      .get_rows_with_values("t1", &filters, Some(1))
      .await
      .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(repo.read_calls(), 2);
  }

  #[tokio::test]
  async fn test_unknown_table_reads_empty() {
    let repo = MemoryRowRepository::new();
    let rows = repo.get_rows_with_values("nope", &[], None).await.unwrap();
    assert!(rows.is_empty());
  }

  #[tokio::test]
  async fn test_create_update_delete_round_trip() {
    let repo = MemoryRowRepository::new();

    let row = repo
      .create_row_with_values("t1", values(&[("name", json!("a"))]))
      .await
      .unwrap();

    let updated = repo
      .update_row_values(&row.row_id, values(&[("name", json!("b"))]))
      .await
      .unwrap();
    assert_eq!(updated.values["name"], json!("b"));

    repo.delete_row(&row.row_id).await.unwrap();
    assert!(repo.rows("t1").is_empty());

    assert_eq!(repo.create_calls(), 1);
    assert_eq!(repo.update_calls(), 1);
    assert_eq!(repo.delete_calls(), 1);
    assert_eq!(repo.write_calls(), 3);
  }

  #[tokio::test]
  async fn test_update_missing_row_fails() {
    let repo = MemoryRowRepository::new();
    let result = repo.update_row_values("missing", RowValues::new()).await;
    assert!(matches!(result, Err(Error::RowNotFound(_))));
  }
}
