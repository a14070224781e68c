//! Preview-mode shadow writes.
//!
//! In preview runs, write nodes never reach the repository; their effects
//! are held in this overlay and consulted by later query nodes in the same
//! run. The overlay is never merged into the real store - it is dropped with
//! the run's `ExecutionContext`.

use std::collections::{HashMap, HashSet};

use formwork_store::{Filter, Row, RowValues};

/// In-memory overlay of rows created, updated and deleted during one run.
#[derive(Debug, Default)]
pub struct ShadowStore {
  /// Rows created this run, per table id.
  created: HashMap<String, Vec<Row>>,
  /// Value overrides for repository rows, per row id.
  updated: HashMap<String, RowValues>,
  /// Rows deleted this run.
  deleted: HashSet<String>,
}

impl ShadowStore {
  pub fn record_create(&mut self, row: Row) {
    self.created.entry(row.table_id.clone()).or_default().push(row);
  }

  /// Updates to a row created earlier in this run fold into the created
  /// copy; anything else is an override on top of the repository row.
  pub fn record_update(&mut self, row_id: &str, values: &RowValues) {
    for rows in self.created.values_mut() {
      if let Some(row) = rows.iter_mut().find(|row| row.row_id == row_id) {
        row.values.extend(values.clone());
        return;
      }
    }
    self
      .updated
      .entry(row_id.to_string())
      .or_default()
      .extend(values.clone());
  }

  pub fn record_delete(&mut self, row_id: &str) {
    for rows in self.created.values_mut() {
      rows.retain(|row| row.row_id != row_id);
    }
    self.updated.remove(row_id);
    self.deleted.insert(row_id.to_string());
  }

  /// Rows written earlier in this run that match `filters`.
  pub fn matching(&self, table_id: &str, filters: &[Filter], limit: Option<usize>) -> Vec<Row> {
    let mut rows: Vec<Row> = self
      .created
      .get(table_id)
      .into_iter()
      .flatten()
      .filter(|row| filters.iter().all(|f| f.matches(row)))
      .cloned()
      .collect();

    if let Some(limit) = limit {
      rows.truncate(limit);
    }
    rows
  }

  /// Overlay this run's uncommitted updates and deletes onto rows fetched
  /// from the repository.
  pub fn overlay(&self, rows: Vec<Row>) -> Vec<Row> {
    rows
      .into_iter()
      .filter(|row| !self.deleted.contains(&row.row_id))
      .map(|mut row| {
        if let Some(values) = self.updated.get(&row.row_id) {
          row.values.extend(values.clone());
        }
        row
      })
      .collect()
  }
}
