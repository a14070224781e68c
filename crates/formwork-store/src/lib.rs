//! Formwork row store contract.
//!
//! The execution engine consumes the tabular data store exclusively through
//! the [`RowRepository`] trait - a narrow read/write/query surface keyed by
//! table id. Column management, schema migrations and persistence are the
//! store's own concern and live outside this workspace.
//!
//! [`MemoryRowRepository`] is the in-memory implementation backing the CLI,
//! preview tooling and the engine test suite.

mod memory;
mod types;

pub use memory::MemoryRowRepository;
pub use types::{Filter, FilterOp, Row, RowValues};

use async_trait::async_trait;

/// Error type for repository operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested row was not found.
  #[error("row '{0}' not found")]
  RowNotFound(String),

  /// A storage backend error occurred.
  #[error("storage backend error: {0}")]
  Backend(String),
}

/// Narrow contract over the tabular data store.
///
/// The engine never bypasses this interface to touch storage directly.
#[async_trait]
pub trait RowRepository: Send + Sync {
  /// Query rows from a table. All filters must match; `limit` caps the
  /// result length.
  async fn get_rows_with_values(
    &self,
    table_id: &str,
    filters: &[Filter],
    limit: Option<usize>,
  ) -> Result<Vec<Row>, Error>;

  /// Create a row with the given column values.
  async fn create_row_with_values(
    &self,
    table_id: &str,
    values: RowValues,
  ) -> Result<Row, Error>;

  /// Merge new column values into an existing row.
  async fn update_row_values(&self, row_id: &str, values: RowValues) -> Result<Row, Error>;

  /// Delete a row by id.
  async fn delete_row(&self, row_id: &str) -> Result<(), Error>;
}
