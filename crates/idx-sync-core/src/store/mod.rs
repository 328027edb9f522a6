//! Storage abstraction for idx-sync.
//!
//! The [`TableStore`] trait is the only way the synchronizer and the upsert
//! engine touch the destination. Every operation is idempotent at the store
//! level: tables and columns are created only if absent, and rows are
//! inserted or overwritten by `path`.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Type of a dynamically added column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Text column holding one JSON-encoded entry value.
    Text,
    /// JSON document column holding the whole entries object.
    Document,
}

/// Values for one row write.
#[derive(Debug, Clone, PartialEq)]
pub enum RowData {
    /// `(column, value)` pairs in table column order, excluding `path`.
    /// `None` is written as SQL NULL.
    Columns(Vec<(String, Option<String>)>),
    /// Serialized entries object for the `entries` column.
    Document(String),
}

/// A complete insert-or-update keyed by `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRow {
    pub table: String,
    pub path: String,
    pub data: RowData,
}

/// A row read back from the store, every cell as text.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub path: String,
    pub cells: Vec<(String, Option<String>)>,
}

impl StoredRow {
    /// Value of `column`; `None` both for NULL and for unknown columns.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.cells.iter().any(|(name, _)| name == column)
    }
}

/// Abstract destination for schema-on-write synchronization.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_table`](TableStore::create_table) | Create `table (path text primary key)` if absent |
/// | [`add_column`](TableStore::add_column) | Add a text or document column if absent |
/// | [`upsert`](TableStore::upsert) | Insert a row or overwrite every supplied column on `path` conflict |
/// | [`table_columns`](TableStore::table_columns) | Column names from the store's own catalog |
/// | [`fetch_row`](TableStore::fetch_row) | Read one row back by `path` |
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Short backend name for logs (`"sqlite"`, `"postgres"`, `"memory"`).
    fn backend(&self) -> &str;

    async fn create_table(&self, table: &str) -> Result<()>;

    async fn add_column(&self, table: &str, column: &str, kind: ColumnKind) -> Result<()>;

    async fn upsert(&self, row: &UpsertRow) -> Result<()>;

    /// Columns in definition order; empty when the table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    async fn fetch_row(&self, table: &str, path: &str) -> Result<Option<StoredRow>>;

    /// Number of rows in `table`.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Release connections. Default is a no-op.
    async fn close(&self) {}
}
