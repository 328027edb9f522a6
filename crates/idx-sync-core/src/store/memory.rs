//! In-memory [`TableStore`] implementation for testing.
//!
//! Behaves like a relational store for the operations idx-sync needs:
//! writes against a missing table or column fail, DDL is create-if-absent.
//! Individual columns can be made to fail on creation to exercise the
//! schema failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::PATH_COLUMN;

use super::{ColumnKind, RowData, StoredRow, TableStore, UpsertRow};

struct MemTable {
    columns: Vec<(String, ColumnKind)>,
    rows: HashMap<String, HashMap<String, Option<String>>>,
}

impl MemTable {
    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|(c, _)| c == column)
    }
}

/// In-memory store for unit and pipeline tests.
pub struct InMemoryTableStore {
    tables: RwLock<HashMap<String, MemTable>>,
    failing_columns: RwLock<HashSet<String>>,
    ddl_statements: RwLock<Vec<String>>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            failing_columns: RwLock::new(HashSet::new()),
            ddl_statements: RwLock::new(Vec::new()),
        }
    }

    /// Make every later `add_column` for `column` fail.
    pub fn fail_column(&self, column: &str) {
        self.failing_columns
            .write()
            .unwrap()
            .insert(column.to_string());
    }

    /// Every DDL operation issued so far, as `create <table>` or
    /// `add <table>.<column>`.
    pub fn ddl_log(&self) -> Vec<String> {
        self.ddl_statements.read().unwrap().clone()
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        self.ddl_statements
            .write()
            .unwrap()
            .push(format!("create {}", table));
        let mut tables = self.tables.write().unwrap();
        tables.entry(table.to_string()).or_insert_with(|| MemTable {
            columns: vec![(PATH_COLUMN.to_string(), ColumnKind::Text)],
            rows: HashMap::new(),
        });
        Ok(())
    }

    async fn add_column(&self, table: &str, column: &str, kind: ColumnKind) -> Result<()> {
        self.ddl_statements
            .write()
            .unwrap()
            .push(format!("add {}.{}", table, column));
        if self.failing_columns.read().unwrap().contains(column) {
            bail!("injected failure adding column '{}' to '{}'", column, table);
        }
        let mut tables = self.tables.write().unwrap();
        let t = match tables.get_mut(table) {
            Some(t) => t,
            None => bail!("relation \"{}\" does not exist", table),
        };
        if !t.has_column(column) {
            t.columns.push((column.to_string(), kind));
        }
        Ok(())
    }

    async fn upsert(&self, row: &UpsertRow) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        let t = match tables.get_mut(&row.table) {
            Some(t) => t,
            None => bail!("relation \"{}\" does not exist", row.table),
        };

        let cells: Vec<(String, Option<String>)> = match &row.data {
            RowData::Columns(cells) => cells.clone(),
            RowData::Document(doc) => {
                vec![(crate::models::DOCUMENT_COLUMN.to_string(), Some(doc.clone()))]
            }
        };
        for (column, _) in &cells {
            if !t.has_column(column) {
                bail!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    column,
                    row.table
                );
            }
        }

        let stored = t.rows.entry(row.path.clone()).or_default();
        for (column, value) in cells {
            stored.insert(column, value);
        }
        Ok(())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .get(table)
            .map(|t| t.columns.iter().map(|(c, _)| c.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_row(&self, table: &str, path: &str) -> Result<Option<StoredRow>> {
        let tables = self.tables.read().unwrap();
        let t = match tables.get(table) {
            Some(t) => t,
            None => bail!("relation \"{}\" does not exist", table),
        };
        Ok(t.rows.get(path).map(|stored| StoredRow {
            path: path.to_string(),
            cells: t
                .columns
                .iter()
                .filter(|(c, _)| c != PATH_COLUMN)
                .map(|(c, _)| (c.clone(), stored.get(c).cloned().flatten()))
                .collect(),
        }))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let tables = self.tables.read().unwrap();
        Ok(tables.get(table).map(|t| t.rows.len() as i64).unwrap_or(0))
    }
}
