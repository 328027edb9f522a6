//! In-memory record of every table seen during a run.
//!
//! The cache starts empty for every run and is never persisted. It does
//! not lock anything itself: callers that mutate it from concurrent tasks
//! must serialize those mutations per table.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::models::TableSchema;

#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    tables: HashMap<String, TableSchema>,
}

impl SchemaCache {
    /// An empty cache. Nothing is loaded from the destination's catalog.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    /// Record a table the first time it is seen.
    ///
    /// An already registered table keeps its existing schema; returns
    /// `false` in that case.
    pub fn register(&mut self, schema: TableSchema) -> bool {
        if self.tables.contains_key(schema.name()) {
            return false;
        }
        self.tables.insert(schema.name().to_string(), schema);
        true
    }

    /// Append a column to a registered table. Adding a known column is a no-op.
    pub fn add_column(&mut self, table: &str, column: &str) -> Result<bool> {
        match self.tables.get_mut(table) {
            Some(schema) => Ok(schema.add_column(column)),
            None => bail!("table '{}' is not registered", table),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}
