//! Insert-or-update of one document's entries into one table.
//!
//! Columnar mode writes one value per known column, ordered by the table's
//! column sequence; on a `path` conflict every supplied column is
//! overwritten. Columns the entries do not mention are written as NULL, so
//! a rewrite never keeps values from an earlier version of the document.
//!
//! JSON mode serializes the full entries object once and replaces the
//! `entries` column wholesale on conflict.

use std::sync::Arc;

use tracing::debug;

use idx_sync_core::models::{encode_column_value, Entries, NullPolicy, StorageMode, TableSchema};
use idx_sync_core::store::{RowData, TableStore, UpsertRow};

use crate::error::SyncError;

pub struct UpsertEngine {
    store: Arc<dyn TableStore>,
    mode: StorageMode,
    null_policy: NullPolicy,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn TableStore>, mode: StorageMode, null_policy: NullPolicy) -> Self {
        Self {
            store,
            mode,
            null_policy,
        }
    }

    /// Build the row for `path` against the table's current schema.
    pub fn build_row(
        &self,
        schema: &TableSchema,
        path: &str,
        entries: &Entries,
    ) -> Result<UpsertRow, SyncError> {
        let data = match self.mode {
            StorageMode::Columnar => RowData::Columns(
                schema
                    .value_columns()
                    .iter()
                    .map(|column| {
                        (
                            column.clone(),
                            encode_column_value(entries.get(column), self.null_policy),
                        )
                    })
                    .collect(),
            ),
            StorageMode::Json => {
                let doc = serde_json::to_string(entries).map_err(|e| SyncError::Upsert {
                    table: schema.name().to_string(),
                    path: path.to_string(),
                    cause: e.into(),
                })?;
                RowData::Document(doc)
            }
        };

        Ok(UpsertRow {
            table: schema.name().to_string(),
            path: path.to_string(),
            data,
        })
    }

    pub async fn upsert(
        &self,
        schema: &TableSchema,
        path: &str,
        entries: &Entries,
    ) -> Result<(), SyncError> {
        let row = self.build_row(schema, path, entries)?;
        debug!(table = schema.name(), path, "upserting row");
        self.store
            .upsert(&row)
            .await
            .map_err(|cause| SyncError::Upsert {
                table: schema.name().to_string(),
                path: path.to_string(),
                cause,
            })
    }
}
