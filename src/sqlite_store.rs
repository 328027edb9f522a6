//! SQLite-backed [`TableStore`] implementation.
//!
//! SQLite has no `ADD COLUMN IF NOT EXISTS`, so column creation checks
//! `pragma_table_info` first and treats a duplicate-column error from a
//! concurrent writer as success. Document columns are plain `TEXT`.
//!
//! SQLite column names are case-insensitive: a column that differs from an
//! existing one only by case is rejected instead of being merged into it.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use idx_sync_core::models::PATH_COLUMN;
use idx_sync_core::store::{ColumnKind, RowData, StoredRow, TableStore, UpsertRow};

use crate::sql::{self, Dialect};

/// SQLite implementation of the [`TableStore`] trait.
pub struct SqliteTableStore {
    pool: SqlitePool,
}

impl SqliteTableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at a `sqlite:` URL.
    ///
    /// - Creates parent directories of the database file.
    /// - Enables WAL journal mode for concurrent read/write.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let filename = options.get_filename();
        if filename != Path::new(":memory:") {
            if let Some(parent) = filename.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Name of the column SQLite resolves `column` to, if any.
    async fn existing_column(&self, table: &str, column: &str) -> Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar(
            "SELECT name FROM pragma_table_info(?) WHERE name = ? COLLATE NOCASE",
        )
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }

    /// `Ok(true)` when `column` exists with this exact spelling.
    async fn check_column(&self, table: &str, column: &str) -> Result<bool> {
        match self.existing_column(table, column).await? {
            Some(name) if name == column => Ok(true),
            Some(name) => bail!(
                "column '{}' differs only in case from existing column '{}' in '{}'",
                column,
                name,
                table
            ),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        let stmt = sql::create_table(table);
        sqlx::query(&stmt).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_column(&self, table: &str, column: &str, kind: ColumnKind) -> Result<()> {
        if self.check_column(table, column).await? {
            return Ok(());
        }
        let stmt = sql::add_column(Dialect::Sqlite, table, column, kind);
        match sqlx::query(&stmt).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("duplicate column name") => {
                // Added by another writer since the check.
                if self.check_column(table, column).await? {
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, row: &UpsertRow) -> Result<()> {
        match &row.data {
            RowData::Columns(cells) => {
                let columns: Vec<String> = cells.iter().map(|(c, _)| c.clone()).collect();
                let stmt = sql::upsert_columns(Dialect::Sqlite, &row.table, &columns);
                let mut query = sqlx::query(&stmt).bind(&row.path);
                for (_, value) in cells {
                    query = query.bind(value.as_deref());
                }
                query.execute(&self.pool).await?;
            }
            RowData::Document(doc) => {
                let stmt = sql::upsert_document(Dialect::Sqlite, &row.table);
                sqlx::query(&stmt)
                    .bind(&row.path)
                    .bind(doc)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(table)
                .fetch_all(&self.pool)
                .await?;
        Ok(columns)
    }

    async fn fetch_row(&self, table: &str, path: &str) -> Result<Option<StoredRow>> {
        let columns = self.table_columns(table).await?;
        if columns.is_empty() {
            anyhow::bail!("no such table: {}", table);
        }
        let stmt = sql::select_row(Dialect::Sqlite, table, &columns);
        let row = sqlx::query(&stmt)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let mut cells = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if column == PATH_COLUMN {
                continue;
            }
            let value: Option<String> = row.try_get(i)?;
            cells.push((column.clone(), value));
        }

        Ok(Some(StoredRow {
            path: path.to_string(),
            cells,
        }))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let stmt = sql::count_rows(table);
        let count: i64 = sqlx::query_scalar(&stmt).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> SqliteTableStore {
        let url = format!("sqlite:{}", tmp.path().join("idx.sqlite").display());
        SqliteTableStore::connect(&url, 2).await.unwrap()
    }

    #[tokio::test]
    async fn add_column_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store.create_table("basic").await.unwrap();
        store.add_column("basic", "title", ColumnKind::Text).await.unwrap();
        store.add_column("basic", "title", ColumnKind::Text).await.unwrap();
        assert_eq!(store.table_columns("basic").await.unwrap(), vec!["path", "title"]);
    }

    #[tokio::test]
    async fn case_only_duplicate_column_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store.create_table("basic").await.unwrap();
        store.add_column("basic", "title", ColumnKind::Text).await.unwrap();

        let err = store
            .add_column("basic", "Title", ColumnKind::Text)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("differs only in case"));
        assert_eq!(store.table_columns("basic").await.unwrap(), vec!["path", "title"]);
    }
}
