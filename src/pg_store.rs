//! PostgreSQL-backed [`TableStore`] implementation.
//!
//! Uses `ADD COLUMN IF NOT EXISTS` and a `JSONB` document column. Rows are
//! read back with every column cast to text.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use idx_sync_core::models::PATH_COLUMN;
use idx_sync_core::store::{ColumnKind, RowData, StoredRow, TableStore, UpsertRow};

use crate::sql::{self, Dialect};

/// PostgreSQL implementation of the [`TableStore`] trait.
pub struct PgTableStore {
    pool: PgPool,
}

impl PgTableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a `postgres://` URL.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TableStore for PgTableStore {
    fn backend(&self) -> &str {
        "postgres"
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        let stmt = sql::create_table(table);
        sqlx::query(&stmt).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_column(&self, table: &str, column: &str, kind: ColumnKind) -> Result<()> {
        let stmt = sql::add_column(Dialect::Postgres, table, column, kind);
        sqlx::query(&stmt).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, row: &UpsertRow) -> Result<()> {
        match &row.data {
            RowData::Columns(cells) => {
                let columns: Vec<String> = cells.iter().map(|(c, _)| c.clone()).collect();
                let stmt = sql::upsert_columns(Dialect::Postgres, &row.table, &columns);
                let mut query = sqlx::query(&stmt).bind(&row.path);
                for (_, value) in cells {
                    query = query.bind(value.as_deref());
                }
                query.execute(&self.pool).await?;
            }
            RowData::Document(doc) => {
                let stmt = sql::upsert_document(Dialect::Postgres, &row.table);
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
        let columns: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }

    async fn fetch_row(&self, table: &str, path: &str) -> Result<Option<StoredRow>> {
        let columns = self.table_columns(table).await?;
        if columns.is_empty() {
            anyhow::bail!("relation \"{}\" does not exist", table);
        }
        let stmt = sql::select_row(Dialect::Postgres, table, &columns);
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
