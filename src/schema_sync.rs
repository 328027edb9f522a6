//! Schema-on-write synchronization.
//!
//! [`SchemaSynchronizer`] makes sure a destination table exists and has a
//! column for every entry field (columnar mode) or the single `entries`
//! document column (JSON mode) before a row is written.
//!
//! Schema mutation is serialized per table name: all work for one table
//! runs under that table's async mutex, so concurrent first sight of the
//! same table or column issues its DDL once and appends to the cached
//! column list once. Different tables never wait on each other. A table or
//! column enters the [`SchemaCache`] only after its statement succeeded.
//!
//! Failures are returned in both storage modes; callers skip the dependent
//! upsert.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use idx_sync_core::models::{Entries, StorageMode, TableSchema, DOCUMENT_COLUMN};
use idx_sync_core::schema::SchemaCache;
use idx_sync_core::store::{ColumnKind, TableStore};

use crate::error::SyncError;
use crate::sql::validate_identifier;

pub struct SchemaSynchronizer {
    store: Arc<dyn TableStore>,
    mode: StorageMode,
    cache: RwLock<SchemaCache>,
    table_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaSynchronizer {
    /// Build a synchronizer over `cache`.
    ///
    /// Runs start with [`SchemaCache::new`]: the cache is never bootstrapped
    /// from the store's catalog. Creation is if-absent, so a cold cache
    /// against an existing table only costs redundant DDL.
    pub fn new(store: Arc<dyn TableStore>, mode: StorageMode, cache: SchemaCache) -> Self {
        Self {
            store,
            mode,
            cache: RwLock::new(cache),
            table_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    async fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.table_locks.lock().await;
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create `table (path text primary key)` the first time it is seen.
    pub async fn ensure_table(&self, table: &str) -> Result<(), SyncError> {
        validate_identifier(table)?;

        if self.cache.read().await.has(table) {
            return Ok(());
        }

        let lock = self.table_lock(table).await;
        let _guard = lock.lock().await;

        // Another task may have created it while we waited.
        if self.cache.read().await.has(table) {
            return Ok(());
        }

        debug!(table, "creating table");
        self.store
            .create_table(table)
            .await
            .map_err(|cause| SyncError::SchemaSync {
                table: table.to_string(),
                cause,
            })?;

        self.cache
            .write()
            .await
            .register(TableSchema::new(table, self.mode));
        info!(table, mode = self.mode.as_str(), "table ready");
        Ok(())
    }

    /// Add whatever columns `entries` needs and return the table's schema.
    ///
    /// Columnar mode adds one text column per unseen entry key, in entry
    /// order. JSON mode adds the `entries` document column once. Columns
    /// added before a failure stay registered.
    pub async fn ensure_columns(
        &self,
        table: &str,
        entries: &Entries,
    ) -> Result<TableSchema, SyncError> {
        let lock = self.table_lock(table).await;
        let _guard = lock.lock().await;

        let schema = self.schema(table).await.ok_or_else(|| SyncError::SchemaSync {
            table: table.to_string(),
            cause: anyhow::anyhow!("table was not ensured before its columns"),
        })?;

        let (missing, kind): (Vec<String>, ColumnKind) = match self.mode {
            StorageMode::Json => {
                let missing = if schema.has_column(DOCUMENT_COLUMN) {
                    Vec::new()
                } else {
                    vec![DOCUMENT_COLUMN.to_string()]
                };
                (missing, ColumnKind::Document)
            }
            StorageMode::Columnar => (
                schema
                    .missing_columns(entries)
                    .into_iter()
                    .map(String::from)
                    .collect(),
                ColumnKind::Text,
            ),
        };

        if missing.is_empty() {
            return Ok(schema);
        }

        for column in &missing {
            validate_identifier(column)?;
        }

        for column in &missing {
            debug!(table, column = %column, "adding column");
            if let Err(cause) = self.store.add_column(table, column, kind).await {
                warn!(table, column = %column, error = %cause, "add column failed");
                return Err(SyncError::SchemaSync {
                    table: table.to_string(),
                    cause: cause.context(format!("adding column '{}'", column)),
                });
            }
            self.cache
                .write()
                .await
                .add_column(table, column)
                .map_err(|cause| SyncError::SchemaSync {
                    table: table.to_string(),
                    cause,
                })?;
        }

        self.schema(table).await.ok_or_else(|| SyncError::SchemaSync {
            table: table.to_string(),
            cause: anyhow::anyhow!("table vanished from schema cache"),
        })
    }

    /// Current cached schema for `table`.
    pub async fn schema(&self, table: &str) -> Option<TableSchema> {
        self.cache.read().await.get(table).cloned()
    }

    /// Copy of the whole cache, for summaries and tests.
    pub async fn snapshot(&self) -> SchemaCache {
        self.cache.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idx_sync_core::store::memory::InMemoryTableStore;
    use serde_json::json;

    fn entries(v: serde_json::Value) -> Entries {
        v.as_object().cloned().unwrap()
    }

    fn synchronizer(mode: StorageMode) -> (Arc<InMemoryTableStore>, SchemaSynchronizer) {
        let store = Arc::new(InMemoryTableStore::new());
        let sync = SchemaSynchronizer::new(store.clone(), mode, SchemaCache::new());
        (store, sync)
    }

    #[tokio::test]
    async fn ensure_table_creates_once() {
        let (store, sync) = synchronizer(StorageMode::Columnar);
        sync.ensure_table("basic").await.unwrap();
        sync.ensure_table("basic").await.unwrap();
        assert_eq!(store.ddl_log(), vec!["create basic"]);
        assert_eq!(sync.schema("basic").await.unwrap().columns(), &["path"]);
    }

    #[tokio::test]
    async fn ensure_table_rejects_bad_identifier() {
        let (store, sync) = synchronizer(StorageMode::Columnar);
        let err = sync.ensure_table("").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidIdentifier { .. }));
        assert!(store.ddl_log().is_empty());
    }

    #[tokio::test]
    async fn columnar_union_keeps_first_seen_order() {
        let (store, sync) = synchronizer(StorageMode::Columnar);
        sync.ensure_table("basic").await.unwrap();
        sync.ensure_columns("basic", &entries(json!({"title": "T1"})))
            .await
            .unwrap();
        let schema = sync
            .ensure_columns("basic", &entries(json!({"title": "T2", "extra": "x"})))
            .await
            .unwrap();
        assert_eq!(schema.columns(), &["path", "title", "extra"]);
        assert_eq!(
            store.table_columns("basic").await.unwrap(),
            vec!["path", "title", "extra"]
        );
    }

    #[tokio::test]
    async fn json_mode_adds_document_column_once() {
        let (store, sync) = synchronizer(StorageMode::Json);
        sync.ensure_table("basic").await.unwrap();
        sync.ensure_columns("basic", &entries(json!({"title": "a"})))
            .await
            .unwrap();
        let schema = sync
            .ensure_columns("basic", &entries(json!({"other": "b"})))
            .await
            .unwrap();
        assert_eq!(schema.columns(), &["path", "entries"]);
        assert_eq!(store.ddl_log(), vec!["create basic", "add basic.entries"]);
    }

    #[tokio::test]
    async fn failed_column_is_not_registered() {
        let (store, sync) = synchronizer(StorageMode::Columnar);
        store.fail_column("broken");
        sync.ensure_table("basic").await.unwrap();
        let err = sync
            .ensure_columns("basic", &entries(json!({"title": "a", "broken": "b"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SchemaSync { .. }));
        assert_eq!(sync.schema("basic").await.unwrap().columns(), &["path", "title"]);
    }

    #[tokio::test]
    async fn json_mode_failure_is_reported() {
        let (store, sync) = synchronizer(StorageMode::Json);
        store.fail_column("entries");
        sync.ensure_table("basic").await.unwrap();
        let err = sync
            .ensure_columns("basic", &entries(json!({"title": "a"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "schema");
        assert!(!sync.schema("basic").await.unwrap().has_column("entries"));
    }

    #[tokio::test]
    async fn columns_before_table_is_an_error() {
        let (_store, sync) = synchronizer(StorageMode::Columnar);
        assert!(sync
            .ensure_columns("basic", &entries(json!({"title": "a"})))
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_sight_adds_column_once() {
        let (store, sync) = synchronizer(StorageMode::Columnar);
        let sync = Arc::new(sync);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sync = sync.clone();
            handles.push(tokio::spawn(async move {
                sync.ensure_table("basic").await.unwrap();
                sync.ensure_columns("basic", &entries(json!({"title": "t"})))
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let schema = sync.schema("basic").await.unwrap();
        assert_eq!(schema.columns(), &["path", "title"]);
        let log = store.ddl_log();
        assert_eq!(log.iter().filter(|s| *s == "create basic").count(), 1);
        assert_eq!(log.iter().filter(|s| *s == "add basic.title").count(), 1);
    }
}
