//! Destination store connection.
//!
//! Picks the [`TableStore`] backend from the URL scheme:
//!
//! | Scheme | Backend |
//! |--------|---------|
//! | `sqlite:` | [`SqliteTableStore`] (WAL, file created if missing) |
//! | `postgres://`, `postgresql://` | [`PgTableStore`] |
//!
//! A failure here is the run-aborting connection error.

use std::sync::Arc;

use anyhow::anyhow;

use idx_sync_core::store::TableStore;

use crate::config::Config;
use crate::error::SyncError;
use crate::pg_store::PgTableStore;
use crate::sqlite_store::SqliteTableStore;

pub async fn connect(config: &Config) -> Result<Arc<dyn TableStore>, SyncError> {
    let url = config.db.resolved_url();
    connect_url(&url, config.db.max_connections).await
}

pub async fn connect_url(url: &str, max_connections: u32) -> Result<Arc<dyn TableStore>, SyncError> {
    let result: anyhow::Result<Arc<dyn TableStore>> = if url.starts_with("sqlite:") {
        SqliteTableStore::connect(url, max_connections)
            .await
            .map(|s| Arc::new(s) as Arc<dyn TableStore>)
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        PgTableStore::connect(url, max_connections)
            .await
            .map(|s| Arc::new(s) as Arc<dyn TableStore>)
    } else {
        Err(anyhow!("unsupported database URL scheme"))
    };

    result.map_err(|cause| SyncError::Connection {
        url: redact_url(url),
        cause,
    })
}

/// Hide the password component of a connection URL for logs.
fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
