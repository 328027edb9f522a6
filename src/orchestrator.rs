//! Fan-out of fragment synchronization.
//!
//! Every `(path, table)` pair goes through one logical sequence:
//!
//! ```text
//! Unknown ──ensure_table──▶ TableEnsured ──ensure_columns──▶ ColumnsEnsured ──upsert──▶ Upserted
//! ```
//!
//! A failure stops that sequence where it is (no retry) and is recorded in
//! the [`RunSummary`]; sibling tables and other documents carry on. Tables
//! of one document run concurrently; documents run concurrently up to the
//! configured limit, and every dispatched document is awaited.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

use idx_sync_core::models::{DocumentFragment, Entries, NullPolicy, StorageMode};
use idx_sync_core::schema::SchemaCache;
use idx_sync_core::store::TableStore;

use crate::error::SyncError;
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::schema_sync::SchemaSynchronizer;
use crate::traits::{DocumentRef, FragmentSource};
use crate::upsert::UpsertEngine;

/// How far one `(path, table)` write got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Unknown,
    TableEnsured,
    ColumnsEnsured,
    Upserted,
}

/// Result of one `(path, table)` write.
#[derive(Debug)]
pub struct TableOutcome {
    pub path: String,
    pub table: String,
    /// Last state reached.
    pub state: WriteState,
    pub error: Option<SyncError>,
}

impl TableOutcome {
    pub fn is_ok(&self) -> bool {
        self.state == WriteState::Upserted
    }
}

/// Result of one document.
#[derive(Debug)]
pub enum DocumentOutcome {
    Synced { path: String, tables: Vec<TableOutcome> },
    FetchFailed { error: SyncError },
}

/// One failed item, as reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub kind: &'static str,
    pub path: Option<String>,
    pub table: Option<String>,
    pub message: String,
}

/// Per-item counts for a run.
///
/// A run can succeed while individual writes failed; those are counted
/// here rather than aborting.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: u64,
    pub fetched: u64,
    pub fetch_failed: u64,
    pub tables_written: u64,
    pub schema_failed: u64,
    pub upsert_failed: u64,
    /// Document tasks that panicked.
    pub panicked: u64,
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    fn new(documents: u64) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            documents,
            fetched: 0,
            fetch_failed: 0,
            tables_written: 0,
            schema_failed: 0,
            upsert_failed: 0,
            panicked: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, outcome: DocumentOutcome) {
        match outcome {
            DocumentOutcome::FetchFailed { error } => {
                self.fetch_failed += 1;
                let path = match &error {
                    SyncError::Fetch { path, .. } => Some(path.clone()),
                    _ => None,
                };
                self.failures.push(FailureRecord {
                    kind: error.kind(),
                    path,
                    table: None,
                    message: error.to_string(),
                });
            }
            DocumentOutcome::Synced { tables, .. } => {
                self.fetched += 1;
                for t in tables {
                    if t.is_ok() {
                        self.tables_written += 1;
                        continue;
                    }
                    let kind = t.error.as_ref().map(SyncError::kind).unwrap_or("unknown");
                    if kind == "upsert" {
                        self.upsert_failed += 1;
                    } else {
                        self.schema_failed += 1;
                    }
                    self.failures.push(FailureRecord {
                        kind,
                        path: Some(t.path),
                        table: Some(t.table),
                        message: t
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "write did not complete".to_string()),
                    });
                }
            }
        }
    }

    /// Failed table writes, failed fetches and panicked documents.
    pub fn failed(&self) -> u64 {
        self.fetch_failed + self.schema_failed + self.upsert_failed + self.panicked
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Drives schema sync and upserts for a batch of documents.
#[derive(Clone)]
pub struct Orchestrator {
    synchronizer: Arc<SchemaSynchronizer>,
    engine: Arc<UpsertEngine>,
    concurrency: usize,
    reporter: Arc<dyn SyncProgressReporter>,
    label: String,
}

impl Orchestrator {
    /// New orchestrator with a cold [`SchemaCache`].
    pub fn new(
        store: Arc<dyn TableStore>,
        mode: StorageMode,
        null_policy: NullPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            synchronizer: Arc::new(SchemaSynchronizer::new(
                store.clone(),
                mode,
                SchemaCache::new(),
            )),
            engine: Arc::new(UpsertEngine::new(store, mode, null_policy)),
            concurrency: concurrency.max(1),
            reporter: Arc::new(NoProgress),
            label: String::new(),
        }
    }

    /// Report per-document progress under `label`.
    pub fn with_progress(mut self, reporter: Arc<dyn SyncProgressReporter>, label: &str) -> Self {
        self.reporter = reporter;
        self.label = label.to_string();
        self
    }

    /// Tables and columns seen so far in this run.
    pub async fn schema(&self) -> SchemaCache {
        self.synchronizer.snapshot().await
    }

    /// Run one `(path, table)` write to completion or failure.
    pub async fn sync_table(&self, path: &str, table: &str, entries: &Entries) -> TableOutcome {
        let mut outcome = TableOutcome {
            path: path.to_string(),
            table: table.to_string(),
            state: WriteState::Unknown,
            error: None,
        };

        if let Err(e) = self.synchronizer.ensure_table(table).await {
            return fail(outcome, e);
        }
        outcome.state = WriteState::TableEnsured;

        let schema = match self.synchronizer.ensure_columns(table, entries).await {
            Ok(schema) => schema,
            Err(e) => return fail(outcome, e),
        };
        outcome.state = WriteState::ColumnsEnsured;

        if let Err(e) = self.engine.upsert(&schema, path, entries).await {
            return fail(outcome, e);
        }
        outcome.state = WriteState::Upserted;
        outcome
    }

    /// Write every table of one fragment, tables concurrently.
    pub async fn sync_fragment(&self, fragment: &DocumentFragment) -> Vec<TableOutcome> {
        join_all(
            fragment
                .tables
                .iter()
                .map(|(table, t)| self.sync_table(&fragment.path, table, &t.entries)),
        )
        .await
    }

    /// Synchronize already fetched fragments.
    pub async fn sync_fragments(&self, fragments: Vec<DocumentFragment>) -> RunSummary {
        let total = fragments.len();
        let jobs = fragments
            .into_iter()
            .map(|f| async move { Ok::<_, SyncError>(f) });
        self.dispatch(jobs, total).await
    }

    /// Fetch each document's fragment through `fetcher` and synchronize it.
    pub async fn sync_documents(
        &self,
        docs: Vec<DocumentRef>,
        fetcher: Arc<dyn FragmentSource>,
    ) -> RunSummary {
        let total = docs.len();
        let jobs = docs.into_iter().map(move |doc| {
            let fetcher = fetcher.clone();
            async move {
                fetcher.fetch(&doc).await.map_err(|cause| SyncError::Fetch {
                    path: doc.key.clone(),
                    cause,
                })
            }
        });
        self.dispatch(jobs, total).await
    }

    /// Run `jobs` with at most `concurrency` in flight and wait for all.
    ///
    /// A permit is taken before each spawn, so dispatch order is job order
    /// and the pending set never exceeds the limit.
    async fn dispatch<I, F>(&self, jobs: I, total: usize) -> RunSummary
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<DocumentFragment, SyncError>> + Send + 'static,
    {
        let mut summary = RunSummary::new(total as u64);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let done = Arc::new(AtomicU64::new(0));
        let mut tasks: JoinSet<DocumentOutcome> = JoinSet::new();

        for job in jobs {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "worker pool closed; remaining documents skipped");
                    break;
                }
            };
            let this = self.clone();
            let done = done.clone();
            tasks.spawn(async move {
                let outcome = this.process(job).await;
                drop(permit);
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                this.reporter.report(SyncProgressEvent::Syncing {
                    repo: this.label.clone(),
                    n,
                    total: total as u64,
                });
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "document task panicked");
                    summary.failures.push(FailureRecord {
                        kind: "panic",
                        path: None,
                        table: None,
                        message: e.to_string(),
                    });
                    summary.panicked += 1;
                }
            }
        }

        summary.finished_at = Utc::now();
        summary
    }

    async fn process<F>(&self, job: F) -> DocumentOutcome
    where
        F: Future<Output = Result<DocumentFragment, SyncError>>,
    {
        match job.await {
            Ok(fragment) => {
                let tables = self.sync_fragment(&fragment).await;
                DocumentOutcome::Synced {
                    path: fragment.path,
                    tables,
                }
            }
            Err(error) => {
                warn!(error = %error, "document skipped");
                DocumentOutcome::FetchFailed { error }
            }
        }
    }
}

fn fail(mut outcome: TableOutcome, error: SyncError) -> TableOutcome {
    match outcome.state {
        WriteState::ColumnsEnsured => error!(
            path = %outcome.path,
            table = %outcome.table,
            error = %error,
            "upsert failed"
        ),
        _ => error!(
            path = %outcome.path,
            table = %outcome.table,
            error = %error,
            "schema sync failed; upsert skipped"
        ),
    }
    outcome.error = Some(error);
    outcome
}
