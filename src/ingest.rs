//! Sync pipeline orchestration.
//!
//! Coordinates one run: connect → scan → filter → fetch + schema sync +
//! upsert → summary. Only client setup, a failed connection or a
//! failed/empty scan abort the run; every other failure is counted in the
//! [`RunSummary`].

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use idx_sync_core::store::TableStore;

use crate::config::Config;
use crate::connector_github::GitHubTreeSource;
use crate::db;
use crate::error::SyncError;
use crate::fetch::HttpFragmentSource;
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::traits::{DocumentFilter, DocumentRef, FragmentSource, TreeSource};

/// Per-invocation switches that are not part of the config file.
pub struct SyncOptions {
    pub dry_run: bool,
    pub progress: Arc<dyn SyncProgressReporter>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            progress: Arc::new(NoProgress),
        }
    }
}

/// Run a sync against the configured GitHub tree, fragment server and
/// database. Returns `None` for a dry run.
pub async fn run_sync(
    config: &Config,
    options: SyncOptions,
) -> Result<Option<RunSummary>, SyncError> {
    let tree = GitHubTreeSource::new(&config.source, config.fetch.timeout_secs).map_err(
        |cause| SyncError::Setup {
            what: "tree source",
            cause,
        },
    )?;

    if options.dry_run {
        let docs = discover(config, &tree, options.progress.as_ref()).await?;
        println!("sync {} (dry-run)", tree.describe());
        println!("  documents found: {}", docs.len());
        for doc in &docs {
            println!("  {} -> {}", doc.source_path, doc.key);
        }
        return Ok(None);
    }

    let fetcher = HttpFragmentSource::new(&config.fetch).map_err(|cause| SyncError::Setup {
        what: "fragment fetcher",
        cause,
    })?;
    let store = db::connect(config).await?;

    let result = run_sync_with(config, store.clone(), &tree, Arc::new(fetcher), options).await;
    store.close().await;
    let summary = result?;
    print_summary(&tree.describe(), config, &summary);
    Ok(Some(summary))
}

/// Run a sync with explicit collaborators. The store is left open.
pub async fn run_sync_with(
    config: &Config,
    store: Arc<dyn TableStore>,
    tree: &dyn TreeSource,
    fetcher: Arc<dyn FragmentSource>,
    options: SyncOptions,
) -> Result<RunSummary, SyncError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("sync", run = %run_id, repo = %tree.describe());

    async move {
        let docs = discover(config, tree, options.progress.as_ref()).await?;
        info!(
            documents = docs.len(),
            mode = config.sync.mode.as_str(),
            backend = store.backend(),
            "starting sync"
        );

        let label = format!("{}/{}", config.source.owner, config.source.repo);
        let orchestrator = Orchestrator::new(
            store,
            config.sync.mode,
            config.sync.null_policy,
            config.sync.concurrency,
        )
        .with_progress(options.progress, &label);

        let summary = orchestrator.sync_documents(docs, fetcher).await;
        info!(
            documents = summary.documents,
            tables_written = summary.tables_written,
            failed = summary.failed(),
            elapsed_secs = summary.elapsed_secs(),
            "sync finished"
        );
        if summary.failed() > 0 {
            warn!(failed = summary.failed(), "some writes were dropped; see summary");
        }
        Ok(summary)
    }
    .instrument(span)
    .await
}

/// Scan the tree and select candidate documents. Empty is fatal.
async fn discover(
    config: &Config,
    tree: &dyn TreeSource,
    progress: &dyn SyncProgressReporter,
) -> Result<Vec<DocumentRef>, SyncError> {
    progress.report(SyncProgressEvent::Discovering {
        repo: tree.describe(),
    });

    let entries = tree.scan().await.map_err(|cause| SyncError::Scan { cause })?;
    let filter = DocumentFilter::from_config(&config.source)
        .map_err(|cause| SyncError::Scan { cause })?;
    let docs = filter.select(&entries, &config.source, &config.fetch.fragment_suffix);

    info!(tree_entries = entries.len(), documents = docs.len(), "tree scanned");
    if docs.is_empty() {
        return Err(SyncError::EmptyScan {
            repo: tree.describe(),
        });
    }
    Ok(docs)
}

fn print_summary(repo: &str, config: &Config, summary: &RunSummary) {
    println!("sync {} ({})", repo, config.sync.mode.as_str());
    println!("  documents: {}", summary.documents);
    println!("  fetched: {}", summary.fetched);
    println!("  fetch failures: {}", summary.fetch_failed);
    println!("  tables written: {}", summary.tables_written);
    println!("  schema failures: {}", summary.schema_failed);
    println!("  upsert failures: {}", summary.upsert_failed);
    if summary.panicked > 0 {
        println!("  panicked: {}", summary.panicked);
    }
    for f in &summary.failures {
        println!(
            "    [{}] {} {}: {}",
            f.kind,
            f.path.as_deref().unwrap_or("-"),
            f.table.as_deref().unwrap_or("-"),
            f.message
        );
    }
    println!("  elapsed: {:.1}s", summary.elapsed_secs());
    println!("ok");
}
