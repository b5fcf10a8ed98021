//! Sync command wiring.
//!
//! Builds the filesystem source, classifier, provider, and SQLite store from
//! the config and hands them to the core sync engine. Every failure,
//! including configuration problems found while wiring, comes back as a
//! structured [`SyncReport`].

use anyhow::Result;
use tracing::info;

use memdex_core::error::IndexError;
use memdex_core::sync::{run_sync, SyncReport, SyncStatus};

use crate::classify::GlobClassifier;
use crate::config::Config;
use crate::db;
use crate::documents::FsDocumentSource;
use crate::embedding::create_provider;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Run one sync against the configured index.
pub async fn sync_index(config: &Config, full: bool) -> SyncReport {
    match sync_with_config(config, full).await {
        Ok(report) => report,
        Err(e) => SyncReport::failed(&e),
    }
}

async fn sync_with_config(config: &Config, full: bool) -> Result<SyncReport, IndexError> {
    if !config.embedding.is_enabled() {
        return Err(IndexError::Configuration(
            "embedding provider is disabled; set [embedding].provider to sync".into(),
        ));
    }
    let provider = create_provider(&config.embedding)?;
    let source = FsDocumentSource::new(&config.documents)
        .map_err(|e| IndexError::Configuration(format!("{:#}", e)))?;
    let classifier = GlobClassifier::new(&config.classify)
        .map_err(|e| IndexError::Configuration(format!("{:#}", e)))?;

    let pool = db::connect(config).await.map_err(IndexError::store)?;
    if let Err(e) = migrate::migrate(&pool).await {
        pool.close().await;
        return Err(IndexError::store(e));
    }
    let store = SqliteStore::new(pool);

    info!(
        db = %config.db.path.display(),
        model = provider.model_name(),
        full,
        "starting sync"
    );
    let report = run_sync(
        &source,
        &classifier,
        provider.as_ref(),
        &store,
        &config.sync_options(full),
    )
    .await;

    store.close().await;
    Ok(report)
}

/// Failed report for a config file that could not be loaded.
pub fn config_failure(err: &anyhow::Error) -> SyncReport {
    SyncReport::failed(&IndexError::Configuration(format!("{:#}", err)))
}

/// CLI entry point. Runs the sync and prints the report.
pub async fn run_sync_command(config: &Config, full: bool, json: bool) -> Result<()> {
    let report = sync_index(config, full).await;
    print_report(&report, json)
}

/// Print a sync report as JSON or text.
pub fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match report.status {
        SyncStatus::Ok => {
            println!("sync ok");
            println!("  indexed:   {}", report.indexed);
            println!("  deleted:   {}", report.deleted);
            println!("  unchanged: {}", report.unchanged);
            println!("  skipped:   {}", report.skipped);
            println!("  chunks:    {}", report.chunks);
            println!("  lexical:   {}", serde_json::to_string(&report.lexical_index)?.trim_matches('"'));
        }
        SyncStatus::Failed => {
            println!("sync failed");
            if let Some(kind) = report.error_kind {
                println!("  kind:    {}", serde_json::to_string(&kind)?.trim_matches('"'));
            }
            if let Some(msg) = &report.message {
                println!("  message: {}", msg);
            }
        }
    }

    Ok(())
}
