//! Index status overview.
//!
//! Summarises what is indexed: document and chunk counts per source label,
//! the embedding model the vectors were built with, and the database size.
//! Used by `memdex status` and `GET /tools/status`.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use memdex_core::store::{IndexStore, SourceStats};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub db_path: String,
    /// False when no sync or init has created the database yet.
    pub exists: bool,
    pub db_size_bytes: u64,
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: Option<String>,
    pub configured_model: Option<String>,
    pub sources: BTreeMap<String, SourceStats>,
}

/// Collect index statistics without creating the database.
pub async fn index_status(config: &Config) -> Result<StatusResponse> {
    let configured_model = config
        .embedding
        .is_enabled()
        .then(|| config.embedding.model.clone())
        .flatten();

    let mut response = StatusResponse {
        db_path: config.db.path.display().to_string(),
        exists: false,
        db_size_bytes: 0,
        documents: 0,
        chunks: 0,
        embedding_model: None,
        configured_model,
        sources: BTreeMap::new(),
    };

    let pool = match db::connect_existing(config).await? {
        Some(pool) => pool,
        None => return Ok(response),
    };
    if let Err(e) = migrate::migrate(&pool).await {
        pool.close().await;
        return Err(e);
    }
    let store = SqliteStore::new(pool);
    let stats = store.stats().await;
    store.close().await;
    let stats = stats?;

    response.exists = true;
    response.db_size_bytes = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    response.documents = stats.documents;
    response.chunks = stats.chunks;
    response.embedding_model = stats.embedding_model;
    response.sources = stats.sources;
    Ok(response)
}

/// Run the status command and print a summary.
pub async fn run_status(config: &Config, json: bool) -> Result<()> {
    let status = index_status(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("memdex status");
    println!("=============");
    println!();
    println!("  Database:    {}", status.db_path);
    if !status.exists {
        println!("  (not created yet, run `memdex init` or `memdex sync`)");
        println!();
        return Ok(());
    }
    println!("  Size:        {}", format_bytes(status.db_size_bytes));
    println!();
    println!("  Documents:   {}", status.documents);
    println!("  Chunks:      {}", status.chunks);
    println!(
        "  Model:       {}",
        status.embedding_model.as_deref().unwrap_or("none")
    );
    if let (Some(stored), Some(configured)) = (&status.embedding_model, &status.configured_model) {
        if stored != configured {
            println!(
                "  Warning:     configured model is {}; next sync reindexes everything",
                configured
            );
        }
    }

    if !status.sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<24} {:>6} {:>8}", "SOURCE", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(40));
        for (label, s) in &status.sources {
            println!("  {:<24} {:>6} {:>8}", label, s.documents, s.chunks);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn status_without_database() {
        let tmp = TempDir::new().unwrap();
        let cfg = parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("memdex.sqlite").display()
        ))
        .unwrap();

        let status = index_status(&cfg).await.unwrap();
        assert!(!status.exists);
        assert_eq!(status.documents, 0);
        assert!(!cfg.db.path.exists());

        migrate::run_migrations(&cfg).await.unwrap();
        let status = index_status(&cfg).await.unwrap();
        assert!(status.exists);
        assert_eq!(status.chunks, 0);
        assert!(status.embedding_model.is_none());
    }
}
