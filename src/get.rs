//! Chunk retrieval by ID.
//!
//! Fetches one stored chunk so a search hit can be read in full. Used by
//! `memdex get`.

use anyhow::{bail, Result};

use memdex_core::models::Chunk;
use memdex_core::store::IndexStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Look up a chunk by its `"{path}::{ordinal}"` id.
pub async fn get_chunk(config: &Config, chunk_id: &str) -> Result<Chunk> {
    let pool = match db::connect_existing(config).await? {
        Some(pool) => pool,
        None => bail!("chunk not found: {} (no memory index)", chunk_id),
    };
    let store = SqliteStore::new(pool);
    let found = store.get_chunk(chunk_id).await;
    store.close().await;

    match found? {
        Some(chunk) => Ok(chunk),
        None => bail!("chunk not found: {}", chunk_id),
    }
}

/// CLI entry point.
pub async fn run_get(config: &Config, chunk_id: &str, json: bool) -> Result<()> {
    let chunk = get_chunk(config, chunk_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chunk)?);
        return Ok(());
    }

    println!("--- {} ---", chunk.chunk_id);
    println!("path:   {}", chunk.path);
    println!("lines:  {}-{}", chunk.start_line, chunk.end_line);
    println!("source: {}", chunk.source_label);
    println!();
    println!("{}", chunk.text);

    Ok(())
}
