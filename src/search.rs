//! Search command wiring.
//!
//! Opens the existing index, embeds the query when a provider is configured,
//! and runs the core hybrid query engine. A missing provider or a failed
//! query embedding only disables the vector modality; keyword search still
//! answers. A missing or unreadable index is not an error either: the
//! response carries an empty result list and a message.

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, warn};

use memdex_core::embedding::EmbeddingProvider;
use memdex_core::search::{search, QueryResult, SearchRequest};
use memdex_core::store::IndexStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub const NO_INDEX_MESSAGE: &str = "No memory index found";
pub const STORE_ERROR_MESSAGE: &str = "Memory index could not be opened";

/// Per-call overrides on top of `[retrieval]`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub query: String,
    pub max_results: Option<usize>,
    pub min_score: Option<f64>,
    pub source: Option<String>,
    pub explain: bool,
}

/// Body returned by `memdex search --json` and `POST /tools/search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchResponse {
    fn empty(message: Option<String>) -> Self {
        Self {
            results: Vec::new(),
            provider: None,
            model: None,
            message,
        }
    }
}

/// Run one hybrid search against the configured index.
///
/// Only invalid arguments are errors. A database that cannot be opened or
/// migrated yields an empty response whose message names the failure.
pub async fn search_index(config: &Config, opts: &SearchOptions) -> Result<SearchResponse> {
    if opts.query.trim().is_empty() {
        bail!("query must not be empty");
    }
    if let Some(max) = opts.max_results {
        if max < 1 {
            bail!("max_results must be >= 1");
        }
    }

    let pool = match db::connect_existing(config).await {
        Ok(Some(pool)) => pool,
        Ok(None) => {
            debug!(db = %config.db.path.display(), "no index database");
            return Ok(SearchResponse::empty(Some(NO_INDEX_MESSAGE.to_string())));
        }
        Err(e) => return Ok(store_unavailable(config, e)),
    };
    if let Err(e) = migrate::migrate(&pool).await {
        pool.close().await;
        return Ok(store_unavailable(config, e));
    }
    let store = SqliteStore::new(pool);

    let provider = load_provider(config);
    let query_vec = match &provider {
        Some(p) => query_vector(p.as_ref(), &store, &opts.query).await,
        None => None,
    };

    let mut params = config.search_params();
    if let Some(max) = opts.max_results {
        params.max_results = max;
    }
    if let Some(min) = opts.min_score {
        params.min_score = min;
    }

    let request = SearchRequest {
        query: &opts.query,
        query_vec: query_vec.as_deref(),
        source_filter: opts.source.as_deref(),
        params,
        explain: opts.explain,
    };
    let outcome = search(&store, &request).await;
    store.close().await;

    debug!(
        results = outcome.results.len(),
        vector = outcome.vector_available,
        lexical = outcome.lexical_available,
        "search finished"
    );

    Ok(SearchResponse {
        results: outcome.results,
        provider: provider.as_ref().map(|_| config.embedding.provider.clone()),
        model: provider.as_ref().map(|p| p.model_name().to_string()),
        message: None,
    })
}

fn store_unavailable(config: &Config, err: anyhow::Error) -> SearchResponse {
    let message = format!("{}: {:#}", STORE_ERROR_MESSAGE, err);
    warn!(db = %config.db.path.display(), error = %message, "search skipped");
    SearchResponse::empty(Some(message))
}

fn load_provider(config: &Config) -> Option<Box<dyn EmbeddingProvider>> {
    if !config.embedding.is_enabled() {
        return None;
    }
    match create_provider(&config.embedding) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(error = %e, "embedding provider unavailable, keyword search only");
            None
        }
    }
}

/// Embed the query, unless the index was built with a different model.
async fn query_vector(
    provider: &dyn EmbeddingProvider,
    store: &SqliteStore,
    query: &str,
) -> Option<Vec<f32>> {
    match store.embedding_model().await {
        Ok(Some(stored)) if stored != provider.model_name() => {
            warn!(
                stored = %stored,
                configured = provider.model_name(),
                "index was built with another embedding model, run `memdex sync`; keyword search only"
            );
            return None;
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %format!("{:#}", e), "could not read stored embedding model");
            return None;
        }
    }

    match provider.embed(query).await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "query embedding failed, keyword search only");
            None
        }
    }
}

/// CLI entry point. Prints results as text or JSON.
pub async fn run_search(config: &Config, opts: SearchOptions, json: bool) -> Result<()> {
    let response = search_index(config, &opts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if let Some(msg) = &response.message {
        println!("{}", msg);
        return Ok(());
    }
    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}:{}-{} ({})",
            i + 1,
            r.score,
            r.path,
            r.start_line,
            r.end_line,
            r.source_label
        );
        println!("    id: {}", r.chunk_id);
        if let Some(ex) = &r.explain {
            println!(
                "    vector={:.4} (w={:.2})  text={:.4} (w={:.2})",
                ex.vector_score, ex.vector_weight, ex.text_score, ex.text_weight
            );
        }
        for line in r.snippet.lines() {
            println!("    > {}", line);
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> Config {
        parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("memdex.sqlite").display()
        ))
        .unwrap()
    }

    fn opts(query: &str) -> SearchOptions {
        SearchOptions {
            query: query.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_index_is_reported_not_created() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);

        let resp = search_index(&cfg, &opts("deploy")).await.unwrap();
        assert!(resp.results.is_empty());
        assert_eq!(resp.message.as_deref(), Some(NO_INDEX_MESSAGE));
        assert!(!cfg.db.path.exists());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = search_index(&config_in(&tmp), &opts("   ")).await.unwrap_err();
        assert!(err.to_string().contains("query must not be empty"));
    }

    #[tokio::test]
    async fn initialised_empty_index_returns_no_results() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);
        migrate::run_migrations(&cfg).await.unwrap();

        let resp = search_index(&cfg, &opts("deploy")).await.unwrap();
        assert!(resp.results.is_empty());
        assert!(resp.message.is_none());
        assert!(resp.provider.is_none());
    }

    #[tokio::test]
    async fn unreadable_index_answers_with_message() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);
        std::fs::write(&cfg.db.path, "this is not a sqlite database, just text\n".repeat(200))
            .unwrap();

        let resp = search_index(&cfg, &opts("deploy")).await.unwrap();
        assert!(resp.results.is_empty());
        assert!(resp.message.unwrap().starts_with(STORE_ERROR_MESSAGE));
    }

    #[test]
    fn response_omits_empty_fields() {
        let json = serde_json::to_value(SearchResponse::empty(Some(NO_INDEX_MESSAGE.into()))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "results": [], "message": "No memory index found" })
        );
    }
}
