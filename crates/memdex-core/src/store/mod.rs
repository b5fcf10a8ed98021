//! Storage abstraction for memdex.
//!
//! The [`IndexStore`] trait defines every storage operation the sync engine
//! and the query engine need, so backends are pluggable (SQLite in the app
//! crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Chunk;

/// A candidate chunk returned from lexical or vector search.
///
/// Carries everything the query engine needs to build a
/// [`QueryResult`](crate::search::QueryResult) without another round-trip.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub path: String,
    pub source_label: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Full chunk text; the query engine cuts the snippet.
    pub text: String,
    /// Backend score. Cosine distance for vector search (lower is better);
    /// a backend relevance value for lexical search, meaningful only for
    /// ordering within one result list.
    pub raw_score: f64,
}

/// Per-label counts reported by [`IndexStore::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub documents: usize,
    pub chunks: usize,
}

/// Index-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: Option<String>,
    pub sources: BTreeMap<String, SourceStats>,
}

/// Abstract storage backend for memdex.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](IndexStore::insert) | Add chunk records |
/// | [`delete_by_path`](IndexStore::delete_by_path) | Remove a document and all its chunks |
/// | [`record_document`](IndexStore::record_document) | Persist a document's fingerprint |
/// | [`replace_document`](IndexStore::replace_document) | Swap a document's chunks and fingerprint |
/// | [`vector_search`](IndexStore::vector_search) | Cosine-distance nearest neighbours |
/// | [`lexical_search`](IndexStore::lexical_search) | Full-text keyword search |
/// | [`list_fingerprints`](IndexStore::list_fingerprints) | `path → fingerprint` map |
/// | [`rebuild_lexical_index`](IndexStore::rebuild_lexical_index) | Rebuild the keyword index |
///
/// `source_filter` is always an equality match on `source_label`.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert chunk records. Ids are unique; callers delete by path first.
    async fn insert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Remove every chunk and the fingerprint recorded for `path`.
    async fn delete_by_path(&self, path: &str) -> Result<()>;

    /// Record that `path` is indexed at `fingerprint`. Documents that
    /// produce no chunks are recorded too, so they stay unchanged.
    async fn record_document(&self, path: &str, fingerprint: &str, source_label: &str)
        -> Result<()>;

    /// Swap everything stored for `path` for `chunks` and record
    /// `fingerprint`. The fingerprint must never be visible without its
    /// chunks: a failed insert leaves the document unrecorded so the next
    /// sync picks it up again. Backends with transactions should make the
    /// whole swap atomic.
    async fn replace_document(
        &self,
        path: &str,
        fingerprint: &str,
        source_label: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        self.delete_by_path(path).await?;
        self.insert(chunks).await?;
        self.record_document(path, fingerprint, source_label).await
    }

    /// Nearest chunks by cosine distance, ascending.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Keyword matches, best first.
    async fn lexical_search(
        &self,
        query: &str,
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>>;

    async fn list_fingerprints(&self) -> Result<BTreeMap<String, String>>;

    /// Bring the keyword index in line with the stored chunks.
    async fn rebuild_lexical_index(&self) -> Result<()>;

    /// The embedding model the stored vectors were produced with.
    async fn embedding_model(&self) -> Result<Option<String>>;

    async fn set_embedding_model(&self, model: &str) -> Result<()>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;

    async fn stats(&self) -> Result<IndexStats>;
}
