//! Incremental sync engine.
//!
//! Brings an [`IndexStore`] in line with a [`DocumentSource`]:
//!
//! ```text
//! list() → change set → read + chunk → embed (all or nothing)
//!        → delete_by_path (removed) → replace_document (new, changed)
//!        → rebuild lexical
//! ```
//!
//! Embedding runs before the first store write, so a provider failure
//! leaves the index exactly as it was. Documents that cannot be read are
//! skipped and keep their previous chunks. A document's fingerprint is only
//! stored together with its chunks, so a sync that dies mid-write leaves
//! the document to be picked up by the next run. A failed lexical rebuild is
//! reported as `lexical_index: "degraded"` on an otherwise successful sync.
//!
//! [`run_sync`] never returns an error: every outcome is a [`SyncReport`].

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::changeset::{build_change_set, build_change_set_full};
use crate::chunk::chunk_lines;
use crate::classify::SourceClassifier;
use crate::embedding::EmbeddingProvider;
use crate::error::{ErrorKind, IndexError};
use crate::models::{Chunk, ChunkDraft, DocumentMeta};
use crate::store::IndexStore;

/// Where documents come from.
///
/// Listing is cheap metadata only; bodies are read on demand for documents
/// that need reindexing.
pub trait DocumentSource: Send + Sync {
    fn list(&self) -> Result<Vec<DocumentMeta>>;

    /// Full UTF-8 text of `path`.
    fn read(&self, path: &str) -> Result<String>;
}

/// Tuning for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    /// Texts per provider call.
    pub batch_size: usize,
    /// Ignore recorded fingerprints and reindex everything.
    pub full: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            target_tokens: 400,
            overlap_tokens: 80,
            batch_size: 64,
            full: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalIndexStatus {
    Ok,
    Degraded,
    /// The sync failed before reaching the rebuild step.
    NotRun,
}

/// Outcome of one sync invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    /// Documents (re)indexed.
    pub indexed: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Documents that could not be read.
    pub skipped: usize,
    /// Chunks written.
    pub chunks: usize,
    pub lexical_index: LexicalIndexStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl SyncReport {
    /// A failed report carrying `err`'s kind and message.
    pub fn failed(err: &IndexError) -> Self {
        Self {
            status: SyncStatus::Failed,
            indexed: 0,
            deleted: 0,
            unchanged: 0,
            skipped: 0,
            chunks: 0,
            lexical_index: LexicalIndexStatus::NotRun,
            message: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SyncStatus::Ok
    }
}

/// A document that was read and chunked, waiting for vectors.
struct Pending {
    path: String,
    fingerprint: String,
    source_label: String,
    drafts: Vec<ChunkDraft>,
}

/// Run one incremental sync.
pub async fn run_sync<D, C, E, S>(
    source: &D,
    classifier: &C,
    provider: &E,
    store: &S,
    opts: &SyncOptions,
) -> SyncReport
where
    D: DocumentSource + ?Sized,
    C: SourceClassifier + ?Sized,
    E: EmbeddingProvider + ?Sized,
    S: IndexStore + ?Sized,
{
    match sync_inner(source, classifier, provider, store, opts).await {
        Ok(report) => report,
        Err(e) => {
            warn!(kind = ?e.kind(), error = %e, "sync failed");
            SyncReport::failed(&e)
        }
    }
}

async fn sync_inner<D, C, E, S>(
    source: &D,
    classifier: &C,
    provider: &E,
    store: &S,
    opts: &SyncOptions,
) -> Result<SyncReport, IndexError>
where
    D: DocumentSource + ?Sized,
    C: SourceClassifier + ?Sized,
    E: EmbeddingProvider + ?Sized,
    S: IndexStore + ?Sized,
{
    let current = source.list().map_err(IndexError::document_source)?;
    let indexed = store.list_fingerprints().await.map_err(IndexError::store)?;
    let stored_model = store.embedding_model().await.map_err(IndexError::store)?;

    let model_changed = matches!(&stored_model, Some(m) if m != provider.model_name());
    if model_changed {
        info!(
            from = stored_model.as_deref().unwrap_or_default(),
            to = provider.model_name(),
            "embedding model changed, reindexing everything"
        );
    }

    let changes = if opts.full || model_changed {
        build_change_set_full(&current, &indexed)
    } else {
        build_change_set(&current, &indexed)
    };
    debug!(
        reindex = changes.to_reindex.len(),
        delete = changes.to_delete.len(),
        unchanged = changes.unchanged.len(),
        "change set built"
    );

    // Read and chunk.
    let mut pending: Vec<Pending> = Vec::new();
    let mut skipped = 0usize;
    for (path, fingerprint) in &changes.to_reindex {
        let text = match source.read(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path, error = %format!("{:#}", e), "skipping unreadable document");
                skipped += 1;
                continue;
            }
        };
        pending.push(Pending {
            path: path.clone(),
            fingerprint: fingerprint.clone(),
            source_label: classifier.classify(path),
            drafts: chunk_lines(&text, opts.target_tokens, opts.overlap_tokens),
        });
    }

    // Embed everything before touching the store.
    let texts: Vec<String> = pending
        .iter()
        .flat_map(|p| p.drafts.iter().map(|d| d.text.clone()))
        .collect();
    let vectors = embed_all(provider, &texts, opts.batch_size).await?;

    let mut vectors = vectors.into_iter();
    let mut records: Vec<(&Pending, Vec<Chunk>)> = Vec::with_capacity(pending.len());
    for p in &pending {
        let mut chunks = Vec::with_capacity(p.drafts.len());
        for (ordinal, draft) in p.drafts.iter().enumerate() {
            let embedding = vectors.next().ok_or_else(|| {
                IndexError::EmbeddingUnavailable("provider returned too few vectors".into())
            })?;
            chunks.push(Chunk::new(
                &p.path,
                ordinal,
                &p.source_label,
                draft.clone(),
                &p.fingerprint,
                embedding,
            )?);
        }
        records.push((p, chunks));
    }

    // Delete before insert.
    for path in &changes.to_delete {
        store.delete_by_path(path).await.map_err(IndexError::store)?;
        debug!(path = %path, "deleted");
    }
    let mut chunk_count = 0usize;
    for (p, chunks) in &records {
        store
            .replace_document(&p.path, &p.fingerprint, &p.source_label, chunks)
            .await
            .map_err(IndexError::store)?;
        chunk_count += chunks.len();
        debug!(path = %p.path, chunks = chunks.len(), "indexed");
    }

    if stored_model.as_deref() != Some(provider.model_name()) && !records.is_empty() {
        store
            .set_embedding_model(provider.model_name())
            .await
            .map_err(IndexError::store)?;
    }

    let lexical_index = match store.rebuild_lexical_index().await {
        Ok(()) => LexicalIndexStatus::Ok,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "lexical index rebuild failed, keyword search degraded");
            LexicalIndexStatus::Degraded
        }
    };

    let report = SyncReport {
        status: SyncStatus::Ok,
        indexed: records.len(),
        deleted: changes.to_delete.len(),
        unchanged: changes.unchanged.len(),
        skipped,
        chunks: chunk_count,
        lexical_index,
        message: None,
        error_kind: None,
    };
    info!(
        indexed = report.indexed,
        deleted = report.deleted,
        unchanged = report.unchanged,
        skipped = report.skipped,
        chunks = report.chunks,
        "sync complete"
    );
    Ok(report)
}

/// Embed `texts` in sub-batches. Any failure fails the whole call.
async fn embed_all<E>(
    provider: &E,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, IndexError>
where
    E: EmbeddingProvider + ?Sized,
{
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = provider
            .embed_batch(batch)
            .await
            .map_err(IndexError::embedding)?;
        if vectors.len() != batch.len() {
            return Err(IndexError::EmbeddingUnavailable(format!(
                "expected {} vectors, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != provider.dims()) {
            return Err(IndexError::EmbeddingUnavailable(format!(
                "expected {} dimensions, got {}",
                provider.dims(),
                bad.len()
            )));
        }
        out.extend(vectors);
    }
    Ok(out)
}
