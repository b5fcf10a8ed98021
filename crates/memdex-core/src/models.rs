//! Core data models used throughout memdex.
//!
//! These types represent the documents, chunk drafts, and stored chunk
//! records that flow through the sync and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::IndexError;

/// Metadata for one source document, as listed by a
/// [`DocumentSource`](crate::sync::DocumentSource).
///
/// The body is not part of the listing: it is only read for documents the
/// change set marks for reindexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Stable unique key for the document.
    pub path: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
}

/// A passage produced by the chunker, before ids, labels, and vectors
/// are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub text: String,
    /// First line covered, 1-indexed.
    pub start_line: usize,
    /// Last line covered, 1-indexed and inclusive.
    pub end_line: usize,
}

/// A stored, retrievable chunk record.
///
/// Construct through [`Chunk::new`], which validates every field; a chunk
/// is never mutated after it has been inserted into a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// `"{path}::{ordinal}"`.
    pub chunk_id: String,
    pub path: String,
    pub ordinal: usize,
    /// Classification facet used for filtering, never for ranking.
    pub source_label: String,
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Fingerprint of the owning document at index time.
    pub doc_fingerprint: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn new(
        path: &str,
        ordinal: usize,
        source_label: &str,
        draft: ChunkDraft,
        doc_fingerprint: &str,
        embedding: Vec<f32>,
    ) -> Result<Self, IndexError> {
        if path.is_empty() {
            return Err(IndexError::InvalidChunk("path must not be empty".into()));
        }
        if draft.text.trim().is_empty() {
            return Err(IndexError::InvalidChunk(format!(
                "{}::{} has empty text",
                path, ordinal
            )));
        }
        if draft.start_line == 0 || draft.start_line > draft.end_line {
            return Err(IndexError::InvalidChunk(format!(
                "{}::{} has invalid line range {}-{}",
                path, ordinal, draft.start_line, draft.end_line
            )));
        }
        if embedding.is_empty() {
            return Err(IndexError::InvalidChunk(format!(
                "{}::{} has no embedding",
                path, ordinal
            )));
        }

        Ok(Self {
            chunk_id: chunk_id(path, ordinal),
            path: path.to_string(),
            ordinal,
            source_label: source_label.to_string(),
            text: draft.text,
            start_line: draft.start_line,
            end_line: draft.end_line,
            doc_fingerprint: doc_fingerprint.to_string(),
            embedding,
        })
    }
}

/// Derive the stable chunk id for the `ordinal`-th chunk of `path`.
pub fn chunk_id(path: &str, ordinal: usize) -> String {
    format!("{}::{}", path, ordinal)
}
