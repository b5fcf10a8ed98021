//! Error taxonomy for indexing and retrieval.
//!
//! Store, provider, and source seams return `anyhow::Result`. The sync
//! engine folds those failures into [`IndexError`], and every public entry
//! point turns an `IndexError` into a structured status value so callers
//! branch on [`ErrorKind`] instead of matching on messages.

use serde::Serialize;
use thiserror::Error;

/// Errors that abort a whole sync invocation or reject a record.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Missing credentials, bad provider name, invalid tuning values.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The embedding provider could not be reached or returned bad data.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// The index store could not be read or written.
    #[error("index store error: {0}")]
    Store(String),
    /// A chunk record failed validation at construction.
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),
    /// The document source could not be listed.
    #[error("document source error: {0}")]
    Source(String),
}

/// Machine-readable classification of an [`IndexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    EmbeddingUnavailable,
    Store,
    InvalidChunk,
    Source,
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Configuration(_) => ErrorKind::Configuration,
            IndexError::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            IndexError::Store(_) => ErrorKind::Store,
            IndexError::InvalidChunk(_) => ErrorKind::InvalidChunk,
            IndexError::Source(_) => ErrorKind::Source,
        }
    }

    /// Wrap a store-layer error, keeping its full context chain.
    pub fn store(err: anyhow::Error) -> Self {
        IndexError::Store(format!("{:#}", err))
    }

    /// Wrap a document-source error, keeping its full context chain.
    pub fn document_source(err: anyhow::Error) -> Self {
        IndexError::Source(format!("{:#}", err))
    }

    /// Wrap a provider-layer error, keeping its full context chain.
    pub fn embedding(err: anyhow::Error) -> Self {
        IndexError::EmbeddingUnavailable(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let err = IndexError::EmbeddingUnavailable("connection refused".into());
        assert_eq!(err.kind(), ErrorKind::EmbeddingUnavailable);
        let json = serde_json::to_string(&err.kind()).unwrap();
        assert_eq!(json, "\"embedding_unavailable\"");
    }

    #[test]
    fn store_wrapper_keeps_context() {
        let inner = anyhow::anyhow!("disk full").context("insert chunks");
        let err = IndexError::store(inner);
        assert_eq!(err.to_string(), "index store error: insert chunks: disk full");
    }
}
