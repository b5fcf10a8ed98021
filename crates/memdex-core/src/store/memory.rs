//! In-memory [`IndexStore`] implementation for tests and embedded use.
//!
//! Everything lives behind one `std::sync::RwLock`. Vector search is
//! brute-force cosine distance over all stored vectors. Lexical search runs
//! BM25 over an inverted index that is only refreshed by
//! [`rebuild_lexical_index`](IndexStore::rebuild_lexical_index), matching
//! the rebuild-after-sync contract of the SQLite backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::Chunk;

use super::{ChunkCandidate, IndexStats, IndexStore};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

struct DocumentRecord {
    fingerprint: String,
    source_label: String,
}

#[derive(Default)]
struct LexicalIndex {
    postings: HashMap<String, Vec<(String, usize)>>,
    lengths: HashMap<String, usize>,
    avg_len: f64,
}

#[derive(Default)]
struct State {
    chunks: BTreeMap<String, Chunk>,
    documents: BTreeMap<String, DocumentRecord>,
    lexical: LexicalIndex,
    model: Option<String>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

/// Lowercased alphanumeric terms.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn candidate(chunk: &Chunk, raw_score: f64) -> ChunkCandidate {
    ChunkCandidate {
        chunk_id: chunk.chunk_id.clone(),
        path: chunk.path.clone(),
        source_label: chunk.source_label.clone(),
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        text: chunk.text.clone(),
        raw_score,
    }
}

fn label_matches(chunk: &Chunk, source_filter: Option<&str>) -> bool {
    source_filter.map_or(true, |s| chunk.source_label == s)
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn insert(&self, chunks: &[Chunk]) -> Result<()> {
        let mut state = self.write()?;
        for c in chunks {
            if state.chunks.contains_key(&c.chunk_id) {
                return Err(anyhow!("duplicate chunk id: {}", c.chunk_id));
            }
        }
        for c in chunks {
            state.chunks.insert(c.chunk_id.clone(), c.clone());
        }
        Ok(())
    }

    async fn delete_by_path(&self, path: &str) -> Result<()> {
        let mut state = self.write()?;
        state.chunks.retain(|_, c| c.path != path);
        state.documents.remove(path);
        Ok(())
    }

    async fn record_document(
        &self,
        path: &str,
        fingerprint: &str,
        source_label: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.documents.insert(
            path.to_string(),
            DocumentRecord {
                fingerprint: fingerprint.to_string(),
                source_label: source_label.to_string(),
            },
        );
        Ok(())
    }

    async fn replace_document(
        &self,
        path: &str,
        fingerprint: &str,
        source_label: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        let mut state = self.write()?;
        // Validate before touching anything so a rejected swap changes nothing.
        let mut incoming = HashSet::new();
        for c in chunks {
            let taken = state
                .chunks
                .get(&c.chunk_id)
                .is_some_and(|old| old.path != path);
            if taken || !incoming.insert(c.chunk_id.as_str()) {
                return Err(anyhow!("duplicate chunk id: {}", c.chunk_id));
            }
        }
        state.chunks.retain(|_, c| c.path != path);
        for c in chunks {
            state.chunks.insert(c.chunk_id.clone(), c.clone());
        }
        state.documents.insert(
            path.to_string(),
            DocumentRecord {
                fingerprint: fingerprint.to_string(),
                source_label: source_label.to_string(),
            },
        );
        Ok(())
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let state = self.read()?;
        let mut candidates: Vec<ChunkCandidate> = state
            .chunks
            .values()
            .filter(|c| label_matches(c, source_filter))
            .map(|c| candidate(c, cosine_distance(query_vec, &c.embedding)))
            .collect();
        candidates.sort_by(|a, b| {
            a.raw_score
                .partial_cmp(&b.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn lexical_search(
        &self,
        query: &str,
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.read()?;
        let index = &state.lexical;
        let n = index.lengths.len() as f64;

        let mut scores: HashMap<&str, f64> = HashMap::new();
        for term in &terms {
            let Some(postings) = index.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for (chunk_id, tf) in postings {
                let len = index.lengths.get(chunk_id).copied().unwrap_or(0) as f64;
                let tf = *tf as f64;
                let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len / index.avg_len.max(1.0));
                *scores.entry(chunk_id.as_str()).or_insert(0.0) +=
                    idf * tf * (BM25_K1 + 1.0) / (tf + norm);
            }
        }

        // Chunks deleted since the last rebuild drop out here.
        let mut candidates: Vec<ChunkCandidate> = scores
            .into_iter()
            .filter_map(|(id, score)| state.chunks.get(id).map(|c| (c, score)))
            .filter(|(c, _)| label_matches(c, source_filter))
            .map(|(c, score)| candidate(c, score))
            .collect();
        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn list_fingerprints(&self) -> Result<BTreeMap<String, String>> {
        let state = self.read()?;
        Ok(state
            .documents
            .iter()
            .map(|(path, rec)| (path.clone(), rec.fingerprint.clone()))
            .collect())
    }

    async fn rebuild_lexical_index(&self) -> Result<()> {
        let mut state = self.write()?;
        let mut index = LexicalIndex::default();
        let mut total = 0usize;
        for chunk in state.chunks.values() {
            let terms = tokenize(&chunk.text);
            total += terms.len();
            index.lengths.insert(chunk.chunk_id.clone(), terms.len());
            let mut tf: HashMap<String, usize> = HashMap::new();
            for t in terms {
                *tf.entry(t).or_insert(0) += 1;
            }
            for (term, count) in tf {
                index
                    .postings
                    .entry(term)
                    .or_default()
                    .push((chunk.chunk_id.clone(), count));
            }
        }
        if !index.lengths.is_empty() {
            index.avg_len = total as f64 / index.lengths.len() as f64;
        }
        state.lexical = index;
        Ok(())
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        Ok(self.read()?.model.clone())
    }

    async fn set_embedding_model(&self, model: &str) -> Result<()> {
        self.write()?.model = Some(model.to_string());
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(self.read()?.chunks.get(chunk_id).cloned())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let state = self.read()?;
        let mut stats = IndexStats {
            documents: state.documents.len(),
            chunks: state.chunks.len(),
            embedding_model: state.model.clone(),
            ..Default::default()
        };
        for rec in state.documents.values() {
            stats
                .sources
                .entry(rec.source_label.clone())
                .or_default()
                .documents += 1;
        }
        for c in state.chunks.values() {
            stats
                .sources
                .entry(c.source_label.clone())
                .or_default()
                .chunks += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkDraft;

    fn chunk(path: &str, ordinal: usize, label: &str, text: &str, v: Vec<f32>) -> Chunk {
        let draft = ChunkDraft {
            text: text.to_string(),
            start_line: ordinal + 1,
            end_line: ordinal + 1,
        };
        Chunk::new(path, ordinal, label, draft, "fp", v).unwrap()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert(&[
                chunk("a.md", 0, "memory", "rust borrow checker notes", vec![1.0, 0.0]),
                chunk("a.md", 1, "memory", "deploy pipeline rust rust", vec![0.7, 0.7]),
                chunk("s.md", 0, "sessions", "talked about the deploy", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        store.record_document("a.md", "fp-a", "memory").await.unwrap();
        store.record_document("s.md", "fp-s", "sessions").await.unwrap();
        store.rebuild_lexical_index().await.unwrap();
        store
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello, WORLD! a-b"), vec!["hello", "world", "a", "b"]);
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_distance() {
        let store = seeded().await;
        let hits = store.vector_search(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md::0", "a.md::1", "s.md::0"]);
        assert!(hits[0].raw_score.abs() < 1e-6);
        assert!(hits[0].raw_score <= hits[1].raw_score);
    }

    #[tokio::test]
    async fn test_vector_search_respects_filter_and_k() {
        let store = seeded().await;
        let hits = store
            .vector_search(&[1.0, 0.0], 10, Some("sessions"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_label, "sessions");

        let hits = store.vector_search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_lexical_search_bm25_prefers_repeated_terms() {
        let store = seeded().await;
        let hits = store.lexical_search("rust", 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md::1", "a.md::0"]);
    }

    #[tokio::test]
    async fn test_lexical_search_filter_and_empty_query() {
        let store = seeded().await;
        let hits = store
            .lexical_search("deploy", 10, Some("sessions"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "s.md::0");
        assert!(store.lexical_search("  ", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lexical_index_refreshes_on_rebuild() {
        let store = InMemoryStore::new();
        store
            .insert(&[chunk("n.md", 0, "memory", "fresh words", vec![1.0])])
            .await
            .unwrap();
        assert!(store.lexical_search("fresh", 5, None).await.unwrap().is_empty());
        store.rebuild_lexical_index().await.unwrap();
        assert_eq!(store.lexical_search("fresh", 5, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_path_removes_chunks_and_fingerprint() {
        let store = seeded().await;
        store.delete_by_path("a.md").await.unwrap();
        let fps = store.list_fingerprints().await.unwrap();
        assert_eq!(fps.keys().collect::<Vec<_>>(), vec!["s.md"]);
        assert!(store.get_chunk("a.md::0").await.unwrap().is_none());
        assert!(store.lexical_search("rust", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = seeded().await;
        let err = store
            .insert(&[chunk("a.md", 0, "memory", "again", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate chunk id"));
    }

    #[tokio::test]
    async fn test_replace_document_swaps_chunks_and_fingerprint() {
        let store = seeded().await;
        store
            .replace_document(
                "a.md",
                "fp-a2",
                "memory",
                &[chunk("a.md", 0, "memory", "rewritten", vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        assert_eq!(store.list_fingerprints().await.unwrap()["a.md"], "fp-a2");
        assert_eq!(store.get_chunk("a.md::0").await.unwrap().unwrap().text, "rewritten");
        assert!(store.get_chunk("a.md::1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_replace_changes_nothing() {
        let store = seeded().await;
        let twice = chunk("a.md", 0, "memory", "new", vec![1.0, 0.0]);
        let err = store
            .replace_document("a.md", "fp-a2", "memory", &[twice.clone(), twice])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate chunk id"));
        assert_eq!(store.list_fingerprints().await.unwrap()["a.md"], "fp-a");
        assert_eq!(
            store.get_chunk("a.md::0").await.unwrap().unwrap().text,
            "rust borrow checker notes"
        );
    }

    #[tokio::test]
    async fn test_stats_and_model() {
        let store = seeded().await;
        store.set_embedding_model("m1").await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.embedding_model.as_deref(), Some("m1"));
        assert_eq!(stats.sources["memory"].chunks, 2);
        assert_eq!(stats.sources["sessions"].documents, 1);
    }
}
