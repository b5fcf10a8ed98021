//! Hybrid query engine.
//!
//! Runs vector and lexical retrieval against an [`IndexStore`] and fuses the
//! two candidate lists into one ranked result list. The engine never embeds
//! anything itself: the caller passes the query vector, or `None` when no
//! provider is available.
//!
//! # Fusion
//!
//! 1. Fetch `max_results × candidate_multiplier` candidates from each
//!    modality, both filtered by `source_filter`.
//! 2. Vector score: `1 − cosine_distance` (not clamped).
//! 3. Text score: `1 / (1 + rank)` where `rank` is the 0-based position in
//!    the lexical list. Raw BM25 values are not comparable across queries,
//!    so only the order is used.
//! 4. Union on `chunk_id`; a chunk missing from one list scores 0 there.
//!    `fused = vw × vector + tw × text` with the weights normalised to sum
//!    to 1.
//! 5. Sort descending (ties by `chunk_id`), drop everything under
//!    `min_score`, keep `max_results`.
//!
//! A modality that fails or has no input contributes nothing. When only one
//! list has candidates, its score is used unweighted (weight 1.0), so a
//! keyword-only search is ranked and thresholded on `1 / (1 + rank)` alone.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::store::{ChunkCandidate, IndexStore};

/// Marker appended to snippets cut at `snippet_chars`.
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub vector_weight: f64,
    pub text_weight: f64,
    /// Candidates per modality = `max_results × candidate_multiplier`.
    pub candidate_multiplier: usize,
    pub min_score: f64,
    pub max_results: usize,
    pub snippet_chars: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            text_weight: 0.3,
            candidate_multiplier: 4,
            min_score: 0.35,
            max_results: 6,
            snippet_chars: 700,
        }
    }
}

impl SearchParams {
    fn candidate_k(&self) -> usize {
        self.max_results.saturating_mul(self.candidate_multiplier.max(1))
    }

    /// Weights scaled to sum to 1.
    fn normalized_weights(&self) -> (f64, f64) {
        let sum = self.vector_weight + self.text_weight;
        if sum > 0.0 {
            (self.vector_weight / sum, self.text_weight / sum)
        } else {
            (0.5, 0.5)
        }
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Query embedding; `None` disables the vector modality.
    pub query_vec: Option<&'a [f32]>,
    pub source_filter: Option<&'a str>,
    pub params: SearchParams,
    /// If true, populate [`ScoreExplanation`] on each result.
    pub explain: bool,
}

/// One ranked passage.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResult {
    pub chunk_id: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub source_label: String,
    /// Fused score rounded to 4 decimals.
    pub score: f64,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Scoring breakdown for a result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoreExplanation {
    /// `1 − cosine_distance`, or 0 when absent from the vector list.
    pub vector_score: f64,
    /// `1 / (1 + rank)`, or 0 when absent from the lexical list.
    pub text_score: f64,
    pub vector_weight: f64,
    pub text_weight: f64,
}

/// Results plus which modalities actually contributed.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub results: Vec<QueryResult>,
    pub vector_available: bool,
    pub lexical_available: bool,
}

/// Score of the item at 0-based `rank` in a lexical list.
pub fn rank_to_score(rank: usize) -> f64 {
    1.0 / (1.0 + rank as f64)
}

/// Round to 4 decimal places.
pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Cut `text` to `max_chars` characters, marking the cut.
pub fn make_snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut s: String = text.chars().take(max_chars).collect();
    s.push_str(TRUNCATION_MARKER);
    s
}

struct Fused<'c> {
    candidate: &'c ChunkCandidate,
    vector_score: f64,
    /// `None` until the chunk is seen in the lexical list.
    text_score: Option<f64>,
    score: f64,
}

/// Fuse a vector list (ascending distance) and a lexical list (best first)
/// into ranked results. Pure; applies threshold, limit, snippet, rounding.
pub fn fuse(
    vector: &[ChunkCandidate],
    lexical: &[ChunkCandidate],
    params: &SearchParams,
    explain: bool,
) -> Vec<QueryResult> {
    // A single contributing modality ranks on its own, unweighted.
    let (vw, tw) = match (vector.is_empty(), lexical.is_empty()) {
        (false, true) => (1.0, 0.0),
        (true, false) => (0.0, 1.0),
        _ => params.normalized_weights(),
    };

    let mut merged: BTreeMap<&str, Fused<'_>> = BTreeMap::new();
    for c in vector {
        merged.entry(c.chunk_id.as_str()).or_insert(Fused {
            candidate: c,
            vector_score: 1.0 - c.raw_score,
            text_score: None,
            score: 0.0,
        });
    }
    for (rank, c) in lexical.iter().enumerate() {
        let entry = merged.entry(c.chunk_id.as_str()).or_insert(Fused {
            candidate: c,
            vector_score: 0.0,
            text_score: None,
            score: 0.0,
        });
        // Keep the best rank if a backend lists a chunk twice.
        if entry.text_score.is_none() {
            entry.text_score = Some(rank_to_score(rank));
        }
    }

    let mut fused: Vec<Fused<'_>> = merged
        .into_values()
        .map(|mut f| {
            f.score = vw * f.vector_score + tw * f.text_score.unwrap_or(0.0);
            f
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.chunk_id.cmp(&b.candidate.chunk_id))
    });

    fused
        .into_iter()
        .filter(|f| f.score >= params.min_score)
        .take(params.max_results)
        .map(|f| QueryResult {
            chunk_id: f.candidate.chunk_id.clone(),
            path: f.candidate.path.clone(),
            start_line: f.candidate.start_line,
            end_line: f.candidate.end_line,
            source_label: f.candidate.source_label.clone(),
            score: round_score(f.score),
            snippet: make_snippet(&f.candidate.text, params.snippet_chars),
            explain: explain.then(|| ScoreExplanation {
                vector_score: round_score(f.vector_score),
                text_score: round_score(f.text_score.unwrap_or(0.0)),
                vector_weight: vw,
                text_weight: tw,
            }),
        })
        .collect()
}

/// Run a hybrid search against an [`IndexStore`] backend.
///
/// Never fails: a modality whose store call errors is logged and treated as
/// empty, so callers always get a (possibly empty) [`SearchOutcome`].
pub async fn search<S: IndexStore + ?Sized>(store: &S, req: &SearchRequest<'_>) -> SearchOutcome {
    if req.query.trim().is_empty() {
        return SearchOutcome::default();
    }

    let k = req.params.candidate_k();

    let (vector, vector_available) = match req.query_vec {
        Some(qv) => match store.vector_search(qv, k, req.source_filter).await {
            Ok(v) => (v, true),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "vector search failed, continuing without it");
                (Vec::new(), false)
            }
        },
        None => {
            debug!("no query vector, vector modality skipped");
            (Vec::new(), false)
        }
    };

    let (lexical, lexical_available) =
        match store.lexical_search(req.query, k, req.source_filter).await {
            Ok(v) => (v, true),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "lexical search failed, continuing without it");
                (Vec::new(), false)
            }
        };

    debug!(
        vector = vector.len(),
        lexical = lexical.len(),
        "fusing candidates"
    );

    SearchOutcome {
        results: fuse(&vector, &lexical, &req.params, req.explain),
        vector_available,
        lexical_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkDraft};
    use crate::store::memory::InMemoryStore;

    fn cand(id: &str, raw: f64) -> ChunkCandidate {
        ChunkCandidate {
            chunk_id: id.to_string(),
            path: format!("{}.md", id),
            source_label: "memory".to_string(),
            start_line: 1,
            end_line: 2,
            text: format!("text of {}", id),
            raw_score: raw,
        }
    }

    fn params(min_score: f64) -> SearchParams {
        SearchParams {
            min_score,
            ..Default::default()
        }
    }

    /// A: vector 0.9 only (0.63). B: vector 0.6 + lexical rank 0 (0.72).
    /// C: lexical rank 1 only (0.15).
    fn scenario() -> (Vec<ChunkCandidate>, Vec<ChunkCandidate>) {
        (
            vec![cand("A", 0.1), cand("B", 0.4)],
            vec![cand("B", 9.0), cand("C", 4.0)],
        )
    }

    #[test]
    fn test_rank_to_score() {
        assert_eq!(rank_to_score(0), 1.0);
        assert_eq!(rank_to_score(1), 0.5);
        assert!((rank_to_score(2) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fusion_order() {
        let (v, l) = scenario();
        let results = fuse(&v, &l, &params(0.0), false);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.72, 0.63, 0.15]);
    }

    #[test]
    fn test_min_score_threshold() {
        let (v, l) = scenario();
        let results = fuse(&v, &l, &params(0.5), false);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_default_threshold_drops_lexical_only_tail() {
        let (v, l) = scenario();
        assert_eq!(fuse(&v, &l, &SearchParams::default(), false).len(), 2);
    }

    #[test]
    fn test_max_results_and_tie_break() {
        let v = vec![cand("b", 0.2), cand("a", 0.2), cand("c", 0.2)];
        let p = SearchParams {
            max_results: 2,
            min_score: 0.0,
            ..Default::default()
        };
        let ids: Vec<String> = fuse(&v, &[], &p, false)
            .into_iter()
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_weights_are_normalized() {
        let p = SearchParams {
            vector_weight: 7.0,
            text_weight: 3.0,
            min_score: 0.0,
            ..Default::default()
        };
        let (v, l) = scenario();
        assert_eq!(fuse(&v, &l, &p, false)[0].score, 0.72);
    }

    #[test]
    fn test_explain_breakdown() {
        let (v, l) = scenario();
        let results = fuse(&v, &l, &params(0.0), true);
        let b = results[0].explain.as_ref().unwrap();
        assert_eq!(b.vector_score, 0.6);
        assert_eq!(b.text_score, 1.0);
        assert!(fuse(&v, &l, &params(0.0), false)[0].explain.is_none());
    }

    #[test]
    fn test_snippet_truncation() {
        assert_eq!(make_snippet("short", 700), "short");
        let long = "é".repeat(710);
        let s = make_snippet(&long, 700);
        assert!(s.ends_with(TRUNCATION_MARKER));
        assert_eq!(s.chars().count(), 700 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123456), 0.1235);
        assert_eq!(round_score(0.72), 0.72);
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let store = InMemoryStore::new();
        let req = SearchRequest {
            query: "anything",
            query_vec: Some(&[1.0f32, 0.0][..]),
            source_filter: None,
            params: SearchParams::default(),
            explain: false,
        };
        let out = search(&store, &req).await;
        assert!(out.results.is_empty());
        assert!(out.vector_available);
        assert!(out.lexical_available);
    }

    #[tokio::test]
    async fn test_search_without_vector_uses_lexical_only() {
        let store = InMemoryStore::new();
        let draft = ChunkDraft {
            text: "release checklist".into(),
            start_line: 1,
            end_line: 1,
        };
        store
            .insert(&[Chunk::new("r.md", 0, "memory", draft, "fp", vec![1.0]).unwrap()])
            .await
            .unwrap();
        store.rebuild_lexical_index().await.unwrap();

        let req = SearchRequest {
            query: "checklist",
            query_vec: None,
            source_filter: None,
            params: params(0.0),
            explain: false,
        };
        let out = search(&store, &req).await;
        assert!(!out.vector_available);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].score, 1.0);
        assert_eq!((out.results[0].start_line, out.results[0].end_line), (1, 1));
    }

    #[tokio::test]
    async fn test_lexical_only_hit_survives_default_threshold() {
        let store = InMemoryStore::new();
        let draft = ChunkDraft {
            text: "release checklist".into(),
            start_line: 1,
            end_line: 1,
        };
        store
            .insert(&[Chunk::new("r.md", 0, "memory", draft, "fp", vec![1.0]).unwrap()])
            .await
            .unwrap();
        store.rebuild_lexical_index().await.unwrap();

        let req = SearchRequest {
            query: "checklist",
            query_vec: None,
            source_filter: None,
            params: SearchParams::default(),
            explain: true,
        };
        let out = search(&store, &req).await;
        assert!(out.lexical_available);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].score, 1.0);
        let ex = out.results[0].explain.as_ref().unwrap();
        assert_eq!((ex.vector_weight, ex.text_weight), (0.0, 1.0));
    }

    #[test]
    fn test_single_modality_scores_unweighted() {
        let p = SearchParams::default();

        // rank 0 → 1.0, rank 1 → 0.5, rank 2 → 0.333 (dropped at 0.35)
        let lexical = vec![cand("x", 3.0), cand("y", 2.0), cand("z", 1.0)];
        let scores: Vec<f64> = fuse(&[], &lexical, &p, false)
            .iter()
            .map(|r| r.score)
            .collect();
        assert_eq!(scores, vec![1.0, 0.5]);

        let vector = vec![cand("v", 0.1), cand("w", 0.5), cand("u", 0.8)];
        let results = fuse(&vector, &[], &p, false);
        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.5]);
    }

    #[test]
    fn test_duplicate_lexical_entry_keeps_best_rank() {
        let lexical = vec![cand("x", 3.0), cand("y", 2.0), cand("x", 1.0)];
        let results = fuse(&[], &lexical, &params(0.0), false);
        assert_eq!(results[0].chunk_id, "x");
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let store = InMemoryStore::new();
        let req = SearchRequest {
            query: "   ",
            query_vec: None,
            source_filter: None,
            params: SearchParams::default(),
            explain: false,
        };
        assert!(search(&store, &req).await.results.is_empty());
    }
}
