//! SQLite-backed [`IndexStore`] implementation.
//!
//! Chunks, vectors, and fingerprints live in ordinary tables; keyword search
//! runs on the FTS5 table `chunks_fts`, which is only refreshed by
//! [`rebuild_lexical_index`](IndexStore::rebuild_lexical_index). Vector
//! search is brute-force cosine distance over the stored BLOBs.
//!
//! Each mutating call runs in its own transaction; `replace_document`
//! swaps a document's chunks and fingerprint in a single one.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use memdex_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use memdex_core::models::Chunk;
use memdex_core::store::{ChunkCandidate, IndexStats, IndexStore};

const EMBEDDING_MODEL_KEY: &str = "embedding_model";

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Turn free text into an FTS5 `MATCH` expression.
///
/// Every alphanumeric term is quoted and the terms are OR-ed, so user input
/// can never be parsed as FTS5 syntax. Returns `None` when nothing is left.
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn candidate_from_row(row: &SqliteRow, raw_score: f64) -> ChunkCandidate {
    ChunkCandidate {
        chunk_id: row.get("chunk_id"),
        path: row.get("path"),
        source_label: row.get("source_label"),
        start_line: row.get::<i64, _>("start_line") as usize,
        end_line: row.get::<i64, _>("end_line") as usize,
        text: row.get("text"),
        raw_score,
    }
}

async fn insert_chunks(conn: &mut SqliteConnection, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (chunk_id, path, ordinal, source_label, text,
                                start_line, end_line, doc_fingerprint, embedding, dims)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.path)
        .bind(chunk.ordinal as i64)
        .bind(&chunk.source_label)
        .bind(&chunk.text)
        .bind(chunk.start_line as i64)
        .bind(chunk.end_line as i64)
        .bind(&chunk.doc_fingerprint)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.embedding.len() as i64)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("insert chunk {}", chunk.chunk_id))?;
    }
    Ok(())
}

async fn delete_path(conn: &mut SqliteConnection, path: &str) -> Result<()> {
    sqlx::query("DELETE FROM chunks_fts WHERE path = ?")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE path = ?")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM documents WHERE path = ?")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn upsert_document(
    conn: &mut SqliteConnection,
    path: &str,
    fingerprint: &str,
    source_label: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (path, fingerprint, source_label, indexed_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            fingerprint = excluded.fingerprint,
            source_label = excluded.source_label,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(path)
    .bind(fingerprint)
    .bind(source_label)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn insert(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_chunks(&mut tx, chunks).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_path(&self, path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_path(&mut tx, path).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_document(
        &self,
        path: &str,
        fingerprint: &str,
        source_label: &str,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_document(&mut conn, path, fingerprint, source_label).await
    }

    /// One transaction: the fingerprint is only visible together with the
    /// chunks it describes.
    async fn replace_document(
        &self,
        path: &str,
        fingerprint: &str,
        source_label: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_path(&mut tx, path).await?;
        insert_chunks(&mut tx, chunks).await?;
        upsert_document(&mut tx, path, fingerprint, source_label).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, path, source_label, start_line, end_line, text, embedding
            FROM chunks
            WHERE (?1 IS NULL OR source_label = ?1)
            "#,
        )
        .bind(source_filter)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let distance = cosine_distance(query_vec, &blob_to_vec(&blob));
                candidate_from_row(row, distance)
            })
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
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        // bm25() is lower-is-better; negate so raw_score reads best-first.
        let rows = sqlx::query(
            r#"
            SELECT c.chunk_id, c.path, c.source_label, c.start_line, c.end_line, c.text,
                   bm25(chunks_fts) AS rank
            FROM chunks_fts
            JOIN chunks c ON c.chunk_id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ?1
              AND (?2 IS NULL OR c.source_label = ?2)
            ORDER BY rank, c.chunk_id
            LIMIT ?3
            "#,
        )
        .bind(&match_expr)
        .bind(source_filter)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                candidate_from_row(row, -rank)
            })
            .collect())
    }

    async fn list_fingerprints(&self) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT path, fingerprint FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("path"), r.get("fingerprint")))
            .collect())
    }

    async fn rebuild_lexical_index(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks_fts")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO chunks_fts (chunk_id, path, source_label, text)
            SELECT chunk_id, path, source_label, text FROM chunks
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(EMBEDDING_MODEL_KEY)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn set_embedding_model(&self, model: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(EMBEDDING_MODEL_KEY)
        .bind(model)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            r#"
            SELECT chunk_id, path, ordinal, source_label, text, start_line, end_line,
                   doc_fingerprint, embedding
            FROM chunks WHERE chunk_id = ?
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let blob: Vec<u8> = r.get("embedding");
            Chunk {
                chunk_id: r.get("chunk_id"),
                path: r.get("path"),
                ordinal: r.get::<i64, _>("ordinal") as usize,
                source_label: r.get("source_label"),
                text: r.get("text"),
                start_line: r.get::<i64, _>("start_line") as usize,
                end_line: r.get::<i64, _>("end_line") as usize,
                doc_fingerprint: r.get("doc_fingerprint"),
                embedding: blob_to_vec(&blob),
            }
        }))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        let mut stats = IndexStats {
            documents: documents as usize,
            chunks: chunks as usize,
            embedding_model: self.embedding_model().await?,
            ..Default::default()
        };

        let doc_rows = sqlx::query(
            "SELECT source_label, COUNT(*) AS n FROM documents GROUP BY source_label",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &doc_rows {
            let label: String = row.get("source_label");
            stats.sources.entry(label).or_default().documents = row.get::<i64, _>("n") as usize;
        }

        let chunk_rows =
            sqlx::query("SELECT source_label, COUNT(*) AS n FROM chunks GROUP BY source_label")
                .fetch_all(&self.pool)
                .await?;
        for row in &chunk_rows {
            let label: String = row.get("source_label");
            stats.sources.entry(label).or_default().chunks = row.get::<i64, _>("n") as usize;
        }

        Ok(stats)
    }
}
