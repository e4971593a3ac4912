//! Embedded vector store.
//!
//! SQLite for persistence, brute-force cosine similarity for search.
//! The linear scan is fine at this scale: one local user, one knowledge
//! base of at most a few thousand chunks.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{VectorEntry, VectorMetadata, VectorSearchResult, VectorStore};
use crate::core::errors::ApiError;
use crate::knowledge::DocumentSource;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_entries (
                id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                doc_name TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                source_url TEXT,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_doc ON vector_entries(doc_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_source ON vector_entries(source)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Score helper for the scan. Mismatched or empty vectors score 0.0
    /// so a stray entry can never error out a whole search.
    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_metadata(row: &sqlx::sqlite::SqliteRow) -> VectorMetadata {
        let source_str: String = row.get("source");
        let chunk_index: i64 = row.get("chunk_index");

        VectorMetadata {
            doc_id: row.get("doc_id"),
            doc_name: row.get("doc_name"),
            chunk_index: chunk_index as usize,
            text: row.get("text"),
            source: DocumentSource::parse(&source_str).unwrap_or(DocumentSource::Pdf),
            source_url: row.get("source_url"),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn add_vectors_batch(&self, entries: Vec<VectorEntry>) -> Result<(), ApiError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for entry in &entries {
            let blob = Self::serialize_embedding(&entry.vector);

            sqlx::query(
                "INSERT OR REPLACE INTO vector_entries
                     (id, doc_id, doc_name, chunk_index, text, source, source_url, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&entry.id)
            .bind(&entry.metadata.doc_id)
            .bind(&entry.metadata.doc_name)
            .bind(entry.metadata.chunk_index as i64)
            .bind(&entry.metadata.text)
            .bind(entry.metadata.source.as_str())
            .bind(&entry.metadata.source_url)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorSearchResult>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, doc_id, doc_name, chunk_index, text, source, source_url, embedding
             FROM vector_entries",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<VectorSearchResult> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);

                VectorSearchResult {
                    id: row.get("id"),
                    score: Self::cosine(query_vector, &stored),
                    metadata: Self::row_to_metadata(row),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM vector_entries WHERE doc_id = ?1")
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn delete_by_source(&self, source: DocumentSource) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM vector_entries WHERE source = ?1")
            .bind(source.as_str())
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM vector_entries")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }
}
