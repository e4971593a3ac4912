//! Vector storage behind one backend-agnostic contract.
//!
//! Two interchangeable implementations:
//! - `ChromaStore`: external vector-search service over REST
//! - `SqliteVectorStore`: embedded fallback with brute-force cosine scan
//!
//! The backend is selected once at startup by [`connect`]: the external
//! service is probed first and a failure falls back permanently to the
//! embedded store for the rest of the session.

mod chroma;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AppPaths, VectorSettings};
use crate::core::errors::ApiError;
use crate::knowledge::{Document, DocumentSource};

pub use chroma::ChromaStore;
pub use sqlite::SqliteVectorStore;

/// Denormalized per-chunk metadata: enough to render a citation without
/// consulting the document catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub doc_id: String,
    pub doc_name: String,
    pub chunk_index: usize,
    pub text: String,
    pub source: DocumentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// A stored embedding with its metadata.
///
/// Ids follow `{doc_id}_chunk_{index}`, so re-ingesting the same chunk
/// index overwrites in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

impl VectorEntry {
    pub fn chunk_id(doc: &Document, chunk_index: usize) -> String {
        format!("{}_chunk_{}", doc.id, chunk_index)
    }
}

/// Result of a similarity search. Higher score = more relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Contract both backends satisfy.
///
/// All mutations are idempotent: upserts overwrite by id, deletes of
/// absent ids/sources are no-ops.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short tag identifying the backend, for logs and stats.
    fn backend_name(&self) -> &'static str;

    /// Upsert a batch of entries.
    async fn add_vectors_batch(&self, entries: Vec<VectorEntry>) -> Result<(), ApiError>;

    /// Up to `top_k` entries ordered by descending similarity.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorSearchResult>, ApiError>;

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<(), ApiError>;

    async fn delete_by_source(&self, source: DocumentSource) -> Result<(), ApiError>;

    async fn clear(&self) -> Result<(), ApiError>;

    /// Best-effort entry count; the external backend may return a
    /// placeholder when the service has no cheap count.
    async fn count(&self) -> Result<usize, ApiError>;
}

/// Resolve the session's vector store once, at startup.
///
/// Prefers the external service; on connection failure falls back to the
/// embedded store for the remainder of the process. The choice is never
/// re-probed.
pub async fn connect(
    settings: &VectorSettings,
    paths: &AppPaths,
    client: reqwest::Client,
) -> Result<Arc<dyn VectorStore>, ApiError> {
    match ChromaStore::connect(client, &settings.chroma_url, &settings.collection).await {
        Ok(store) => {
            tracing::info!("Using Chroma vector store at {}", settings.chroma_url);
            Ok(Arc::new(store))
        }
        Err(err) => {
            tracing::warn!(
                "Chroma not available at {}, falling back to embedded store: {}",
                settings.chroma_url,
                err
            );
            let store = SqliteVectorStore::with_path(paths.vector_db_path.clone()).await?;
            tracing::info!("Using embedded vector store");
            Ok(Arc::new(store))
        }
    }
}
