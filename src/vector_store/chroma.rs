//! External vector-search service backend (Chroma over REST).
//!
//! The service owns nearest-neighbor search; this client only translates
//! between the store contract and Chroma's collection API. Distances from
//! the cosine-space collection are converted to similarity scores so
//! callers see the same score semantics as the embedded backend.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{VectorEntry, VectorMetadata, VectorSearchResult, VectorStore};
use crate::core::errors::ApiError;
use crate::knowledge::DocumentSource;

pub struct ChromaStore {
    client: Client,
    base_url: String,
    collection_name: String,
    /// Resolved once at connect time; replaced only by `clear`, which
    /// drops and recreates the collection.
    collection_id: RwLock<String>,
}

impl ChromaStore {
    /// Connect and resolve the collection (created on first use with
    /// cosine space). Fails with a descriptive error when the service is
    /// unreachable.
    pub async fn connect(
        client: Client,
        base_url: &str,
        collection_name: &str,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let collection_id =
            Self::get_or_create_collection(&client, &base_url, collection_name).await?;

        Ok(Self {
            client,
            base_url,
            collection_name: collection_name.to_string(),
            collection_id: RwLock::new(collection_id),
        })
    }

    async fn get_or_create_collection(
        client: &Client,
        base_url: &str,
        name: &str,
    ) -> Result<String, ApiError> {
        let url = format!("{}/api/v1/collections", base_url);
        let body = json!({
            "name": name,
            "metadata": { "hnsw:space": "cosine" },
            "get_or_create": true,
        });

        let response = client.post(&url).json(&body).send().await.map_err(|err| {
            ApiError::Internal(format!(
                "Could not connect to Chroma at {}. Is the server running? ({})",
                base_url, err
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Chroma collection setup failed: {} {}",
                status, text
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::internal)?;
        payload["id"]
            .as_str()
            .map(|id| id.to_string())
            .ok_or_else(|| ApiError::Internal("Chroma collection response missing id".to_string()))
    }

    fn collection_url(&self, suffix: &str) -> String {
        let id = self
            .collection_id
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        format!("{}/api/v1/collections/{}/{}", self.base_url, id, suffix)
    }

    async fn post(&self, url: &str, body: Value) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Chroma request failed: {} {}",
                status, text
            )));
        }

        response.json().await.map_err(ApiError::internal)
    }

    fn metadata_to_value(metadata: &VectorMetadata) -> Value {
        json!({
            "docId": metadata.doc_id,
            "docName": metadata.doc_name,
            "chunkIndex": metadata.chunk_index,
            "text": metadata.text,
            "source": metadata.source.as_str(),
            "sourceUrl": metadata.source_url.clone().unwrap_or_default(),
        })
    }

    fn value_to_metadata(value: &Value) -> VectorMetadata {
        let source = value
            .get("source")
            .and_then(|v| v.as_str())
            .and_then(DocumentSource::parse)
            .unwrap_or(DocumentSource::Pdf);
        let source_url = value
            .get("sourceUrl")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        VectorMetadata {
            doc_id: value
                .get("docId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            doc_name: value
                .get("docName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            chunk_index: value
                .get("chunkIndex")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            text: value
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            source,
            source_url,
        }
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn backend_name(&self) -> &'static str {
        "chroma"
    }

    async fn add_vectors_batch(&self, entries: Vec<VectorEntry>) -> Result<(), ApiError> {
        if entries.is_empty() {
            return Ok(());
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let embeddings: Vec<&Vec<f32>> = entries.iter().map(|e| &e.vector).collect();
        let metadatas: Vec<Value> = entries
            .iter()
            .map(|e| Self::metadata_to_value(&e.metadata))
            .collect();
        let documents: Vec<&str> = entries.iter().map(|e| e.metadata.text.as_str()).collect();

        let body = json!({
            "ids": ids,
            "embeddings": embeddings,
            "metadatas": metadatas,
            "documents": documents,
        });

        self.post(&self.collection_url("upsert"), body).await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorSearchResult>, ApiError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let body = json!({
            "query_embeddings": [query_vector],
            "n_results": top_k,
            "include": ["metadatas", "documents", "distances"],
        });

        let payload = self.post(&self.collection_url("query"), body).await?;

        let ids = payload["ids"][0].as_array().cloned().unwrap_or_default();
        let distances = payload["distances"][0]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let metadatas = payload["metadatas"][0]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let Some(id) = id.as_str() else { continue };
            // Cosine distance: 0 = identical. Convert to similarity so
            // both backends rank the same way.
            let distance = distances.get(i).and_then(|v| v.as_f64()).unwrap_or(0.0);
            let metadata = metadatas
                .get(i)
                .map(Self::value_to_metadata)
                .unwrap_or_else(|| Self::value_to_metadata(&Value::Null));

            results.push(VectorSearchResult {
                id: id.to_string(),
                score: (1.0 - distance) as f32,
                metadata,
            });
        }

        Ok(results)
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<(), ApiError> {
        let body = json!({ "where": { "docId": doc_id } });
        self.post(&self.collection_url("delete"), body).await?;
        Ok(())
    }

    async fn delete_by_source(&self, source: DocumentSource) -> Result<(), ApiError> {
        let body = json!({ "where": { "source": source.as_str() } });
        self.post(&self.collection_url("delete"), body).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ApiError> {
        // Drop the collection and recreate it so later writes still have
        // somewhere to land.
        let url = format!(
            "{}/api/v1/collections/{}",
            self.base_url, self.collection_name
        );
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Chroma clear failed: {} {}",
                status, text
            )));
        }

        let id =
            Self::get_or_create_collection(&self.client, &self.base_url, &self.collection_name)
                .await?;
        if let Ok(mut guard) = self.collection_id.write() {
            *guard = id;
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let url = self.collection_url("count");
        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(_) => return Ok(0),
        };

        if !response.status().is_success() {
            return Ok(0);
        }

        let payload: Value = match response.json().await {
            Ok(value) => value,
            Err(_) => return Ok(0),
        };

        Ok(payload.as_u64().unwrap_or(0) as usize)
    }
}
