//! Embedding generation.
//!
//! One service abstracts over the configured embedding backend:
//! - `local`: in-process model, loaded lazily once and reused
//! - `openai` / `gemini`: one REST call per text
//!
//! Remote failures retry exactly once on the local backend so ingestion
//! and retrieval keep working offline; a local failure propagates as-is.

mod gemini;
mod local;
mod openai;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::core::errors::ApiError;

pub use local::{LocalEmbedder, LOCAL_EMBEDDING_DIM};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Local,
    OpenAi,
    Gemini,
}

impl Default for EmbeddingProvider {
    fn default() -> Self {
        EmbeddingProvider::Local
    }
}

pub struct EmbeddingService {
    provider: EmbeddingProvider,
    api_key: Option<String>,
    client: reqwest::Client,
    local: OnceCell<LocalEmbedder>,
}

impl EmbeddingService {
    pub fn new(
        provider: EmbeddingProvider,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            provider,
            api_key,
            client,
            local: OnceCell::new(),
        }
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    /// Generate an embedding for one text with the configured backend.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        match self.provider {
            EmbeddingProvider::Local => self.embed_local(text).await,
            EmbeddingProvider::OpenAi | EmbeddingProvider::Gemini => {
                match self.embed_remote(text).await {
                    Ok(vector) => Ok(vector),
                    Err(err) => {
                        tracing::warn!(
                            "Remote embedding failed, falling back to local: {}",
                            err
                        );
                        self.embed_local(text).await
                    }
                }
            }
        }
    }

    async fn embed_remote(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        match self.provider {
            EmbeddingProvider::OpenAi => {
                let api_key = self.require_key("OpenAI")?;
                openai::embed(&self.client, text, api_key).await
            }
            EmbeddingProvider::Gemini => {
                let api_key = self.require_key("Gemini")?;
                gemini::embed(&self.client, text, api_key).await
            }
            EmbeddingProvider::Local => unreachable!("local is not a remote backend"),
        }
    }

    async fn embed_local(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let embedder = self
            .local
            .get_or_init(|| async {
                tracing::info!("Loading local embedding model (one-time)");
                LocalEmbedder::load()
            })
            .await;

        Ok(embedder.embed(text))
    }

    fn require_key(&self, provider_name: &str) -> Result<&str, ApiError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest(format!("{} API key required", provider_name))
            })
    }
}

/// Cosine similarity between two equal-length vectors.
///
/// Errors on empty input or a length mismatch rather than coercing; a
/// zero-magnitude side yields 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, ApiError> {
    if a.is_empty() || b.is_empty() {
        return Err(ApiError::BadRequest(
            "Vectors must not be empty".to_string(),
        ));
    }
    if a.len() != b.len() {
        return Err(ApiError::BadRequest(format!(
            "Vector length mismatch: {} != {}",
            a.len(),
            b.len()
        )));
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        Ok(0.0)
    } else {
        Ok(dot / denom)
    }
}
