use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::LlmConfig;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider tag (e.g. "openai", "gemini", "ollama").
    fn name(&self) -> &str;

    /// Streaming chat completion.
    ///
    /// Returns a finite sequence of text fragments in arrival order; the
    /// channel closes when the upstream transport signals completion.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        config: &LlmConfig,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;

    /// Available model ids. Best-effort: falls back to a static list when
    /// the provider cannot be queried.
    async fn list_models(&self, config: &LlmConfig) -> Vec<String>;
}
