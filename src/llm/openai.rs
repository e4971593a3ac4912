use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{ChatMessage, LlmProvider};
use super::LlmConfig;
use crate::core::errors::ApiError;

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODELS_URL: &str = "https://api.openai.com/v1/models";

const FALLBACK_MODELS: [&str; 3] = ["gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"];

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
}

impl OpenAiProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Extract the delta text from one SSE `data:` payload.
fn delta_from_sse_data(data: &str) -> Option<String> {
    let json: Value = serde_json::from_str(data).ok()?;
    json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        config: &LlmConfig,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ApiError::BadRequest("OpenAI API Key is required".to_string()))?;

        let body = json!({
            "model": config.model,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .client
            .post(CHAT_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("OpenAI API request failed")
                .to_string();
            return Err(ApiError::Internal(message));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer = buffer[pos + 1..].to_string();

                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            if data == "[DONE]" {
                                return;
                            }
                            if let Some(content) = delta_from_sse_data(data) {
                                if tx.send(Ok(content)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ApiError::internal(err))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn list_models(&self, config: &LlmConfig) -> Vec<String> {
        let fallback = || FALLBACK_MODELS.iter().map(|m| m.to_string()).collect();

        let Some(api_key) = config.api_key.as_deref().filter(|key| !key.is_empty()) else {
            return fallback();
        };

        let result = async {
            let response = self
                .client
                .get(MODELS_URL)
                .bearer_auth(api_key)
                .send()
                .await
                .map_err(ApiError::internal)?;

            if !response.status().is_success() {
                return Err(ApiError::Internal(format!(
                    "Failed to fetch models: {}",
                    response.status()
                )));
            }

            let payload: Value = response.json().await.map_err(ApiError::internal)?;
            let mut models: Vec<String> = payload["data"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|m| m["id"].as_str())
                        .filter(|id| id.starts_with("gpt"))
                        .map(|id| id.to_string())
                        .collect()
                })
                .unwrap_or_default();
            models.sort();
            Ok::<Vec<String>, ApiError>(models)
        }
        .await;

        match result {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => fallback(),
            Err(err) => {
                tracing::warn!("Error fetching OpenAI models: {}", err);
                fallback()
            }
        }
    }
}
