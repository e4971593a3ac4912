use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{ChatMessage, LlmProvider};
use super::LlmConfig;
use crate::core::errors::ApiError;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const FALLBACK_MODELS: [&str; 3] = ["llama3", "mistral", "gemma"];

#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
}

impl OllamaProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn base_url(config: &LlmConfig) -> String {
        config
            .base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }
}

/// One NDJSON line → (fragment, done flag).
fn parse_stream_line(line: &str) -> (Option<String>, bool) {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return (None, false);
    };

    let content = value["message"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    let done = value["done"].as_bool().unwrap_or(false);

    (content, done)
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        config: &LlmConfig,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!("{}/api/chat", Self::base_url(config));

        let body = json!({
            "model": config.model,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "Ollama API request failed: {}",
                response.status()
            )));
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
                            if line.is_empty() {
                                continue;
                            }

                            let (content, done) = parse_stream_line(&line);
                            if let Some(content) = content {
                                if tx.send(Ok(content)).await.is_err() {
                                    return;
                                }
                            }
                            if done {
                                return;
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
        let url = format!("{}/api/tags", Self::base_url(config));

        let result = async {
            let response = self.client.get(&url).send().await.map_err(ApiError::internal)?;

            if !response.status().is_success() {
                return Err(ApiError::Internal(format!(
                    "Failed to fetch Ollama models: {}",
                    response.status()
                )));
            }

            let payload: Value = response.json().await.map_err(ApiError::internal)?;
            let models: Vec<String> = payload["models"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|m| m["name"].as_str())
                        .map(|name| name.to_string())
                        .collect()
                })
                .unwrap_or_default();
            Ok::<Vec<String>, ApiError>(models)
        }
        .await;

        match result {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => fallback(),
            Err(err) => {
                tracing::warn!("Error fetching Ollama models: {}", err);
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_and_done() {
        let (content, done) =
            parse_stream_line(r#"{"message":{"content":"Hel"},"done":false}"#);
        assert_eq!(content, Some("Hel".to_string()));
        assert!(!done);

        let (content, done) = parse_stream_line(r#"{"message":{"content":""},"done":true}"#);
        assert_eq!(content, None);
        assert!(done);
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let (content, done) = parse_stream_line("not json at all");
        assert_eq!(content, None);
        assert!(!done);
    }

    #[test]
    fn base_url_falls_back_to_local_default() {
        let mut config = LlmConfig {
            provider: super::super::ProviderKind::Ollama,
            api_key: None,
            model: "llama3".to_string(),
            base_url: None,
        };
        assert_eq!(OllamaProvider::base_url(&config), "http://localhost:11434");

        config.base_url = Some("http://127.0.0.1:9999/".to_string());
        assert_eq!(OllamaProvider::base_url(&config), "http://127.0.0.1:9999");
    }
}
