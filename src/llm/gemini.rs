use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{ChatMessage, LlmProvider};
use super::LlmConfig;
use crate::core::errors::ApiError;

const STATIC_MODELS: [&str; 3] = ["gemini-1.5-flash", "gemini-1.5-pro", "gemini-1.0-pro"];

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
}

impl GeminiProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Pull every complete top-level JSON object out of `buffer`, leaving any
/// partial tail in place.
///
/// Gemini streams a JSON array of objects; chunk boundaries land anywhere,
/// so objects are recognized by brace depth with string/escape awareness
/// rather than by lines.
fn drain_complete_objects(buffer: &mut String) -> Vec<Value> {
    let mut objects = Vec::new();

    loop {
        let chars: Vec<char> = buffer.chars().collect();
        let mut brace_depth = 0i32;
        let mut in_string = false;
        let mut escape = false;
        let mut object_start = None;
        let mut complete = None;

        for (i, &c) in chars.iter().enumerate() {
            if escape {
                escape = false;
                continue;
            }
            match c {
                '\\' if in_string => escape = true,
                '"' => in_string = !in_string,
                '{' if !in_string => {
                    if brace_depth == 0 {
                        object_start = Some(i);
                    }
                    brace_depth += 1;
                }
                '}' if !in_string => {
                    brace_depth -= 1;
                    if brace_depth == 0 {
                        if let Some(start) = object_start {
                            complete = Some((start, i));
                        }
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some((start, end)) = complete else {
            break;
        };

        let object_str: String = chars[start..=end].iter().collect();
        if let Ok(value) = serde_json::from_str::<Value>(&object_str) {
            objects.push(value);
        }
        *buffer = chars[end + 1..].iter().collect();
    }

    objects
}

fn text_from_candidate(value: &Value) -> Option<String> {
    value["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
            .ok_or_else(|| ApiError::BadRequest("Gemini API Key is required".to_string()))?;

        // Gemini only knows "user" and "model" roles.
        let contents: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                json!({
                    "role": role,
                    "parts": [{ "text": m.content }],
                })
            })
            .collect();

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:streamGenerateContent?key={}",
            config.model, api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({ "contents": contents }))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("Gemini API request failed")
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

                        for object in drain_complete_objects(&mut buffer) {
                            if let Some(text) = text_from_candidate(&object) {
                                if tx.send(Ok(text)).await.is_err() {
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

    async fn list_models(&self, _config: &LlmConfig) -> Vec<String> {
        STATIC_MODELS.iter().map(|m| m.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_objects_split_across_chunks() {
        let mut buffer = String::from(r#"[{"candidates":[{"content":{"parts":[{"text":"Hel"#);
        assert!(drain_complete_objects(&mut buffer).is_empty());

        buffer.push_str(r#"lo"}]}}]},{"candidates":[{"content":{"parts":[{"text":" world"}]}}]}"#);
        let objects = drain_complete_objects(&mut buffer);

        assert_eq!(objects.len(), 2);
        assert_eq!(
            text_from_candidate(&objects[0]),
            Some("Hello".to_string())
        );
        assert_eq!(
            text_from_candidate(&objects[1]),
            Some(" world".to_string())
        );
    }

    #[test]
    fn braces_inside_strings_do_not_close_objects() {
        let mut buffer =
            String::from(r#"{"candidates":[{"content":{"parts":[{"text":"fn main() { }"}]}}]}"#);
        let objects = drain_complete_objects(&mut buffer);

        assert_eq!(objects.len(), 1);
        assert_eq!(
            text_from_candidate(&objects[0]),
            Some("fn main() { }".to_string())
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn escaped_quotes_are_handled() {
        let mut buffer =
            String::from(r#"{"candidates":[{"content":{"parts":[{"text":"say \"hi\" {"}]}}]}"#);
        let objects = drain_complete_objects(&mut buffer);

        assert_eq!(objects.len(), 1);
        assert_eq!(
            text_from_candidate(&objects[0]),
            Some(r#"say "hi" {"#.to_string())
        );
    }

    #[tokio::test]
    async fn stream_without_key_fails_fast() {
        let provider = GeminiProvider::new(Client::new());
        let config = LlmConfig {
            provider: super::super::ProviderKind::Gemini,
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: None,
        };

        let err = provider
            .stream_chat(vec![ChatMessage::user("hi")], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn model_list_is_static() {
        let provider = GeminiProvider::new(Client::new());
        let config = LlmConfig {
            provider: super::super::ProviderKind::Gemini,
            api_key: Some("key".to_string()),
            model: "gemini-1.5-flash".to_string(),
            base_url: None,
        };

        let models = provider.list_models(&config).await;
        assert_eq!(models.len(), 3);
        assert!(models.contains(&"gemini-1.5-pro".to_string()));
    }
}
