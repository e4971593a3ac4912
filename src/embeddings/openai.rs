use reqwest::Client;
use serde_json::{json, Value};

use crate::core::errors::ApiError;

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

pub async fn embed(client: &Client, text: &str, api_key: &str) -> Result<Vec<f32>, ApiError> {
    let body = json!({
        "model": EMBEDDING_MODEL,
        "input": text,
    });

    let response = client
        .post(EMBEDDINGS_URL)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(ApiError::internal)?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(ApiError::Internal(format!(
            "OpenAI embedding API failed: {} {}",
            status, text
        )));
    }

    let payload: Value = response.json().await.map_err(ApiError::internal)?;
    let vector = payload["data"][0]["embedding"]
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Vec<f32>>()
        })
        .unwrap_or_default();

    if vector.is_empty() {
        return Err(ApiError::Internal(
            "OpenAI embedding response contained no vector".to_string(),
        ));
    }

    Ok(vector)
}
