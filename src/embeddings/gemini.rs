use reqwest::Client;
use serde_json::{json, Value};

use crate::core::errors::ApiError;

const EMBEDDING_MODEL: &str = "embedding-001";

pub async fn embed(client: &Client, text: &str, api_key: &str) -> Result<Vec<f32>, ApiError> {
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:embedContent?key={}",
        EMBEDDING_MODEL, api_key
    );

    let body = json!({
        "content": {
            "parts": [{ "text": text }],
        },
    });

    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(ApiError::internal)?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(ApiError::Internal(format!(
            "Gemini embedding API failed: {} {}",
            status, text
        )));
    }

    let payload: Value = response.json().await.map_err(ApiError::internal)?;
    let vector = payload["embedding"]["values"]
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
            "Gemini embedding response contained no vector".to_string(),
        ));
    }

    Ok(vector)
}
