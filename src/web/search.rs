use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search: query → ranked `{title, url, snippet}` list.
///
/// Backed by the DuckDuckGo instant-answer API; results without a title
/// or an http(s) URL are dropped.
pub async fn search_web(
    client: &Client,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>, ApiError> {
    let url = format!(
        "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
        urlencoding::encode(query)
    );

    let response = client.get(&url).send().await.map_err(ApiError::internal)?;

    if !response.status().is_success() {
        return Err(ApiError::Internal(format!(
            "Web search failed: {}",
            response.status()
        )));
    }

    let payload: Value = response.json().await.map_err(ApiError::internal)?;
    Ok(parse_search_payload(&payload, max_results))
}

fn parse_search_payload(payload: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let (Some(abstract_text), Some(url)) = (
        payload.get("AbstractText").and_then(|v| v.as_str()),
        payload.get("AbstractURL").and_then(|v| v.as_str()),
    ) {
        if !abstract_text.is_empty() && !url.is_empty() {
            results.push(SearchResult {
                title: abstract_text
                    .split(" - ")
                    .next()
                    .unwrap_or(abstract_text)
                    .to_string(),
                url: url.to_string(),
                snippet: abstract_text.to_string(),
            });
        }
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_topics(items, &mut results);
    }

    results.retain(|r| !r.title.is_empty() && r.url.starts_with("http"));
    results.truncate(max_results);
    results
}

fn extract_topics(items: &[Value], results: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_topics(topics, results);
            continue;
        }

        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }

        results.push(SearchResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_abstract_and_related_topics() {
        let payload = json!({
            "AbstractText": "Rust - a systems programming language",
            "AbstractURL": "https://www.rust-lang.org",
            "RelatedTopics": [
                {
                    "Text": "Cargo - the Rust package manager",
                    "FirstURL": "https://doc.rust-lang.org/cargo"
                },
                {
                    "Topics": [
                        {
                            "Text": "Clippy - lints",
                            "FirstURL": "https://github.com/rust-lang/rust-clippy"
                        }
                    ]
                }
            ]
        });

        let results = parse_search_payload(&payload, 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Rust");
        assert_eq!(results[1].url, "https://doc.rust-lang.org/cargo");
        assert_eq!(results[2].title, "Clippy");
    }

    #[test]
    fn drops_non_http_urls_and_honors_max() {
        let payload = json!({
            "RelatedTopics": [
                { "Text": "one", "FirstURL": "https://a.example" },
                { "Text": "two", "FirstURL": "ftp://b.example" },
                { "Text": "three", "FirstURL": "https://c.example" },
                { "Text": "four", "FirstURL": "https://d.example" }
            ]
        });

        let results = parse_search_payload(&payload, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.example");
        assert_eq!(results[1].url, "https://c.example");
    }

    #[test]
    fn empty_payload_yields_no_results() {
        let results = parse_search_payload(&json!({}), 3);
        assert!(results.is_empty());
    }
}
