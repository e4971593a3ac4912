use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;

use crate::config::WebSettings;
use crate::core::errors::ApiError;

/// Fetches a URL and reduces it to plain text.
///
/// When proxy prefixes are configured the fetcher rotates through them:
/// a failed attempt advances the rotation so the next call starts on the
/// next proxy, and one call retries at most once per configured proxy
/// before reporting an aggregate failure. An empty proxy list means
/// direct fetching with a single attempt.
pub struct PageFetcher {
    client: Client,
    proxies: Vec<String>,
    timeout: Duration,
    next_proxy: AtomicUsize,
}

impl PageFetcher {
    pub fn new(client: Client, settings: &WebSettings) -> Self {
        Self {
            client,
            proxies: settings.proxies.clone(),
            timeout: Duration::from_secs(settings.fetch_timeout_secs),
            next_proxy: AtomicUsize::new(0),
        }
    }

    /// Fetch `url` and extract its text content.
    pub async fn fetch_text(&self, url: &str) -> Result<String, ApiError> {
        if reqwest::Url::parse(url).is_err() {
            return Err(ApiError::BadRequest("Invalid URL format".to_string()));
        }

        let attempts = self.proxies.len().max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let target = if self.proxies.is_empty() {
                url.to_string()
            } else {
                let index = self.next_proxy.load(Ordering::Relaxed) % self.proxies.len();
                format!("{}{}", self.proxies[index], urlencoding::encode(url))
            };

            match self.try_fetch(&target).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    tracing::warn!(
                        "Fetch attempt {}/{} failed for {}: {}",
                        attempt + 1,
                        attempts,
                        url,
                        err
                    );
                    last_error = err.to_string();

                    if !self.proxies.is_empty() {
                        // Rotate so the next call (and the next attempt of
                        // this one) starts on a different proxy.
                        self.next_proxy.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        Err(ApiError::Internal(format!(
            "Failed to fetch URL content after {} attempt(s). The website may be blocking requests or the URL is invalid. Last error: {}",
            attempts, last_error
        )))
    }

    async fn try_fetch(&self, target: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .get(target)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            return Err(ApiError::Internal(format!("HTTP {}", response.status())));
        }

        let html = response.text().await.map_err(ApiError::internal)?;
        let text = extract_text_from_html(&html);

        if text.len() < 50 {
            return Err(ApiError::Internal(
                "Extracted text too short, may be blocked".to_string(),
            ));
        }

        Ok(text)
    }
}

/// Strip markup from an HTML page, dropping script/style content, and
/// collapse runs of whitespace to single spaces.
pub fn extract_text_from_html(html: &str) -> String {
    let chars: Vec<char> = html.chars().collect();
    let lower: Vec<char> = chars.iter().map(|c| c.to_ascii_lowercase()).collect();

    let mut result = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    let mut i = 0;
    while i < chars.len() {
        if starts_with_at(&lower, i, "<script") {
            in_script = true;
        } else if starts_with_at(&lower, i, "<style") {
            in_style = true;
        }

        if in_script && starts_with_at(&lower, i, "</script>") {
            in_script = false;
            i += "</script>".len();
            continue;
        }
        if in_style && starts_with_at(&lower, i, "</style>") {
            in_style = false;
            i += "</style>".len();
            continue;
        }

        if in_script || in_style {
            i += 1;
            continue;
        }

        let c = chars[i];
        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
            // Tag boundaries separate words in the rendered text.
            result.push(' ');
        } else if !in_tag {
            result.push(c);
        }

        i += 1;
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_at(haystack: &[char], index: usize, pattern: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    haystack.len() >= index + pattern.len()
        && haystack[index..index + pattern.len()] == pattern[..]
}

/// Hostname of a URL for display, without the `www.` prefix. Falls back
/// to the raw input when it does not parse.
pub fn domain_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.to_string()))
        .map(|host| host.trim_start_matches("www.").to_string())
        .unwrap_or_else(|| url.to_string())
}
