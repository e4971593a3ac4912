//! Chat providers behind one streaming contract.
//!
//! A closed set of provider variants implements [`LlmProvider`]; adding
//! a backend means adding a variant and an implementation, not branching
//! call sites.

mod gemini;
mod ollama;
mod openai;
mod provider;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use provider::{ChatMessage, LlmProvider};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "openai" => Some(ProviderKind::OpenAi),
            "gemini" => Some(ProviderKind::Gemini),
            "ollama" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }
}

/// Per-call provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

/// Resolve the provider implementation for a config.
pub fn provider_for(kind: ProviderKind, client: &reqwest::Client) -> Arc<dyn LlmProvider> {
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(client.clone())),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(client.clone())),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(client.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kinds_parse_and_print() {
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::parse("gemini"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::parse("ollama"), Some(ProviderKind::Ollama));
        assert_eq!(ProviderKind::parse("claude"), None);
        assert_eq!(ProviderKind::Ollama.as_str(), "ollama");
    }

    #[test]
    fn resolution_matches_kind() {
        let client = reqwest::Client::new();
        assert_eq!(provider_for(ProviderKind::OpenAi, &client).name(), "openai");
        assert_eq!(provider_for(ProviderKind::Gemini, &client).name(), "gemini");
        assert_eq!(provider_for(ProviderKind::Ollama, &client).name(), "ollama");
    }
}
