use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::embeddings::EmbeddingProvider;
use crate::llm::ProviderKind;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Whole-catalog JSON snapshot of ingested documents.
    pub catalog_path: PathBuf,
    /// Embedded vector store database.
    pub vector_db_path: PathBuf,
    pub settings_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let user_data_dir = discover_user_data_dir(&project_root);
        let log_dir = user_data_dir.join("logs");
        let catalog_path = user_data_dir.join("documents.json");
        let vector_db_path = user_data_dir.join("vectors.db");
        let settings_path = user_data_dir.join("settings.json");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            user_data_dir,
            log_dir,
            catalog_path,
            vector_db_path,
            settings_path,
        }
    }

    /// Paths rooted at an arbitrary directory (for testing).
    pub fn with_data_dir(dir: &Path) -> Self {
        AppPaths {
            project_root: dir.to_path_buf(),
            user_data_dir: dir.to_path_buf(),
            log_dir: dir.join("logs"),
            catalog_path: dir.join("documents.json"),
            vector_db_path: dir.join("vectors.db"),
            settings_path: dir.join("settings.json"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("LOREKEEP_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_user_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("LOREKEEP_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Lorekeep");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Lorekeep");
    }

    env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"))
        .join("lorekeep")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Runtime settings, loaded once at startup from `settings.json`.
///
/// Every field has a default so a missing or partial file still yields a
/// usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub chat: ChatSettings,
    pub vector: VectorSettings,
    pub web: WebSettings,
    pub retrieval: RetrievalSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedding: EmbeddingSettings::default(),
            chat: ChatSettings::default(),
            vector: VectorSettings::default(),
            web: WebSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk; a missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(err) => {
                    tracing::warn!("Invalid settings file, using defaults: {}", err);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ApiError> {
        let raw = serde_json::to_string_pretty(self).map_err(ApiError::internal)?;
        fs::write(path, raw).map_err(ApiError::internal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            api_key: None,
            model: "llama3".to_string(),
            base_url: None,
        }
    }
}

impl ChatSettings {
    pub fn to_config(&self) -> crate::llm::LlmConfig {
        crate::llm::LlmConfig {
            provider: self.provider,
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    /// Endpoint of the external vector-search service probed at startup.
    pub chroma_url: String,
    pub collection: String,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            chroma_url: "http://localhost:8000".to_string(),
            collection: "knowledge_base".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    /// Proxy URL prefixes tried in rotation; empty means direct fetch.
    pub proxies: Vec<String>,
    pub max_search_results: usize,
    /// Per-page character budget applied to fetched content.
    pub page_char_budget: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            max_search_results: 5,
            page_char_budget: 2000,
            fetch_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json"));

        assert_eq!(settings.vector.chroma_url, "http://localhost:8000");
        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.web.max_search_results, 5);
    }

    #[test]
    fn partial_settings_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"retrieval": {"top_k": 7}}"#).unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.retrieval.top_k, 7);
        assert_eq!(settings.web.page_char_budget, 2000);
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.web.proxies = vec!["https://proxy.example/raw?url=".to_string()];
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.web.proxies.len(), 1);
    }
}
