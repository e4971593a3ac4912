use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::chat::ChatOrchestrator;
use crate::config::{AppPaths, Settings};
use crate::embeddings::EmbeddingService;
use crate::knowledge::{DocumentCatalog, KnowledgeBase};
use crate::vector_store;
use crate::web::PageFetcher;

/// Composition root. Every service is built here, in dependency order,
/// and shared through `Arc` — no module-level singletons.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub client: reqwest::Client,
    pub kb: Arc<KnowledgeBase>,
    pub fetcher: Arc<PageFetcher>,
    pub orchestrator: Arc<ChatOrchestrator>,
    #[allow(dead_code)]
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let settings = Settings::load(&paths.settings_path);
        let client = reqwest::Client::new();

        let embeddings = EmbeddingService::new(
            settings.embedding.provider,
            settings.embedding.api_key.clone(),
            client.clone(),
        );

        // The vector backend is resolved once here; the fallback decision
        // holds for the whole session.
        let store = vector_store::connect(&settings.vector, &paths, client.clone()).await?;

        let catalog = DocumentCatalog::load(paths.catalog_path.clone());
        let kb = Arc::new(KnowledgeBase::new(embeddings, store, catalog, client.clone()));

        let fetcher = Arc::new(PageFetcher::new(client.clone(), &settings.web));
        let orchestrator = Arc::new(ChatOrchestrator::new(
            Arc::clone(&kb),
            Arc::clone(&fetcher),
            client.clone(),
            settings.web.clone(),
            settings.retrieval.clone(),
        ));

        Ok(Arc::new(AppState {
            paths,
            settings,
            client,
            kb,
            fetcher,
            orchestrator,
            started_at: Utc::now(),
        }))
    }
}
