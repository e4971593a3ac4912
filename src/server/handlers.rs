use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::ChatOptions;
use crate::core::errors::ApiError;
use crate::knowledge::{Document, DocumentSource};
use crate::llm::{provider_for, ChatMessage, LlmConfig};
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    /// Prior conversation, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub message: String,
    /// Overrides the configured chat provider for this turn.
    #[serde(default)]
    pub config: Option<LlmConfig>,
    #[serde(default)]
    pub use_knowledge_base: bool,
    #[serde(default)]
    pub use_web_search: bool,
}

/// One chat turn, streamed back as SSE: one event per fragment, then a
/// final `[DONE]`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatTurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let config = request
        .config
        .unwrap_or_else(|| state.settings.chat.to_config());

    let options = ChatOptions {
        use_knowledge_base: request.use_knowledge_base,
        use_web_search: request.use_web_search,
    };

    let rx = state
        .orchestrator
        .send_message(request.messages, &request.message, &config, options)
        .await?;

    let stream = ReceiverStream::new(rx)
        .map(|item| {
            let event = match item {
                Ok(fragment) => Event::default().data(fragment),
                Err(err) => Event::default().event("error").data(err.to_string()),
            };
            Ok(event)
        })
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn list_documents(State(state): State<Arc<AppState>>) -> Json<Vec<Document>> {
    Json(state.kb.all_documents().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDocumentRequest {
    pub name: String,
    /// Already-extracted plain text; PDF/HTML extraction happens on the
    /// client side of this boundary.
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub source_url: Option<String>,
}

pub async fn add_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddDocumentRequest>,
) -> Result<Json<Document>, ApiError> {
    let source = DocumentSource::parse(&request.source)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown source: {}", request.source)))?;

    let doc = state
        .kb
        .add_document(
            &request.name,
            &request.content,
            source,
            request.source_url,
            None,
        )
        .await?;

    Ok(Json(doc))
}

#[derive(Debug, Deserialize)]
pub struct IngestUrlRequest {
    pub url: String,
}

/// Fetch a page and ingest its text, named by its domain.
pub async fn ingest_url(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestUrlRequest>,
) -> Result<Json<Document>, ApiError> {
    let content = state.fetcher.fetch_text(&request.url).await?;
    let domain = crate::web::domain_of(&request.url);

    let doc = state
        .kb
        .add_document(
            &domain,
            &content,
            DocumentSource::Url,
            Some(request.url),
            None,
        )
        .await?;

    Ok(Json(doc))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSearchRequest {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Search the web and ingest each fetched result page as a
/// search-sourced document named "{domain} - {title}".
pub async fn ingest_search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestSearchRequest>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let max_results = request
        .max_results
        .unwrap_or(state.settings.web.max_search_results);
    let results = crate::web::search_web(&state.client, &request.query, max_results).await?;

    let mut ingested = Vec::new();
    for result in results {
        let content = match state.fetcher.fetch_text(&result.url).await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Skipping search result {}: {}", result.url, err);
                continue;
            }
        };

        let name = format!("{} - {}", crate::web::domain_of(&result.url), result.title);
        let doc = state
            .kb
            .add_document(
                &name,
                &content,
                DocumentSource::Search,
                Some(result.url),
                None,
            )
            .await?;
        ingested.push(doc);
    }

    Ok(Json(ingested))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.kb.delete_document(&id).await?;
    Ok(Json(json!({ "deleted": id })))
}

pub async fn clear_documents(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.kb.clear().await?;
    Ok(Json(json!({ "cleared": true })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteBySourceRequest {
    pub source: String,
}

pub async fn delete_by_source(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteBySourceRequest>,
) -> Result<Json<Value>, ApiError> {
    let source = DocumentSource::parse(&request.source)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown source: {}", request.source)))?;

    let removed = state.kb.delete_by_source(source).await?;
    Ok(Json(json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteByQueryRequest {
    pub query: String,
}

pub async fn delete_by_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteByQueryRequest>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.kb.delete_by_query(&request.query).await?;
    Ok(Json(json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

pub async fn search_knowledge_base(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Json<Vec<String>> {
    let top_k = request.top_k.unwrap_or(state.settings.retrieval.top_k);
    Json(state.kb.search_documents(&request.query, top_k).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfigRequest {
    pub provider: crate::embeddings::EmbeddingProvider,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Point the knowledge base at a different embedding backend.
pub async fn set_embedding_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmbeddingConfigRequest>,
) -> Json<Value> {
    state
        .kb
        .set_embedding_config(request.provider, request.api_key);
    Json(json!({ "ok": true }))
}

pub async fn knowledge_base_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.kb.get_vector_stats().await?;
    let documents = state.kb.all_documents().await;

    Ok(Json(json!({
        "count": stats.count,
        "documentsWithEmbeddings": stats.documents_with_embeddings,
        "totalDocuments": documents.len(),
        "totalSize": state.kb.total_size().await,
        "backend": state.kb.store().backend_name(),
    })))
}

/// Generate embeddings for catalog entries that never completed the
/// pipeline (e.g. ingested before the vector store was reachable).
pub async fn migrate_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    state.kb.migrate_existing_documents(None).await?;
    let stats = state.kb.get_vector_stats().await?;
    Ok(Json(json!({
        "migrated": true,
        "documentsWithEmbeddings": stats.documents_with_embeddings,
    })))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let config = state.settings.chat.to_config();
    let provider = provider_for(config.provider, &state.client);
    Json(provider.list_models(&config).await)
}
