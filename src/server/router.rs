use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/chat", post(handlers::chat))
        .route(
            "/api/documents",
            get(handlers::list_documents)
                .post(handlers::add_document)
                .delete(handlers::clear_documents),
        )
        .route("/api/documents/:id", delete(handlers::delete_document))
        .route("/api/documents/from_url", post(handlers::ingest_url))
        .route("/api/documents/from_search", post(handlers::ingest_search))
        .route(
            "/api/documents/delete_by_source",
            post(handlers::delete_by_source),
        )
        .route(
            "/api/documents/delete_by_query",
            post(handlers::delete_by_query),
        )
        .route("/api/kb/search", post(handlers::search_knowledge_base))
        .route("/api/kb/stats", get(handlers::knowledge_base_stats))
        .route(
            "/api/kb/embedding_config",
            post(handlers::set_embedding_config),
        )
        .route("/api/kb/migrate", post(handlers::migrate_documents))
        .route("/api/models", get(handlers::list_models))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
