use std::sync::Arc;

use tokio::sync::RwLock;

use crate::chunker::chunk_text;
use crate::core::errors::ApiError;
use crate::embeddings::{EmbeddingProvider, EmbeddingService};
use crate::vector_store::{VectorEntry, VectorMetadata, VectorStore};

use super::catalog::DocumentCatalog;
use super::document::{Document, DocumentSource, VectorStats};

/// Progress callback for chunk-by-chunk ingestion: `(done, total)`.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// The knowledge base manager.
///
/// Owns the document catalog and drives ingestion (chunk → embed →
/// store) and retrieval (embed query → search → citations). The catalog
/// and the vector store are persisted independently; this service is the
/// only place that keeps them consistent.
pub struct KnowledgeBase {
    embeddings: std::sync::RwLock<Arc<EmbeddingService>>,
    store: Arc<dyn VectorStore>,
    catalog: RwLock<DocumentCatalog>,
    client: reqwest::Client,
}

impl KnowledgeBase {
    pub fn new(
        embeddings: EmbeddingService,
        store: Arc<dyn VectorStore>,
        catalog: DocumentCatalog,
        client: reqwest::Client,
    ) -> Self {
        Self {
            embeddings: std::sync::RwLock::new(Arc::new(embeddings)),
            store,
            catalog: RwLock::new(catalog),
            client,
        }
    }

    /// Swap the embedding backend for subsequent ingestion and queries.
    ///
    /// Vectors already stored keep their old dimensionality; mixing
    /// backends within one knowledge base degrades similarity scores and
    /// is not guarded here.
    pub fn set_embedding_config(&self, provider: EmbeddingProvider, api_key: Option<String>) {
        let service = EmbeddingService::new(provider, api_key, self.client.clone());
        if let Ok(mut guard) = self.embeddings.write() {
            *guard = Arc::new(service);
        }
    }

    fn embedding_service(&self) -> Arc<EmbeddingService> {
        match self.embeddings.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Ingest a document: persist it immediately, then run the embedding
    /// pipeline chunk-by-chunk.
    ///
    /// The document is visible in the catalog even if embedding fails;
    /// individual chunk failures are logged and skipped, and whatever
    /// embedded successfully is flushed to the vector store as one batch.
    pub async fn add_document(
        &self,
        name: &str,
        content: &str,
        source: DocumentSource,
        source_url: Option<String>,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<Document, ApiError> {
        let doc = Document {
            id: Document::generate_id(),
            name: name.to_string(),
            content: content.to_string(),
            chunks: chunk_text(content),
            uploaded_at: chrono::Utc::now().timestamp_millis(),
            source,
            source_url,
            has_embeddings: false,
        };

        {
            let mut catalog = self.catalog.write().await;
            catalog.push(doc.clone());
            catalog.save()?;
        }

        if let Err(err) = self.generate_embeddings_for(&doc, on_progress).await {
            tracing::error!("Failed to generate embeddings for {}: {}", doc.id, err);
        }

        let catalog = self.catalog.read().await;
        Ok(catalog.get(&doc.id).cloned().unwrap_or(doc))
    }

    /// Embed every chunk of `doc` in index order and flush the successful
    /// subset to the vector store as a single batch.
    async fn generate_embeddings_for(
        &self,
        doc: &Document,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), ApiError> {
        let embeddings = self.embedding_service();
        let total = doc.chunks.len();

        let mut entries: Vec<VectorEntry> = Vec::with_capacity(total);
        let mut failed = 0usize;

        for (index, chunk) in doc.chunks.iter().enumerate() {
            match embeddings.embed(chunk).await {
                Ok(vector) => entries.push(VectorEntry {
                    id: VectorEntry::chunk_id(doc, index),
                    vector,
                    metadata: VectorMetadata {
                        doc_id: doc.id.clone(),
                        doc_name: doc.name.clone(),
                        chunk_index: index,
                        text: chunk.clone(),
                        source: doc.source,
                        source_url: doc.source_url.clone(),
                    },
                }),
                Err(err) => {
                    failed += 1;
                    tracing::warn!(
                        "Failed to embed chunk {} of document {}: {}",
                        index,
                        doc.id,
                        err
                    );
                }
            }

            if let Some(progress) = on_progress {
                progress(index + 1, total);
            }
        }

        if failed > 0 {
            tracing::warn!(
                "Document {}: only {}/{} chunks embedded; search recall will be partial",
                doc.id,
                entries.len(),
                total
            );
        }

        self.store.add_vectors_batch(entries).await?;

        // Completion flag, not a success flag: set after the pipeline has
        // run even when chunks were skipped.
        let mut catalog = self.catalog.write().await;
        catalog.mark_embedded(&doc.id);
        catalog.save()?;

        Ok(())
    }

    /// Top-K retrieval, rendered as citation blocks.
    ///
    /// Any embedding or search failure degrades to an empty result so
    /// chat falls back to ungrounded answers instead of erroring.
    pub async fn search_documents(&self, query: &str, top_k: usize) -> Vec<String> {
        let outcome = async {
            let query_embedding = self.embedding_service().embed(query).await?;
            self.store.search(&query_embedding, top_k).await
        }
        .await;

        let results = match outcome {
            Ok(results) => results,
            Err(err) => {
                tracing::error!("Vector search failed: {}", err);
                return Vec::new();
            }
        };

        results
            .iter()
            .map(|result| {
                let metadata = &result.metadata;
                let mut citation = format!("Source: {}", metadata.doc_name);

                if let Some(url) = &metadata.source_url {
                    citation.push_str(&format!(" ({})", url));
                }

                citation.push_str(&format!(" [{}]", metadata.source.label()));
                citation.push_str(&format!("\nRelevance: {:.1}%", result.score * 100.0));
                citation.push_str(&format!("\n\n\"{}\"", metadata.text));

                citation
            })
            .collect()
    }

    /// Delete one document and its vectors.
    pub async fn delete_document(&self, id: &str) -> Result<(), ApiError> {
        {
            let mut catalog = self.catalog.write().await;
            catalog.remove_where(|doc| doc.id == id);
            catalog.save()?;
        }

        self.store.delete_by_doc_id(id).await
    }

    /// Delete every document with the given provenance. Returns how many
    /// documents were removed from the catalog.
    pub async fn delete_by_source(&self, source: DocumentSource) -> Result<usize, ApiError> {
        let removed = {
            let mut catalog = self.catalog.write().await;
            let removed = catalog.remove_where(|doc| doc.source == source);
            catalog.save()?;
            removed
        };

        self.store.delete_by_source(source).await?;
        Ok(removed.len())
    }

    /// Delete documents whose name or content contains `query`
    /// (case-insensitive). Vectors are deleted per matching document.
    pub async fn delete_by_query(&self, query: &str) -> Result<usize, ApiError> {
        let query_lower = query.to_lowercase();
        let removed = {
            let mut catalog = self.catalog.write().await;
            let removed = catalog.remove_where(|doc| {
                doc.name.to_lowercase().contains(&query_lower)
                    || doc.content.to_lowercase().contains(&query_lower)
            });
            catalog.save()?;
            removed
        };

        for doc in &removed {
            self.store.delete_by_doc_id(&doc.id).await?;
        }

        Ok(removed.len())
    }

    pub async fn clear(&self) -> Result<(), ApiError> {
        {
            let mut catalog = self.catalog.write().await;
            catalog.clear();
            catalog.save()?;
        }

        self.store.clear().await
    }

    pub async fn all_documents(&self) -> Vec<Document> {
        self.catalog.read().await.documents().to_vec()
    }

    /// Total content size across the catalog, in characters.
    pub async fn total_size(&self) -> usize {
        self.catalog
            .read()
            .await
            .documents()
            .iter()
            .map(|doc| doc.content.chars().count())
            .sum()
    }

    pub async fn get_vector_stats(&self) -> Result<VectorStats, ApiError> {
        let documents_with_embeddings = self
            .catalog
            .read()
            .await
            .documents()
            .iter()
            .filter(|doc| doc.has_embeddings)
            .count();

        let count = self.store.count().await?;

        Ok(VectorStats {
            count,
            documents_with_embeddings,
        })
    }

    /// Re-run the embedding pipeline for catalog entries that never
    /// completed it (e.g. ingested by an older build). Progress is per
    /// document.
    pub async fn migrate_existing_documents(
        &self,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), ApiError> {
        let pending: Vec<Document> = {
            let catalog = self.catalog.read().await;
            catalog
                .documents()
                .iter()
                .filter(|doc| !doc.has_embeddings)
                .cloned()
                .collect()
        };

        let total = pending.len();
        for (index, doc) in pending.iter().enumerate() {
            self.generate_embeddings_for(doc, None).await?;
            if let Some(progress) = on_progress {
                progress(index + 1, total);
            }
        }

        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::vector_store::SqliteVectorStore;

    async fn test_kb() -> KnowledgeBase {
        let dir = std::env::temp_dir().join(format!("lorekeep-kb-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let client = reqwest::Client::new();
        let embeddings = EmbeddingService::new(EmbeddingProvider::Local, None, client.clone());
        let store = SqliteVectorStore::with_path(dir.join("vectors.db"))
            .await
            .unwrap();
        let catalog = DocumentCatalog::load(dir.join("documents.json"));

        KnowledgeBase::new(embeddings, Arc::new(store), catalog, client)
    }

    #[tokio::test]
    async fn add_document_chunks_embeds_and_reports_progress() {
        let kb = test_kb().await;

        let content = "y".repeat(1200);
        let calls = Mutex::new(Vec::new());
        let progress = |done: usize, total: usize| {
            calls.lock().unwrap().push((done, total));
        };

        let doc = kb
            .add_document("big.pdf", &content, DocumentSource::Pdf, None, Some(&progress))
            .await
            .unwrap();

        assert_eq!(doc.chunks.len(), 3);
        assert!(doc.has_embeddings);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(1, 3), (2, 3), (3, 3)]
        );
        assert_eq!(kb.store().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_document_skips_embedding_without_crashing() {
        let kb = test_kb().await;

        let doc = kb
            .add_document("empty.pdf", "   ", DocumentSource::Pdf, None, None)
            .await
            .unwrap();

        assert!(doc.chunks.is_empty());
        assert!(doc.has_embeddings);
        assert_eq!(kb.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_empty_knowledge_base_returns_no_citations() {
        let kb = test_kb().await;
        let citations = kb.search_documents("refund policy", 3).await;
        assert!(citations.is_empty());
    }

    #[tokio::test]
    async fn search_formats_citations_with_source_and_relevance() {
        let kb = test_kb().await;

        kb.add_document(
            "example.com",
            "The refund policy allows returns within thirty days of purchase.",
            DocumentSource::Url,
            Some("https://example.com/refunds".to_string()),
            None,
        )
        .await
        .unwrap();

        let citations = kb.search_documents("refund policy", 3).await;
        assert_eq!(citations.len(), 1);

        let citation = &citations[0];
        assert!(citation.starts_with("Source: example.com (https://example.com/refunds) [Web Page]"));
        assert!(citation.contains("Relevance: "));
        assert!(citation.contains('%'));
        assert!(citation.contains("\"The refund policy allows returns within thirty days of purchase.\""));
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let kb = test_kb().await;

        for i in 0..5 {
            kb.add_document(
                &format!("doc{}.pdf", i),
                &format!("document number {} about storage engines", i),
                DocumentSource::Pdf,
                None,
                None,
            )
            .await
            .unwrap();
        }

        let citations = kb.search_documents("storage engines", 2).await;
        assert_eq!(citations.len(), 2);
    }

    #[tokio::test]
    async fn delete_document_removes_catalog_entry_and_vectors() {
        let kb = test_kb().await;

        let doc = kb
            .add_document("notes.pdf", "some text about rust", DocumentSource::Pdf, None, None)
            .await
            .unwrap();

        kb.delete_document(&doc.id).await.unwrap();
        assert!(kb.all_documents().await.is_empty());
        assert_eq!(kb.store().count().await.unwrap(), 0);

        // Deleting again is a no-op, not an error.
        kb.delete_document(&doc.id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_by_source_and_query() {
        let kb = test_kb().await;

        kb.add_document("a.pdf", "alpha content", DocumentSource::Pdf, None, None)
            .await
            .unwrap();
        kb.add_document("example.org", "beta content", DocumentSource::Url, None, None)
            .await
            .unwrap();
        kb.add_document("example.net - news", "gamma content", DocumentSource::Search, None, None)
            .await
            .unwrap();

        let removed = kb.delete_by_source(DocumentSource::Url).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(kb.all_documents().await.len(), 2);

        let removed = kb.delete_by_query("GAMMA").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(kb.all_documents().await.len(), 1);
        assert_eq!(kb.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_resets_catalog_and_store() {
        let kb = test_kb().await;

        kb.add_document("a.pdf", "content a", DocumentSource::Pdf, None, None)
            .await
            .unwrap();
        kb.clear().await.unwrap();

        assert!(kb.all_documents().await.is_empty());
        assert_eq!(kb.store().count().await.unwrap(), 0);

        let stats = kb.get_vector_stats().await.unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.documents_with_embeddings, 0);
    }

    #[tokio::test]
    async fn stats_count_documents_with_embeddings() {
        let kb = test_kb().await;

        kb.add_document("a.pdf", "first document", DocumentSource::Pdf, None, None)
            .await
            .unwrap();
        kb.add_document("b.pdf", "second document", DocumentSource::Pdf, None, None)
            .await
            .unwrap();

        let stats = kb.get_vector_stats().await.unwrap();
        assert_eq!(stats.documents_with_embeddings, 2);
        assert_eq!(stats.count, 2);
    }

    #[tokio::test]
    async fn migrate_embeds_documents_without_embeddings() {
        let kb = test_kb().await;

        // Seed the catalog directly so has_embeddings stays false.
        {
            let mut catalog = kb.catalog.write().await;
            catalog.push(Document {
                id: "legacy1".to_string(),
                name: "legacy.pdf".to_string(),
                content: "legacy content to embed".to_string(),
                chunks: chunk_text("legacy content to embed"),
                uploaded_at: 0,
                source: DocumentSource::Pdf,
                source_url: None,
                has_embeddings: false,
            });
            catalog.save().unwrap();
        }

        let migrated = AtomicUsize::new(0);
        let progress = |done: usize, _total: usize| {
            migrated.store(done, Ordering::SeqCst);
        };
        kb.migrate_existing_documents(Some(&progress)).await.unwrap();

        assert_eq!(migrated.load(Ordering::SeqCst), 1);
        assert_eq!(kb.store().count().await.unwrap(), 1);
        assert!(kb.all_documents().await[0].has_embeddings);
    }
}
