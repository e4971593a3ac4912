use std::fs;
use std::path::PathBuf;

use crate::core::errors::ApiError;

use super::document::Document;

/// The document catalog, persisted as one JSON snapshot rewritten on
/// every mutation. A missing or corrupt snapshot starts empty rather
/// than failing startup.
pub struct DocumentCatalog {
    path: PathBuf,
    documents: Vec<Document>,
}

impl DocumentCatalog {
    pub fn load(path: PathBuf) -> Self {
        let documents = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(documents) => documents,
                Err(err) => {
                    tracing::error!("Error loading knowledge base catalog: {}", err);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self { path, documents }
    }

    pub fn save(&self) -> Result<(), ApiError> {
        let raw = serde_json::to_string(&self.documents).map_err(ApiError::internal)?;
        fs::write(&self.path, raw).map_err(|err| {
            ApiError::Internal(format!(
                "Failed to save document catalog. Storage may be full. ({})",
                err
            ))
        })
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn push(&mut self, doc: Document) {
        self.documents.push(doc);
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.id == id)
    }

    pub fn mark_embedded(&mut self, id: &str) {
        if let Some(doc) = self.documents.iter_mut().find(|doc| doc.id == id) {
            doc.has_embeddings = true;
        }
    }

    /// Remove documents matching the predicate, returning the removed set.
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<Document>
    where
        F: Fn(&Document) -> bool,
    {
        let (removed, kept): (Vec<Document>, Vec<Document>) =
            self.documents.drain(..).partition(|doc| predicate(doc));
        self.documents = kept;
        removed
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }
}
