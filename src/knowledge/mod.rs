//! Knowledge base: the document catalog and the ingestion/retrieval
//! pipeline around it.
//!
//! `KnowledgeBase` owns the catalog and coordinates the embedding
//! service and the vector store; the two stores are persisted
//! independently and kept consistent here.

mod base;
mod catalog;
mod document;

pub use base::{KnowledgeBase, ProgressFn};
pub use catalog::DocumentCatalog;
pub use document::{Document, DocumentSource, VectorStats};
