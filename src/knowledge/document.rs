use std::fmt;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Provenance of an ingested document. Fixed at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    Pdf,
    Url,
    Search,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::Pdf => "pdf",
            DocumentSource::Url => "url",
            DocumentSource::Search => "search",
        }
    }

    /// Human-readable tag used in citations.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentSource::Pdf => "PDF",
            DocumentSource::Url => "Web Page",
            DocumentSource::Search => "Web Search Result",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pdf" => Some(DocumentSource::Pdf),
            "url" => Some(DocumentSource::Url),
            "search" => Some(DocumentSource::Search),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the document catalog.
///
/// The serialized field names match the catalog snapshot format, so a
/// snapshot written by an older build keeps loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    pub content: String,
    /// Ordered chunk texts; positions double as chunk indices.
    pub chunks: Vec<String>,
    /// Ingestion time, epoch milliseconds.
    pub uploaded_at: i64,
    pub source: DocumentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// True once embedding generation for this document has completed.
    /// Completion, not full success: individual chunks may have been
    /// skipped on failure.
    #[serde(default)]
    pub has_embeddings: bool,
}

impl Document {
    /// Time-based id with a random suffix to avoid collisions.
    pub fn generate_id() -> String {
        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(9)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();
        format!("{}{}", chrono::Utc::now().timestamp_millis(), suffix)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStats {
    pub count: usize,
    pub documents_with_embeddings: usize,
}
