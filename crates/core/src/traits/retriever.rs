//! Retrieval traits for RAG

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Retriever interface for RAG
///
/// Implementations:
/// - `KnowledgeRetriever` - Embeds the query and searches a vector index
#[async_trait]
pub trait Retriever: Send + Sync + 'static {
    /// Retrieve relevant documents, highest score first
    async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<Document>>;

    /// Get retriever name for logging
    fn name(&self) -> &str;
}

/// Retrieval options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOptions {
    /// Number of documents to return
    pub top_k: usize,
    /// Minimum similarity score
    pub min_score: f32,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: 0.0,
        }
    }
}

impl RetrieveOptions {
    /// Set top_k
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set minimum score
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score.clamp(-1.0, 1.0);
        self
    }
}

/// Retrieved document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document ID
    pub id: String,
    /// Document content
    pub content: String,
    /// Relevance score
    pub score: f32,
    /// Source/origin of the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Document {
    /// Create a new document
    pub fn new(id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score,
            source: None,
        }
    }

    /// Set source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = RetrieveOptions::default().with_top_k(2).with_min_score(5.0);
        assert_eq!(options.top_k, 2);
        assert_eq!(options.min_score, 1.0);
    }

    #[test]
    fn test_document_source() {
        let doc = Document::new("chunk-0", "PrEP is a medication", 0.9).with_source("kb.json");
        assert_eq!(doc.source.as_deref(), Some("kb.json"));
    }
}
