//! Retrieval-augmented question answering over the HIV/PrEP knowledge base
//!
//! Features:
//! - Knowledge loading from a local file or URL (JSON, HTML or plain text)
//! - Recursive character splitting
//! - OpenAI-compatible embeddings
//! - In-process cosine index or Qdrant
//! - RAG prompt with a fixed fallback answer
//! - Evaluation question sets

pub mod chunker;
pub mod embeddings;
pub mod eval;
pub mod knowledge_loader;
pub mod qa;
pub mod retriever;
pub mod vector_store;

pub use chunker::{Chunk, RecursiveCharacterSplitter};
pub use embeddings::Embedder;
pub use eval::{write_records, EvalQuestion, EvalRecord, EvalSet, NO_CONTEXT};
pub use knowledge_loader::{KnowledgeLoader, KnowledgeSource};
pub use qa::{QaChain, QaOutcome, RAG_PROMPT};
pub use retriever::KnowledgeRetriever;
pub use vector_store::{
    InMemoryVectorStore, QdrantStoreConfig, QdrantVectorStore, StoredChunk, VectorIndex,
    VectorSearchResult,
};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Knowledge load error: {0}")]
    Load(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for chia_core::Error {
    fn from(err: RagError) -> Self {
        chia_core::Error::Rag(err.to_string())
    }
}

impl From<chia_llm::LlmError> for RagError {
    fn from(err: chia_llm::LlmError) -> Self {
        RagError::Embedding(err.to_string())
    }
}
