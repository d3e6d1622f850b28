//! Knowledge retriever
//!
//! Builds the index at startup (load, split, embed, upsert) and answers
//! nearest-chunk queries through the core `Retriever` trait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use chia_config::{RagConfig, VectorStoreKind};
use chia_core::{Document, RetrieveOptions, Retriever};

use crate::chunker::RecursiveCharacterSplitter;
use crate::embeddings::Embedder;
use crate::knowledge_loader::{KnowledgeLoader, KnowledgeSource};
use crate::vector_store::{
    InMemoryVectorStore, QdrantStoreConfig, QdrantVectorStore, StoredChunk, VectorIndex,
};
use crate::RagError;

/// Dense retriever over a vector index
pub struct KnowledgeRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl KnowledgeRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            batch_size: 64,
        }
    }

    /// Set embedding batch size used while indexing
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build from settings: pick the index, load the source and index it
    pub async fn from_settings(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        let index: Arc<dyn VectorIndex> = match config.vector_store {
            VectorStoreKind::Memory => Arc::new(InMemoryVectorStore::new()),
            VectorStoreKind::Qdrant => {
                Arc::new(QdrantVectorStore::connect(QdrantStoreConfig::from(config)).await?)
            },
        };

        let retriever = Self::new(embedder, index).with_batch_size(config.embedding_batch_size);

        let source = KnowledgeSource::parse(&config.knowledge_source);
        let text = KnowledgeLoader::new()?.load_text(&source).await?;
        let splitter = RecursiveCharacterSplitter::new(config.chunk_size, config.chunk_overlap);
        retriever.index_text(&text, &source.label(), &splitter).await?;

        Ok(retriever)
    }

    /// Split `text` and index the chunks; returns the chunk count
    pub async fn index_text(
        &self,
        text: &str,
        source: &str,
        splitter: &RecursiveCharacterSplitter,
    ) -> Result<usize, RagError> {
        let start = Instant::now();
        let chunks: Vec<StoredChunk> = splitter
            .chunk(text)
            .into_iter()
            .map(|c| StoredChunk {
                id: c.index as u64,
                text: c.text,
                source: source.to_string(),
            })
            .collect();

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            self.index.upsert(batch, &embeddings).await?;
        }

        tracing::info!(
            source = %source,
            chunks = chunks.len(),
            index = self.index.name(),
            model = self.embedder.model_name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Knowledge base indexed"
        );

        Ok(chunks.len())
    }

    /// Search and convert to documents
    pub async fn search(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<Document>, RagError> {
        let query_vector = self.embedder.embed_query(query).await?;
        let results = self.index.search(&query_vector, options.top_k).await?;

        Ok(results
            .into_iter()
            .filter(|r| r.score >= options.min_score && !r.text.trim().is_empty())
            .map(|r| {
                let doc = Document::new(format!("chunk-{}", r.id), r.text, r.score);
                match r.source {
                    Some(source) => doc.with_source(source),
                    None => doc,
                }
            })
            .collect())
    }
}

#[async_trait]
impl Retriever for KnowledgeRetriever {
    async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> chia_core::Result<Vec<Document>> {
        Ok(self.search(query, options).await?)
    }

    fn name(&self) -> &str {
        "knowledge"
    }
}
