//! Vector stores
//!
//! Dense vector storage and similarity search, either in process or in Qdrant.

use async_trait::async_trait;
use parking_lot::RwLock;
use qdrant_client::{
    qdrant::{
        value::Kind, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
        UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use chia_config::RagConfig;

use crate::embeddings::cosine_similarity;
use crate::RagError;

/// Chunk as stored in an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Numeric ID (Qdrant point IDs are u64 or UUID)
    pub id: u64,
    pub text: String,
    /// Where the chunk came from
    pub source: String,
}

/// Search result from a vector index
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub id: u64,
    /// Cosine similarity
    pub score: f32,
    pub text: String,
    pub source: Option<String>,
}

/// Vector index
#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    /// Insert or replace chunks with their embeddings
    async fn upsert(&self, chunks: &[StoredChunk], embeddings: &[Vec<f32>])
        -> Result<(), RagError>;

    /// Nearest chunks by cosine similarity, best first
    async fn search(&self, query: &[f32], top_k: usize)
        -> Result<Vec<VectorSearchResult>, RagError>;

    /// Number of stored chunks
    async fn count(&self) -> Result<usize, RagError>;

    /// Index name for logging
    fn name(&self) -> &str;
}

fn check_lengths(chunks: &[StoredChunk], embeddings: &[Vec<f32>]) -> Result<(), RagError> {
    if chunks.len() != embeddings.len() {
        return Err(RagError::VectorStore(
            "Chunk and embedding count mismatch".to_string(),
        ));
    }
    Ok(())
}

/// In-process cosine index
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<u64, (StoredChunk, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorStore {
    async fn upsert(
        &self,
        chunks: &[StoredChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), RagError> {
        check_lengths(chunks, embeddings)?;
        let mut entries = self.entries.write();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            entries.insert(chunk.id, (chunk.clone(), embedding.clone()));
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorSearchResult>, RagError> {
        let entries = self.entries.read();
        let mut results: Vec<VectorSearchResult> = entries
            .values()
            .map(|(chunk, embedding)| VectorSearchResult {
                id: chunk.id,
                score: cosine_similarity(query, embedding),
                text: chunk.text.clone(),
                source: Some(chunk.source.clone()),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        results.truncate(top_k);
        Ok(results)
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.entries.read().len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Qdrant connection settings
#[derive(Debug, Clone)]
pub struct QdrantStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension
    pub vector_dim: usize,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl From<&RagConfig> for QdrantStoreConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            endpoint: config.qdrant_endpoint.clone(),
            collection: config.qdrant_collection.clone(),
            vector_dim: config.vector_dim,
            api_key: config.qdrant_api_key.clone(),
        }
    }
}

/// Qdrant-backed index
pub struct QdrantVectorStore {
    client: Qdrant,
    config: QdrantStoreConfig,
}

impl QdrantVectorStore {
    /// Connect and make sure the collection exists
    pub async fn connect(config: QdrantStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        let store = Self { client, config };
        store.ensure_collection().await?;
        Ok(store)
    }

    /// Create collection if not exists
    async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            tracing::info!(collection = %self.config.collection, "Creating Qdrant collection");
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorStore {
    async fn upsert(
        &self,
        chunks: &[StoredChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), RagError> {
        check_lengths(chunks, embeddings)?;

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, emb)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("text".to_string(), chunk.text.clone().into());
                payload.insert("source".to_string(), chunk.source.clone().into());
                PointStruct::new(chunk.id, emb.clone(), payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points).wait(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorSearchResult>, RagError> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.config.collection, query.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        let search_results = results
            .result
            .into_iter()
            .map(|point| {
                let mut text = String::new();
                let mut source = None;

                for (k, v) in point.payload {
                    if let Some(Kind::StringValue(s)) = v.kind {
                        match k.as_str() {
                            "text" => text = s,
                            "source" => source = Some(s),
                            _ => {},
                        }
                    }
                }

                let id = point
                    .id
                    .and_then(|pid| match pid.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => Some(n),
                        _ => None,
                    })
                    .unwrap_or_default();

                VectorSearchResult {
                    id,
                    score: point.score,
                    text,
                    source,
                }
            })
            .collect();

        Ok(search_results)
    }

    async fn count(&self) -> Result<usize, RagError> {
        let info = self
            .client
            .collection_info(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0) as usize)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
