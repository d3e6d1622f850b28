//! OpenAI-compatible embeddings client

use reqwest::Client;
use serde::{Deserialize, Serialize};

use chia_config::LlmConfig;

use crate::backend::{post_json, with_retry, OpenAIConfig};
use crate::LlmError;

/// Embeddings client for `/embeddings`
///
/// Shares endpoint, credentials and retry policy with the chat backend.
pub struct OpenAIEmbeddings {
    config: OpenAIConfig,
    client: Client,
    batch_size: usize,
}

impl OpenAIEmbeddings {
    /// Create a client; `config.model` is the embedding model
    pub fn new(config: OpenAIConfig, batch_size: usize) -> Result<Self, LlmError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            batch_size: batch_size.max(1),
        })
    }

    /// Build from LLM settings, swapping in the embedding model
    pub fn from_settings(settings: &LlmConfig, batch_size: usize) -> Result<Self, LlmError> {
        let mut config = OpenAIConfig::from(settings);
        config.model = settings.embedding_model.clone();
        Self::new(config, batch_size)
    }

    /// Embedding model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn embeddings_url(&self) -> String {
        self.config.url_for("embeddings")
    }

    /// Embed texts, batching requests; output order matches input
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut vectors = Vec::with_capacity(texts.len());
        let url = self.embeddings_url();

        for batch in texts.chunks(self.batch_size) {
            let body = EmbeddingRequest {
                model: &self.config.model,
                input: batch,
            };

            let response: EmbeddingResponse = with_retry(
                self.config.max_retries,
                self.config.initial_backoff,
                || post_json(&self.client, &self.config, &url, &body),
            )
            .await?;

            vectors.extend(order_embeddings(response, batch.len())?);
        }

        tracing::debug!(
            model = %self.config.model,
            count = vectors.len(),
            "Embedded texts"
        );

        Ok(vectors)
    }

    /// Embed a single text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("Empty embedding response".to_string()))
    }
}

/// Sort by `index` and check the count
fn order_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, LlmError> {
    if response.data.len() != expected {
        return Err(LlmError::InvalidResponse(format!(
            "Expected {} embeddings, got {}",
            expected,
            response.data.len()
        )));
    }
    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
