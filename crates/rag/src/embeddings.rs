//! Text Embeddings
//!
//! Dense embeddings for semantic search, served by an OpenAI-compatible
//! `/embeddings` endpoint.

use async_trait::async_trait;

use chia_llm::OpenAIEmbeddings;

use crate::RagError;

/// Text embedder
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed a batch; output order matches input
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embed a single query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("Empty embedding response".to_string()))
    }

    /// Model name for logging
    fn model_name(&self) -> &str;
}

#[async_trait]
impl Embedder for OpenAIEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(OpenAIEmbeddings::embed(self, texts).await?)
    }

    fn model_name(&self) -> &str {
        self.model()
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Deterministic bag-of-words embedder for tests
    pub struct HashingEmbedder {
        pub dim: usize,
    }

    impl HashingEmbedder {
        pub fn vector(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0; self.dim];
            for word in text
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let slot = word
                    .bytes()
                    .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                    % self.dim;
                v[slot] += 1.0;
            }
            v
        }
    }

    #[async_trait]
    impl Embedder for HashingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|t| self.vector(t)).collect())
        }

        fn model_name(&self) -> &str {
            "hashing"
        }
    }
}
