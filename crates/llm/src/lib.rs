//! LLM integration
//!
//! Features:
//! - OpenAI-compatible chat completions (OpenAI, Azure, local servers)
//! - Function calling
//! - Embeddings
//! - Retry with exponential backoff on transient failures

pub mod backend;
pub mod embeddings;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use embeddings::OpenAIEmbeddings;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for chia_core::Error {
    fn from(err: LlmError) -> Self {
        chia_core::Error::Llm(err.to_string())
    }
}
