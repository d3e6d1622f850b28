//! Error types shared across the workspace
//!
//! Each crate keeps its own `thiserror` enum and converts into [`Error`]
//! at crate boundaries.

use thiserror::Error;

/// Workspace-wide error
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Locator error: {0}")]
    Locator(String),

    #[error("Assessment error: {0}")]
    Assessment(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error came from a transport closing underneath us
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, Error::Channel(_))
    }
}

/// Result alias using the workspace error
pub type Result<T> = std::result::Result<T, Error>;
