//! Configuration management for the counseling assistant
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, `config/{env}.yaml`)
//! - Environment variables (`CHIA__` prefix, `__` separator)
//! - `OPENAI_API_KEY` as a fallback for the LLM credential

pub mod agent;
pub mod constants;
pub mod settings;

pub use agent::{AgentConfig, AgentPrompts};
pub use settings::{
    load_settings, load_settings_from, LlmConfig, LocatorConfig, LocatorSelectors,
    ObservabilityConfig, RagConfig, RuntimeEnvironment, ServerConfig, Settings, VectorStoreKind,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{0}")]
    MissingCredential(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for chia_core::Error {
    fn from(err: ConfigError) -> Self {
        chia_core::Error::Config(err.to_string())
    }
}
