//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{endpoints, llm, messages, rag, selectors};
use crate::{AgentConfig, ConfigError};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM backend configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Knowledge base and retrieval
    #[serde(default)]
    pub rag: RagConfig,

    /// Provider locator
    #[serde(default)]
    pub locator: LocatorConfig,

    /// Agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in the LLM API key from a fallback source when unset
    pub fn apply_api_key_fallback(&mut self, fallback: Option<String>) {
        if self.llm.api_key.trim().is_empty() {
            if let Some(key) = fallback.filter(|k| !k.trim().is_empty()) {
                self.llm.api_key = key;
            }
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_rag()?;
        self.validate_locator()?;
        self.validate_agent()?;

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Max sessions must be at least 1".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if server.session_timeout_secs == 0 || server.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.session_timeout_secs".to_string(),
                message: "Session timeout and cleanup interval must be at least 1 second"
                    .to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 All origins will be allowed."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(
                messages::MISSING_API_KEY.to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }

        if llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_secs".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if llm.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.endpoint".to_string()));
        }

        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if rag.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.chunk_size".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::InvalidValue {
                field: "rag.chunk_overlap".to_string(),
                message: format!(
                    "Must be smaller than chunk_size ({}), got {}",
                    rag.chunk_size, rag.chunk_overlap
                ),
            });
        }

        if rag.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.top_k".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.vector_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.vector_dim".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.knowledge_source.trim().is_empty() {
            return Err(ConfigError::MissingField("rag.knowledge_source".to_string()));
        }

        Ok(())
    }

    fn validate_locator(&self) -> Result<(), ConfigError> {
        let locator = &self.locator;

        if locator.radius_miles.is_nan() || locator.radius_miles <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "locator.radius_miles".to_string(),
                message: format!("Must be positive, got {}", locator.radius_miles),
            });
        }

        if locator.max_concurrent_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "locator.max_concurrent_sessions".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if locator.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "locator.poll_interval_ms".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if locator.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("locator.base_url".to_string()));
        }

        if locator.webdriver_url.trim().is_empty() {
            return Err(ConfigError::MissingField("locator.webdriver_url".to_string()));
        }

        let budget = locator.worst_case_wait();
        if Duration::from_secs(locator.tool_timeout_secs) <= budget {
            return Err(ConfigError::InvalidValue {
                field: "locator.tool_timeout_secs".to_string(),
                message: format!(
                    "Must exceed the {:.1}s spent waiting on pages and retry backoff with max_retries = {}, got {}s",
                    budget.as_secs_f64(),
                    locator.max_retries,
                    locator.tool_timeout_secs
                ),
            });
        }

        Ok(())
    }

    fn validate_agent(&self) -> Result<(), ConfigError> {
        let agent = &self.agent;

        if agent.max_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_rounds".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if agent.answer_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.answer_timeout_secs".to_string(),
                message: "Must be at least 1 second".to_string(),
            });
        }

        if agent.termination_sentinel.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "agent.termination_sentinel".to_string(),
                message: "Cannot be blank".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Send JSON frames over the WebSocket instead of plain text
    #[serde(default)]
    pub ws_json: bool,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Idle time before a session is evicted
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// How often the eviction task runs
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_max_sessions() -> usize {
    1000
}
fn default_timeout() -> u64 {
    // Covers a full risk assessment on the HTTP path
    600
}
fn default_session_timeout() -> u64 {
    1800
}
fn default_cleanup_interval() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            ws_json: false,
            max_sessions: default_max_sessions(),
            timeout_seconds: default_timeout(),
            session_timeout_secs: default_session_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key (`CHIA__LLM__API_KEY`, falls back to `OPENAI_API_KEY`)
    #[serde(default)]
    pub api_key: String,

    /// Organization header
    #[serde(default)]
    pub organization: Option<String>,

    /// Azure API version; set to use Azure deployment URLs
    #[serde(default)]
    pub api_version: Option<String>,

    /// Chat model
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries on network and 5xx errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay; doubles per attempt
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_llm_endpoint() -> String {
    endpoints::OPENAI_API_BASE.to_string()
}
fn default_llm_model() -> String {
    llm::DEFAULT_MODEL.to_string()
}
fn default_embedding_model() -> String {
    llm::DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_llm_timeout() -> u64 {
    llm::DEFAULT_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    500
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            organization: None,
            api_version: None,
            model: default_llm_model(),
            embedding_model: default_embedding_model(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

/// Vector index backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    /// In-process cosine index
    #[default]
    Memory,
    /// Qdrant server
    Qdrant,
}

/// Knowledge base and retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Local path or http(s) URL of the knowledge document
    #[serde(default = "default_knowledge_source")]
    pub knowledge_source: String,

    /// Which vector index to use
    #[serde(default)]
    pub vector_store: VectorStoreKind,

    /// Qdrant endpoint URL
    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    /// Qdrant collection name
    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    /// Qdrant API key (optional, for cloud deployments)
    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    /// Embedding dimension
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// Splitter chunk size (characters)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Splitter chunk overlap (characters)
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Inputs per embeddings request
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Where the evaluation harness writes its JSON files
    #[serde(default = "default_eval_output_dir")]
    pub eval_output_dir: String,
}

fn default_knowledge_source() -> String {
    endpoints::KNOWLEDGE_BASE.to_string()
}
fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_qdrant_collection() -> String {
    rag::COLLECTION.to_string()
}
fn default_vector_dim() -> usize {
    rag::VECTOR_DIM
}
fn default_chunk_size() -> usize {
    rag::CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    rag::CHUNK_OVERLAP
}
fn default_top_k() -> usize {
    rag::TOP_K
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_eval_output_dir() -> String {
    "eval".to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            knowledge_source: default_knowledge_source(),
            vector_store: VectorStoreKind::default(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            vector_dim: default_vector_dim(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            embedding_batch_size: default_embedding_batch_size(),
            eval_output_dir: default_eval_output_dir(),
        }
    }
}

/// Provider locator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Directory search page
    #[serde(default = "default_locator_url")]
    pub base_url: String,

    /// WebDriver (chromedriver) endpoint
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Maximum distance kept in results
    #[serde(default = "default_radius")]
    pub radius_miles: f64,

    /// Concurrent browser sessions
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,

    /// Wait after navigation before interacting
    #[serde(default = "default_page_load_wait")]
    pub page_load_wait_ms: u64,

    /// Maximum wait for results after submitting
    #[serde(default = "default_results_wait")]
    pub results_wait_ms: u64,

    /// Page source polling interval while waiting for results
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Extra attempts after a failed lookup
    #[serde(default)]
    pub max_retries: u32,

    /// First retry delay; doubles per attempt
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Timeout for the whole `search_provider` tool call (seconds)
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Chrome command line arguments
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,

    /// Page selectors
    #[serde(default)]
    pub selectors: LocatorSelectors,
}

fn default_locator_url() -> String {
    endpoints::PREP_LOCATOR.to_string()
}
fn default_webdriver_url() -> String {
    endpoints::WEBDRIVER_DEFAULT.to_string()
}
fn default_radius() -> f64 {
    30.0
}
fn default_max_concurrent_sessions() -> usize {
    2
}
fn default_page_load_wait() -> u64 {
    2000
}
fn default_results_wait() -> u64 {
    5000
}
fn default_poll_interval() -> u64 {
    250
}
fn default_retry_backoff() -> u64 {
    1000
}
fn default_tool_timeout() -> u64 {
    90
}
fn default_browser_args() -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
    ]
}

impl LocatorConfig {
    /// Delay before retry number `attempt + 1`
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        self.retry_backoff_ms.saturating_mul(1u64 << attempt.min(16))
    }

    /// Page waits and backoff of a lookup that uses every retry
    ///
    /// Excludes browser command latency and the wait for a session permit.
    pub fn worst_case_wait(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let per_attempt = self.page_load_wait_ms.saturating_add(self.results_wait_ms);
        // Delays double for the first 16 retries and stay flat afterwards
        let doubling = self.max_retries.min(16);
        let flat = u64::from(self.max_retries - doubling);
        let backoff = self
            .retry_backoff_ms
            .saturating_mul((1u64 << doubling) - 1)
            .saturating_add(self.backoff_for_attempt(16).saturating_mul(flat));

        Duration::from_millis(per_attempt.saturating_mul(attempts).saturating_add(backoff))
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_locator_url(),
            webdriver_url: default_webdriver_url(),
            radius_miles: default_radius(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
            page_load_wait_ms: default_page_load_wait(),
            results_wait_ms: default_results_wait(),
            poll_interval_ms: default_poll_interval(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff(),
            tool_timeout_secs: default_tool_timeout(),
            browser_args: default_browser_args(),
            selectors: LocatorSelectors::default(),
        }
    }
}

/// CSS selectors used against the directory page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorSelectors {
    #[serde(default = "default_search_input")]
    pub search_input: String,
    #[serde(default = "default_submit_button")]
    pub submit_button: String,
    #[serde(default = "default_result_item")]
    pub result_item: String,
    /// Provider name inside a result item
    #[serde(default = "default_name_selector")]
    pub name: String,
    /// Address, phone and distance fields, in that order
    #[serde(default = "default_field_selector")]
    pub field: String,
    /// Label text stripped before parsing the distance
    #[serde(default = "default_distance_prefix")]
    pub distance_prefix: String,
}

fn default_search_input() -> String {
    selectors::SEARCH_INPUT.to_string()
}
fn default_submit_button() -> String {
    selectors::SUBMIT_BUTTON.to_string()
}
fn default_result_item() -> String {
    selectors::RESULT_ITEM.to_string()
}
fn default_name_selector() -> String {
    selectors::NAME.to_string()
}
fn default_field_selector() -> String {
    selectors::FIELD.to_string()
}
fn default_distance_prefix() -> String {
    selectors::DISTANCE_PREFIX.to_string()
}

impl Default for LocatorSelectors {
    fn default() -> Self {
        Self {
            search_input: default_search_input(),
            submit_button: default_submit_button(),
            result_item: default_result_item(),
            name: default_name_selector(),
            field: default_field_selector(),
            distance_prefix: default_distance_prefix(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` in the working directory
///
/// Priority (highest to lowest):
/// 1. Environment variables (`CHIA__SECTION__FIELD`)
/// 2. `config/{env}.yaml`
/// 3. `config/default.yaml`
/// 4. Built-in defaults
///
/// `OPENAI_API_KEY` is used when no API key was configured.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from an explicit configuration directory
pub fn load_settings_from(config_dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::from(config_dir.join("default")).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder = builder.add_source(File::from(config_dir.join(env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("CHIA")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let mut settings: Settings = config.try_deserialize()?;

    settings.apply_api_key_fallback(std::env::var("OPENAI_API_KEY").ok());

    settings.validate()?;

    Ok(settings)
}
