//! Centralized constants for the counseling assistant
//!
//! Single source of truth for endpoints, page selectors and fixed
//! user-facing messages. Serde defaults in `settings` and `agent` read from
//! here.

/// Service endpoints
pub mod endpoints {
    /// OpenAI-compatible API base
    pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

    /// Default Qdrant endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// Default chromedriver endpoint
    pub const WEBDRIVER_DEFAULT: &str = "http://127.0.0.1:9515";

    /// PrEP provider directory
    pub const PREP_LOCATOR: &str = "https://preplocator.org/";

    /// HIV/PrEP knowledge base (raw JSON)
    pub const KNOWLEDGE_BASE: &str =
        "https://raw.githubusercontent.com/amarisg25/embedding-data-chatbot/main/HIV_PrEP_knowledge_embedding.json";
}

/// LLM defaults
pub mod llm {
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
}

/// Retrieval defaults
pub mod rag {
    pub const CHUNK_SIZE: usize = 500;
    pub const CHUNK_OVERLAP: usize = 50;
    pub const TOP_K: usize = 4;
    /// Dimension of `text-embedding-ada-002` vectors
    pub const VECTOR_DIM: usize = 1536;
    pub const COLLECTION: &str = "hiv_prep_knowledge";
}

/// CSS selectors for the provider directory page
pub mod selectors {
    pub const SEARCH_INPUT: &str = "input[type='search']";
    pub const SUBMIT_BUTTON: &str = "button.btn[type='submit']";
    pub const RESULT_ITEM: &str = "div.locator-results-item";
    pub const NAME: &str = "h3";
    pub const FIELD: &str = "span";
    pub const DISTANCE_PREFIX: &str = "Distance from your location:";
}

/// Fixed user-facing messages
pub mod messages {
    pub const GREETING: &str = "How can I help you?";
    pub const QA_FALLBACK: &str = "I'm sorry, I couldn't find an answer to that question.";
    pub const NO_MESSAGES: &str = "No messages found.";
    pub const MISSING_API_KEY: &str =
        "API key not found. Please set OPENAI_API_KEY in your .env file.";
}
