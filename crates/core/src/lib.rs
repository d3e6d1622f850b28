//! Core traits and types for the CHIA counseling assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Core traits for pluggable backends (LLM, retrieval, answer channels)
//! - LLM request/response types
//! - Provider records and the risk questionnaire
//! - Conversation turns and agent profiles
//! - Error types

pub mod assessment;
pub mod conversation;
pub mod error;
pub mod llm_types;
pub mod provider;
pub mod traits;

pub use assessment::{
    RiskAssessment, RiskQuestion, ASSESSMENT_HEADER, HIGH_RISK_ADVICE, LOWER_RISK_ADVICE,
    RISK_QUESTIONS,
};
pub use conversation::{AgentProfile, AgentRole, ConversationTurn};
pub use error::{Error, Result};
pub use llm_types::{
    FinishReason, GenerateRequest, GenerateResponse, Message, Role, TokenUsage, ToolCall,
    ToolDefinition,
};
pub use provider::{ProviderRecord, NOT_AVAILABLE};

pub use traits::{
    AnswerChannel,
    Document,
    // LLM
    LanguageModel,
    QuestionAnswerer,
    RetrieveOptions,
    // Retrieval
    Retriever,
};
