//! Counseling Agent
//!
//! Features:
//! - Tool-calling counselor loop over an OpenAI-compatible LLM
//! - Manager, counselor and suggester roles with configurable prompts
//! - Per-session conversation log with live turn events
//! - Single termination policy (reply sentinel or patient exit phrase)
//! - Line-based and detached answer channels for the risk assessment

pub mod agent;
pub mod channel;
pub mod conversation;
pub mod roles;
pub mod termination;
pub mod traits;

pub use agent::CounselorAgent;
pub use channel::{DetachedChannel, LineChannel};
pub use conversation::{ConversationEvent, ConversationLog, ConversationState, EndReason};
pub use roles::AgentRoster;
pub use termination::{CheckedReply, TerminationPolicy};
pub use traits::{Agent, AgentReply};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("No final reply after {0} rounds")]
    MaxRounds(usize),
}

impl From<chia_tools::ToolError> for AgentError {
    fn from(err: chia_tools::ToolError) -> Self {
        AgentError::Tool(err.to_string())
    }
}

impl From<AgentError> for chia_core::Error {
    fn from(err: AgentError) -> Self {
        chia_core::Error::Agent(err.to_string())
    }
}
