//! Conversation turns and agent profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded exchange between two agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub sender: String,
    pub receiver: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// `"sender to receiver: message"`
    pub fn history_line(&self) -> String {
        format!("{} to {}: {}", self.sender, self.receiver, self.message)
    }

    /// `"sender: message"`, used for live turn forwarding
    pub fn live_line(&self) -> String {
        format!("{}: {}", self.sender, self.message)
    }
}

/// Role an agent plays in the group conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Human participant
    Patient,
    /// Replies to the patient and executes tools
    Counselor,
    /// Proposes the knowledge Q&A tool
    FaqSuggester,
    /// Proposes the provider search tool
    SearchSuggester,
    /// Proposes the risk assessment tool
    AssessmentSuggester,
    /// Routes between agents
    Manager,
}

impl AgentRole {
    /// Default agent name for the role
    pub fn default_name(&self) -> &'static str {
        match self {
            AgentRole::Patient => "patient",
            AgentRole::Counselor => "counselor",
            AgentRole::FaqSuggester => "suggests_retrieve_function",
            AgentRole::SearchSuggester => "search_bot",
            AgentRole::AssessmentSuggester => "assessment_bot",
            AgentRole::Manager => "manager",
        }
    }
}

/// Named actor with a system message and capability flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub role: AgentRole,
    pub system_message: String,
    /// Whether the agent's turns come from the LLM
    pub uses_llm: bool,
    /// Whether the agent executes tool calls
    pub executes_functions: bool,
}

impl AgentProfile {
    pub fn new(role: AgentRole, system_message: impl Into<String>) -> Self {
        let (uses_llm, executes_functions) = match role {
            AgentRole::Patient => (false, false),
            AgentRole::Counselor => (true, true),
            _ => (true, false),
        };
        Self {
            name: role.default_name().to_string(),
            role,
            system_message: system_message.into(),
            uses_llm,
            executes_functions,
        }
    }
}
