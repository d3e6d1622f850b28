//! Agent trait for abstraction and testability
//!
//! Transports talk to agents through this trait, so sessions can hold a
//! mock agent in tests.

use async_trait::async_trait;
use tokio::sync::broadcast;

use chia_core::ConversationTurn;

use crate::conversation::ConversationEvent;
use crate::AgentError;

/// Final reply to one patient message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    /// Text shown to the patient
    pub text: String,
    /// The conversation ended with this message
    pub ended: bool,
    /// Tool calls executed while producing the reply
    pub tool_calls: usize,
}

/// Conversational agent
#[async_trait]
pub trait Agent: Send + Sync {
    /// Handle one patient message and produce the counselor's reply
    async fn process(&self, input: &str) -> Result<AgentReply, AgentError>;

    /// Record and return the opening line
    fn greet(&self) -> String;

    /// Subscribe to recorded turns
    fn subscribe(&self) -> broadcast::Receiver<ConversationEvent>;

    /// All turns so far
    fn history(&self) -> Vec<ConversationTurn>;

    /// Message of the latest turn, or a placeholder when there is none
    fn latest_response(&self) -> String;

    fn is_active(&self) -> bool;

    fn name(&self) -> &str;
}
