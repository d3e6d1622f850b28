//! Interactive answer channels

use crate::Result;
use async_trait::async_trait;

/// Bidirectional line channel to the patient
///
/// Used by the risk assessment to ask one question at a time. Implementations
/// exist for the terminal, WebSocket connections, and detached (HTTP-only)
/// sessions where asking always fails.
#[async_trait]
pub trait AnswerChannel: Send + Sync {
    /// Send `prompt` and wait for the next reply
    async fn ask(&self, prompt: &str) -> Result<String>;

    /// Send a line that needs no reply
    async fn notify(&self, text: &str) -> Result<()>;

    /// Channel name for logging
    fn name(&self) -> &str;
}
