//! Question answering over the knowledge base

use crate::Result;
use async_trait::async_trait;

/// Retrieve-then-generate question answering
///
/// `answer` never returns a blank string: implementations fall back to a
/// fixed apology when nothing usable comes back.
#[async_trait]
pub trait QuestionAnswerer: Send + Sync + 'static {
    async fn answer(&self, question: &str) -> Result<String>;
}
