//! Language Model traits

use crate::{GenerateRequest, GenerateResponse, Result, ToolDefinition};
use async_trait::async_trait;

/// Language Model interface
///
/// Implementations:
/// - `OpenAIBackend` - OpenAI-compatible chat completions
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = Arc::new(OpenAIBackend::new(config)?);
/// let request = GenerateRequest::new("You are an HIV PrEP counselor")
///     .with_user_message("What is PrEP?");
/// let response = llm.generate(request).await?;
/// println!("{}", response.text);
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate completion
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Generate with tool/function calling
    ///
    /// The response may carry tool calls instead of (or as well as) text.
    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        tools: &[ToolDefinition],
    ) -> Result<GenerateResponse>;

    /// Check if the backend is reachable
    async fn is_available(&self) -> bool;

    /// Get model name for logging
    fn model_name(&self) -> &str;

    /// Estimate token count for text
    ///
    /// Rough heuristic of four characters per token.
    fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FinishReason;

    struct MockLlm;

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(GenerateResponse::text(format!("echo: {}", last)))
        }

        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[ToolDefinition],
        ) -> Result<GenerateResponse> {
            self.generate(request).await
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_llm() {
        let llm = MockLlm;
        let request = GenerateRequest::new("system").with_user_message("hello");
        let response = llm.generate(request).await.unwrap();

        assert_eq!(response.text, "echo: hello");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert!(llm.is_available().await);
    }

    #[test]
    fn test_estimate_tokens() {
        let llm = MockLlm;
        assert_eq!(llm.estimate_tokens(""), 0);
        assert_eq!(llm.estimate_tokens("abcdefgh"), 2);
        assert_eq!(llm.estimate_tokens("abcde"), 2);
    }
}
