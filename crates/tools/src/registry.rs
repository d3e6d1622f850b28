//! Tool Registry
//!
//! Manages tool registration, discovery, and execution.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chia_core::{AnswerChannel, QuestionAnswerer, ToolDefinition};

use crate::assessment::AssessmentOptions;
use crate::counseling::{AnswerQuestionTool, AssessRiskTool, SearchProviderTool};
use crate::locator::ProviderDirectory;
use crate::mcp::{Tool, ToolError, ToolOutput, ToolSchema};

/// Tool executor trait
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool by name
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError>;

    /// List available tools
    fn list_tools(&self) -> Vec<ToolSchema>;

    /// Get tool schema by name
    fn get_tool(&self, name: &str) -> Option<ToolSchema>;
}

/// Tool registry
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Function definitions for the LLM, in name order
    pub fn to_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.list_tools().iter().map(ToolSchema::to_definition).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    /// Validate, then run with the tool's own timeout
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::not_found(format!("Tool not found: {}", name)))?;

        tool.validate(&arguments)?;

        let timeout_secs = tool.timeout_secs();
        let start = Instant::now();

        tracing::debug!(tool = name, timeout_secs, "Executing tool");

        let result = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tool.execute(arguments),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(ToolError::timeout(name, timeout_secs)),
        };

        let outcome = match &result {
            Ok(output) if output.is_error => "error_payload",
            Ok(_) => "ok",
            Err(_) => "error",
        };
        metrics::counter!("chia_tool_calls_total", "tool" => name.to_string(), "outcome" => outcome)
            .increment(1);
        metrics::histogram!("chia_tool_call_seconds", "tool" => name.to_string())
            .record(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::warn!(tool = name, error = %e, "Tool execution failed");
        }

        result
    }

    fn list_tools(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    fn get_tool(&self, name: &str) -> Option<ToolSchema> {
        self.tools.get(name).map(|t| t.schema())
    }
}

/// Process-wide collaborators shared by every session's tools
#[derive(Clone)]
pub struct ToolDeps {
    pub answerer: Arc<dyn QuestionAnswerer>,
    pub directory: Arc<dyn ProviderDirectory>,
    pub assessment: AssessmentOptions,
    /// Timeout for one `search_provider` call
    pub locator_timeout_secs: u64,
    /// Timeout for one `answer_question` call
    pub qa_timeout_secs: u64,
}

/// Registry with the three counseling tools bound to one patient channel
pub fn create_registry(deps: &ToolDeps, channel: Arc<dyn AnswerChannel>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        AnswerQuestionTool::new(deps.answerer.clone()).with_timeout(deps.qa_timeout_secs),
    );
    registry.register(AssessRiskTool::new(channel, deps.assessment.clone()));
    registry.register(
        SearchProviderTool::new(deps.directory.clone()).with_timeout(deps.locator_timeout_secs),
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{ErrorCode, InputSchema, PropertySchema};
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                input_schema: InputSchema::object(),
            }
        }

        async fn execute(&self, _input: Value) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolOutput::text("late"))
        }

        fn timeout_secs(&self) -> u64 {
            1
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its input"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                input_schema: InputSchema::object().property(
                    "text",
                    PropertySchema::string("Text to echo"),
                    true,
                ),
            }
        }

        async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(input["text"].as_str().unwrap_or_default()))
        }
    }

    #[test]
    fn test_registry_basic() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(EchoTool);
        registry.register(SlowTool);
        assert_eq!(registry.len(), 2);
        assert!(registry.has("echo"));
        assert_eq!(registry.tool_names(), vec!["echo", "slow"]);

        let defs = registry.to_tool_definitions();
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let output = registry.execute("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(output.text_content(), "hi");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
        assert_eq!(err.message, "Tool not found: missing");
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let err = registry.execute("echo", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tool_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let err = registry.execute("slow", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(err.message, "Tool 'slow' timed out after 1s");
    }
}
