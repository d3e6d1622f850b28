//! MCP-compatible tool types
//!
//! Tool schemas, outputs and errors in the shape of the Model Context
//! Protocol `tools/list` and `tools/call` payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use chia_core::ToolDefinition;

/// Default per-tool timeout
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Tool description as advertised to clients and the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolSchema {
    /// Function definition for chat-completion requests
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.to_value(),
        )
    }
}

/// JSON schema of a tool's arguments (always an object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    /// Empty object schema
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Add a property
    pub fn property(mut self, name: &str, schema: PropertySchema, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }
}

/// Single property schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: String,
    pub description: String,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropertySchema {
    fn typed(prop_type: &str, description: &str) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: description.to_string(),
            enum_values: None,
            default: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::typed("string", description)
    }

    pub fn number(description: &str) -> Self {
        Self::typed("number", description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::typed("boolean", description)
    }

    pub fn enum_type(description: &str, values: Vec<String>) -> Self {
        Self {
            enum_values: Some(values),
            ..Self::typed("string", description)
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Whether `value` has this property's JSON type
    fn accepts(&self, value: &Value) -> bool {
        match self.prop_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            _ => true,
        }
    }
}

/// Content block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// Tool call result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Pretty-printed JSON as a single text block
    pub fn json(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }

    /// Result the LLM should read as a failure
    pub fn error(value: Value) -> Self {
        Self {
            is_error: true,
            ..Self::json(value)
        }
    }

    /// Concatenated text of all blocks
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// JSON-RPC style error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    MethodNotFound,
    InvalidParams,
    InternalError,
    Timeout,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::Timeout => -32000,
        }
    }
}

/// Tool execution error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotFound, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn timeout(tool: &str, secs: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Tool '{}' timed out after {}s", tool, secs),
        )
    }
}

impl From<ToolError> for chia_core::Error {
    fn from(err: ToolError) -> Self {
        chia_core::Error::Tool(err.to_string())
    }
}

/// Callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    /// Check required properties are present with the declared type
    fn validate(&self, input: &Value) -> Result<(), ToolError> {
        let schema = self.schema().input_schema;
        let args = input
            .as_object()
            .ok_or_else(|| ToolError::invalid_params("Arguments must be a JSON object"))?;

        for name in &schema.required {
            let value = args
                .get(name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| ToolError::invalid_params(format!("{} is required", name)))?;
            if let Some(prop) = schema.properties.get(name) {
                if !prop.accepts(value) {
                    return Err(ToolError::invalid_params(format!(
                        "{} must be a {}",
                        name, prop.prop_type
                    )));
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError>;

    fn timeout_secs(&self) -> u64 {
        DEFAULT_TOOL_TIMEOUT_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ZipTool;

    #[async_trait]
    impl Tool for ZipTool {
        fn name(&self) -> &str {
            "zip"
        }

        fn description(&self) -> &str {
            "Takes a ZIP code"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                input_schema: InputSchema::object().property(
                    "zip_code",
                    PropertySchema::string("ZIP code"),
                    true,
                ),
            }
        }

        async fn execute(&self, _input: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text("ok"))
        }
    }

    #[test]
    fn test_schema_json_shape() {
        let value = serde_json::to_value(ZipTool.schema()).unwrap();
        assert_eq!(value["inputSchema"]["type"], "object");
        assert_eq!(value["inputSchema"]["properties"]["zip_code"]["type"], "string");
        assert_eq!(value["inputSchema"]["required"], json!(["zip_code"]));
    }

    #[test]
    fn test_definition_parameters() {
        let def = ZipTool.schema().to_definition();
        assert_eq!(def.name, "zip");
        assert_eq!(def.parameters["required"], json!(["zip_code"]));
    }

    #[test]
    fn test_validate() {
        assert!(ZipTool.validate(&json!({"zip_code": "02906"})).is_ok());

        let missing = ZipTool.validate(&json!({})).unwrap_err();
        assert_eq!(missing.code, ErrorCode::InvalidParams);
        assert_eq!(missing.message, "zip_code is required");

        let wrong_type = ZipTool.validate(&json!({"zip_code": 2906})).unwrap_err();
        assert_eq!(wrong_type.code, ErrorCode::InvalidParams);

        assert!(ZipTool.validate(&json!("02906")).is_err());
    }

    #[test]
    fn test_output_text() {
        let output = ToolOutput::json(json!({"a": 1}));
        assert!(!output.is_error);
        assert!(output.text_content().contains("\"a\": 1"));

        let error = ToolOutput::error(json!({"error": "boom"}));
        assert!(error.is_error);

        let wire = serde_json::to_value(ToolOutput::text("hi")).unwrap();
        assert_eq!(wire["content"][0]["type"], "text");
        assert_eq!(wire["isError"], false);
    }
}
