//! Counseling Tool Implementations

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use chia_core::{AnswerChannel, QuestionAnswerer, RISK_QUESTIONS};

use crate::assessment::{assess_risk, AssessmentOptions};
use crate::locator::{LocatorError, ProviderDirectory};
use crate::mcp::{InputSchema, PropertySchema, Tool, ToolError, ToolOutput, ToolSchema};

/// Knowledge base question answering
pub struct AnswerQuestionTool {
    answerer: Arc<dyn QuestionAnswerer>,
    timeout_secs: u64,
}

impl AnswerQuestionTool {
    pub fn new(answerer: Arc<dyn QuestionAnswerer>) -> Self {
        Self {
            answerer,
            timeout_secs: 120,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl Tool for AnswerQuestionTool {
    fn name(&self) -> &str {
        "answer_question"
    }

    fn description(&self) -> &str {
        "Retrieves embedding data content to answer user's question."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object().property(
                "user_question",
                PropertySchema::string("The patient's question about HIV or PrEP"),
                true,
            ),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let question = input
            .get("user_question")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid_params("user_question is required"))?;

        let answer = self
            .answerer
            .answer(question)
            .await
            .map_err(|e| ToolError::internal(e.to_string()))?;

        Ok(ToolOutput::text(answer))
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

/// Interactive HIV risk questionnaire over the patient's channel
pub struct AssessRiskTool {
    channel: Arc<dyn AnswerChannel>,
    options: AssessmentOptions,
}

impl AssessRiskTool {
    pub fn new(channel: Arc<dyn AnswerChannel>, options: AssessmentOptions) -> Self {
        Self { channel, options }
    }
}

#[async_trait]
impl Tool for AssessRiskTool {
    fn name(&self) -> &str {
        "assess_hiv_risk"
    }

    fn description(&self) -> &str {
        "Assess patient's HIV risk when requested."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object(),
        }
    }

    async fn execute(&self, _input: Value) -> Result<ToolOutput, ToolError> {
        match assess_risk(self.channel.as_ref(), &self.options).await {
            Ok(assessment) => Ok(ToolOutput::json(assessment.to_json())),
            Err(e) => {
                tracing::warn!(channel = self.channel.name(), error = %e, "Risk assessment aborted");
                Ok(ToolOutput::error(json!({ "error": e.to_string() })))
            },
        }
    }

    /// Every answer may take the full per-answer timeout
    fn timeout_secs(&self) -> u64 {
        self.options
            .answer_timeout
            .as_secs()
            .saturating_mul(RISK_QUESTIONS.len() as u64)
            .saturating_add(30)
    }
}

/// PrEP provider search by ZIP code
pub struct SearchProviderTool {
    directory: Arc<dyn ProviderDirectory>,
    timeout_secs: u64,
}

impl SearchProviderTool {
    pub fn new(directory: Arc<dyn ProviderDirectory>) -> Self {
        Self {
            directory,
            timeout_secs: 90,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl Tool for SearchProviderTool {
    fn name(&self) -> &str {
        "search_provider"
    }

    fn description(&self) -> &str {
        "Searches for nearest provider when requested. If no ZIP code provided, asks for ZIP code."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object().property(
                "zip_code",
                PropertySchema::string("Patient's ZIP code"),
                true,
            ),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let zip_code = input
            .get("zip_code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid_params("zip_code is required"))?;

        match self.directory.locate_providers(zip_code).await {
            Ok(records) => Ok(ToolOutput::json(json!(records))),
            Err(LocatorError::InvalidZip(message)) => Err(ToolError::invalid_params(message)),
            Err(e) => {
                tracing::warn!(directory = self.directory.name(), error = %e, "Provider search failed");
                Ok(ToolOutput::error(json!({ "error": e.to_string() })))
            },
        }
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}
