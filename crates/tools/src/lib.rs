//! MCP Tools for the counseling assistant
//!
//! Implements an MCP (Model Context Protocol) compatible tool interface with
//! the counselor's three tools, the provider locator and the interactive
//! risk assessment behind them.

pub mod assessment;
pub mod counseling;
pub mod locator;
pub mod mcp;
pub mod registry;

pub use assessment::{assess_risk, AssessmentOptions};
pub use counseling::{AnswerQuestionTool, AssessRiskTool, SearchProviderTool};
pub use locator::{
    filter_within_radius, parse_distance, parse_results, LocatorError, ProviderDirectory,
    ProviderLocator, ResultSelectors,
};
pub use mcp::{
    ContentBlock, ErrorCode, InputSchema, PropertySchema, Tool, ToolError, ToolOutput, ToolSchema,
};
pub use registry::{create_registry, ToolDeps, ToolExecutor, ToolRegistry};
