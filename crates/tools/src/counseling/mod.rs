//! Counseling Tools
//!
//! The three tools the counselor can call:
//! - `answer_question`: knowledge base Q&A
//! - `assess_hiv_risk`: interactive risk questionnaire
//! - `search_provider`: nearby PrEP providers by ZIP code

mod tools;

pub use tools::{AnswerQuestionTool, AssessRiskTool, SearchProviderTool};
