//! Core traits for the counseling assistant
//!
//! Components implement these traits so backends can be swapped and mocked
//! in tests.
//!
//! # Trait Hierarchy
//!
//! ```text
//! Language Models:
//!   - LanguageModel: Chat completion with tool calling
//!
//! Retrieval:
//!   - Retriever: Nearest-chunk lookup over the knowledge base
//!   - QuestionAnswerer: Retrieve-then-generate answers
//!
//! Interaction:
//!   - AnswerChannel: Ask the patient a question and wait for the reply
//! ```

mod answerer;
mod channel;
mod llm;
mod retriever;

pub use answerer::QuestionAnswerer;
pub use channel::AnswerChannel;
pub use llm::LanguageModel;
pub use retriever::{Document, RetrieveOptions, Retriever};
