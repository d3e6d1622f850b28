//! Retrieve-then-generate question answering

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use chia_config::constants::messages;
use chia_core::{
    Document, GenerateRequest, LanguageModel, Message, QuestionAnswerer, RetrieveOptions,
    Retriever,
};

use crate::RagError;

/// RAG prompt template; `{question}` and `{context}` are substituted
pub const RAG_PROMPT: &str = "You are an assistant for question-answering tasks. Use the following \
pieces of retrieved context to answer the question. If you don't know the answer, just say that you \
don't know. Use three sentences maximum and keep the answer concise.\nQuestion: {question} \
\nContext: {context} \nAnswer:";

/// Answer plus the context it was generated from
#[derive(Debug, Clone)]
pub struct QaOutcome {
    pub answer: String,
    pub contexts: Vec<String>,
}

/// Question answering chain
pub struct QaChain {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
    options: RetrieveOptions,
    fallback: String,
}

impl QaChain {
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LanguageModel>, top_k: usize) -> Self {
        Self {
            retriever,
            llm,
            options: RetrieveOptions::default().with_top_k(top_k),
            fallback: messages::QA_FALLBACK.to_string(),
        }
    }

    /// Fixed apology returned when nothing usable comes back
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Fill the prompt template
    pub fn build_prompt(question: &str, docs: &[Document]) -> String {
        let context = docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        RAG_PROMPT
            .replace("{question}", question)
            .replace("{context}", &context)
    }

    /// Run the chain; errors propagate
    pub async fn run(&self, question: &str) -> Result<QaOutcome, RagError> {
        let start = Instant::now();

        let docs = self
            .retriever
            .retrieve(question, &self.options)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;
        let contexts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();

        if docs.is_empty() {
            tracing::info!(question = %question, "No context retrieved, using fallback");
            return Ok(QaOutcome {
                answer: self.fallback.clone(),
                contexts,
            });
        }

        let request = GenerateRequest {
            messages: vec![Message::user(Self::build_prompt(question, &docs))],
            temperature: Some(0.0),
            ..Default::default()
        };

        let response = self
            .llm
            .generate(request)
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        let text = response.text.trim();
        let answer = if text.is_empty() {
            tracing::info!(question = %question, "Blank generation, using fallback");
            self.fallback.clone()
        } else {
            text.to_string()
        };

        tracing::debug!(
            question = %question,
            contexts = contexts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Answered question"
        );

        Ok(QaOutcome { answer, contexts })
    }

    /// Answer a question; never fails, errors become the fallback
    pub async fn answer_question(&self, question: &str) -> String {
        match self.run(question).await {
            Ok(outcome) => outcome.answer,
            Err(e) => {
                tracing::warn!(question = %question, error = %e, "QA chain failed");
                self.fallback.clone()
            },
        }
    }
}

#[async_trait]
impl QuestionAnswerer for QaChain {
    async fn answer(&self, question: &str) -> chia_core::Result<String> {
        Ok(self.answer_question(question).await)
    }
}
