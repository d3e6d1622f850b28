//! Evaluation question sets
//!
//! Runs fixed question sets through the QA chain and writes
//! `{question, answer, contexts, reference}` records as JSON. Scoring is done
//! by external tooling on those files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::qa::QaChain;
use crate::RagError;

/// Placeholder context for questions that retrieved nothing
pub const NO_CONTEXT: &str = "No context found";

const REFERENCES: [&str; 8] = [
    "HIV stands for Human Immunodeficiency Virus. It attacks the body's immune system, making it \
     harder to fight off infections and diseases. If not treated, it can lead to AIDS (Acquired \
     Immunodeficiency Syndrome)",
    "HIV attacks the immune system by targeting CD4 cells, also known as T cells. These cells help \
     the body fight infections. HIV enters these cells, uses them to make more copies of itself, \
     and then destroys them. Over time, the number of CD4 cells drops, making it harder for the \
     body to fight off infections and diseases.",
    "HIV can spread through certain body fluids like blood, semen, vaginal fluids, rectal fluids, \
     and breast milk. Common ways it transmits include unprotected sex, sharing needles, and from \
     mother to baby during birth or breastfeeding.",
    "There are three stages of HIV infection: \n Acute HIV Infection: This happens 2-4 weeks after \
     getting the virus. Symptoms can feel like the flu, such as fever, sore throat, and swollen \
     glands.\nChronic HIV Infection: Also called clinical latency. The virus is still active but \
     reproduces at low levels. People might not have symptoms or only mild ones.\nAIDS: This is \
     the final stage. The immune system is badly damaged, and people get severe illnesses or \
     infections. Symptoms can include rapid weight loss, extreme tiredness, and prolonged swelling \
     of the lymph glands.",
    "PrEP, or Pre-Exposure Prophylaxis, is a preventive treatment for people who do not have HIV \
     but are more likely to have HIV exposure. PrEP involves taking a medication that helps \
     prevent the virus from establishing an infection if you are exposed to it.",
    "Yes, PrEP is suitable for MSM with different sexual behaviors. It is important to discuss \
     your sexual practices with your healthcare provider to determine the best PrEP regimen for \
     you.",
    "If your family finds out you're on PrEP and you're worried about their reaction, try these \
     steps:\n1. Stay Calm: Keep calm and approach the situation with a clear mind.\n2. Explain \
     PrEP: Tell them PrEP is a medication that helps prevent HIV and that it’s a smart choice for \
     your health.\n3. Address Concerns: Be ready to answer questions and provide information, and \
     seek support from a trusted friend, healthcare provider, or counselor if needed.\nRemember, \
     taking care of your health is important, and you deserve to make choices that are right for \
     you.",
    "First Injection: You'll receive a 600mg (3mL) shot of cabotegravir in your gluteal muscle. \
     Second Injection: You'll get another 600mg shot one month after the first. Ongoing Dosing \
     Schedule: After the initial two shots, receive a 600mg injection every 8 weeks (2 months), \
     with a +/- 7-day window considered on time.",
];

const DATASET_QUESTIONS: [&str; 8] = [
    "What is HIV?",
    "How does HIV attack the human immune system",
    "How is HIV transmitted?",
    "What are the stages of HIV infection?",
    "What is PrEP?",
    "Is PrEP suitable for MSM with different sexual behaviors?",
    "What do I do if family members find out I’m on PrEP?",
    "What is the schedule for injectable PrEP doses?",
];

const VARIATION_QUESTIONS: [&str; 8] = [
    "Can you explain what HIV is?",
    "In what way does HIV impact the human immune system?",
    "What are the modes of transmission for HIV?",
    "What phases are involved in HIV infection?",
    "What does PrEP stand for?",
    "Is PrEP appropriate for MSM with various sexual practices?",
    "How should I handle it if my family discovers I'm on PrEP?",
    "How often should I get the injectable PrEP shot?",
];

const NEW_QUESTIONS: [&str; 10] = [
    "How can I tell if I have HIV?",
    "I slept with someone who tested positive for HIV. Should I start taking PrEP now?",
    "How to start PrEP without using insurance?",
    "Do doctors need parent permission to prescribe PrEP for underage patients?",
    "I can’t go to a doctor’s office. Can I be prescribed PrEP virtually?",
    "How much does PrEP cost?",
    "Are there any cures for HIV?",
    "How can I convince someone to start PrEP if they think they don’t need to?",
    "I’m scared to tell a partner that I have HIV. How can I do it?",
    "Can I stop taking PrEP when my partner and I are exclusive?",
];

/// Evaluation question with an optional ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalQuestion {
    pub question: String,
    pub reference: Option<String>,
}

/// Named question set
#[derive(Debug, Clone)]
pub struct EvalSet {
    pub name: String,
    pub questions: Vec<EvalQuestion>,
    /// Substitute `NO_CONTEXT` when retrieval is empty
    pub mark_empty_context: bool,
}

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl EvalSet {
    fn with_references(name: &str, questions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            questions: questions
                .iter()
                .zip(REFERENCES)
                .map(|(q, r)| EvalQuestion {
                    question: q.to_string(),
                    reference: Some(r.to_string()),
                })
                .collect(),
            mark_empty_context: false,
        }
    }

    /// Questions taken from the knowledge base
    pub fn dataset() -> Self {
        Self::with_references("dataset", &DATASET_QUESTIONS)
    }

    /// Reworded dataset questions sharing the same ground truths
    pub fn variations() -> Self {
        Self::with_references("variations", &VARIATION_QUESTIONS)
    }

    /// Questions outside the knowledge base, no ground truth
    pub fn new_questions() -> Self {
        Self {
            name: "new_questions".to_string(),
            questions: NEW_QUESTIONS
                .iter()
                .map(|q| EvalQuestion {
                    question: q.to_string(),
                    reference: None,
                })
                .collect(),
            mark_empty_context: true,
        }
    }

    /// All built-in sets
    pub fn all() -> Vec<Self> {
        vec![Self::dataset(), Self::variations(), Self::new_questions()]
    }

    /// Answer every question in order
    pub async fn run(&self, chain: &QaChain) -> Vec<EvalRecord> {
        let mut records = Vec::with_capacity(self.questions.len());

        for item in &self.questions {
            let (answer, mut contexts) = match chain.run(&item.question).await {
                Ok(outcome) => (outcome.answer, outcome.contexts),
                Err(e) => {
                    tracing::warn!(set = %self.name, question = %item.question, error = %e, "Evaluation question failed");
                    (chain.fallback().to_string(), Vec::new())
                },
            };

            if contexts.is_empty() && self.mark_empty_context {
                contexts.push(NO_CONTEXT.to_string());
            }

            records.push(EvalRecord {
                question: item.question.clone(),
                answer,
                contexts,
                reference: item.reference.clone(),
            });
        }

        tracing::info!(set = %self.name, records = records.len(), "Evaluation set complete");
        records
    }

    /// Output file for this set under `dir`
    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.name))
    }
}

/// Write records as pretty JSON
pub async fn write_records(path: &Path, records: &[EvalRecord]) -> Result<(), RagError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RagError::Load(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| RagError::Generation(e.to_string()))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| RagError::Load(format!("Failed to write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chia_core::{
        Document, GenerateRequest, GenerateResponse, LanguageModel, RetrieveOptions, Retriever,
        ToolDefinition,
    };
    use std::sync::Arc;

    struct KeywordRetriever;

    #[async_trait]
    impl Retriever for KeywordRetriever {
        async fn retrieve(
            &self,
            query: &str,
            _options: &RetrieveOptions,
        ) -> chia_core::Result<Vec<Document>> {
            if query.contains("HIV") {
                Ok(vec![Document::new("chunk-0", "HIV is a virus.", 0.9)])
            } else {
                Ok(Vec::new())
            }
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LanguageModel for EchoLlm {
        async fn generate(&self, _request: GenerateRequest) -> chia_core::Result<GenerateResponse> {
            Ok(GenerateResponse::text("An answer."))
        }

        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[ToolDefinition],
        ) -> chia_core::Result<GenerateResponse> {
            self.generate(request).await
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn chain() -> QaChain {
        QaChain::new(Arc::new(KeywordRetriever), Arc::new(EchoLlm), 4)
    }

    #[test]
    fn test_sets_shape() {
        let dataset = EvalSet::dataset();
        let variations = EvalSet::variations();
        let new = EvalSet::new_questions();

        assert_eq!(dataset.questions.len(), 8);
        assert_eq!(variations.questions.len(), 8);
        assert_eq!(new.questions.len(), 10);
        assert_eq!(dataset.questions[0].question, "What is HIV?");
        // Variations share ground truths with the dataset
        for (a, b) in dataset.questions.iter().zip(&variations.questions) {
            assert_eq!(a.reference, b.reference);
        }
        assert!(new.questions.iter().all(|q| q.reference.is_none()));
    }

    #[tokio::test]
    async fn test_run_marks_empty_context() {
        let records = EvalSet::new_questions().run(&chain()).await;

        let cost = records
            .iter()
            .find(|r| r.question == "How much does PrEP cost?")
            .unwrap();
        assert_eq!(cost.contexts, vec![NO_CONTEXT.to_string()]);
        assert_eq!(cost.answer, "I'm sorry, I couldn't find an answer to that question.");

        let cure = records
            .iter()
            .find(|r| r.question == "Are there any cures for HIV?")
            .unwrap();
        assert_eq!(cure.answer, "An answer.");
        assert_eq!(cure.contexts, vec!["HIV is a virus.".to_string()]);
    }

    #[tokio::test]
    async fn test_dataset_keeps_empty_context() {
        let records = EvalSet::dataset().run(&chain()).await;
        let prep = records.iter().find(|r| r.question == "What is PrEP?").unwrap();
        assert!(prep.contexts.is_empty());
        assert!(prep.reference.as_deref().unwrap().starts_with("PrEP, or Pre-Exposure"));
    }

    #[tokio::test]
    async fn test_write_records() {
        let dir = tempfile::tempdir().unwrap();
        let set = EvalSet::variations();
        let path = set.output_path(&dir.path().join("out"));
        let records = set.run(&chain()).await;

        write_records(&path, &records).await.unwrap();

        let written: Vec<EvalRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, records);
    }
}
