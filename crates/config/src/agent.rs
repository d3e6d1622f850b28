//! Agent configuration
//!
//! Role prompts, the greeting, termination policy and assessment timing for
//! the counselor group chat.

use serde::{Deserialize, Serialize};

use crate::constants::messages;

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Greeting shown when a session starts
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Maximum LLM rounds per patient message
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Reply suffix that ends the conversation
    #[serde(default = "default_termination_sentinel")]
    pub termination_sentinel: String,

    /// Patient message that ends the session
    #[serde(default = "default_exit_phrase")]
    pub exit_phrase: String,

    /// How long to wait for each risk assessment answer (seconds)
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_secs: u64,

    /// Send the questionnaire header before the first question
    #[serde(default = "default_true")]
    pub assessment_header: bool,

    /// Timeout for the knowledge Q&A tool (seconds)
    #[serde(default = "default_qa_timeout")]
    pub qa_timeout_secs: u64,

    /// Number of most recent turns replayed to the LLM
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Role prompts
    #[serde(default)]
    pub prompts: AgentPrompts,
}

fn default_greeting() -> String {
    messages::GREETING.to_string()
}
fn default_max_rounds() -> usize {
    12
}
fn default_termination_sentinel() -> String {
    "TERMINATE".to_string()
}
fn default_exit_phrase() -> String {
    "end conversation".to_string()
}
fn default_answer_timeout() -> u64 {
    300
}
fn default_qa_timeout() -> u64 {
    120
}
fn default_history_window() -> usize {
    40
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            max_rounds: default_max_rounds(),
            termination_sentinel: default_termination_sentinel(),
            exit_phrase: default_exit_phrase(),
            answer_timeout_secs: default_answer_timeout(),
            assessment_header: true,
            qa_timeout_secs: default_qa_timeout(),
            history_window: default_history_window(),
            prompts: AgentPrompts::default(),
        }
    }
}

/// System messages for each agent in the group chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPrompts {
    #[serde(default = "default_counselor_prompt")]
    pub counselor: String,

    /// FAQ suggester (`suggests_retrieve_function`)
    #[serde(default = "default_faq_prompt")]
    pub faq_suggester: String,

    /// Provider search suggester (`search_bot`)
    #[serde(default = "default_search_prompt")]
    pub search_suggester: String,

    /// Risk assessment suggester (`assessment_bot`)
    #[serde(default = "default_assessment_prompt")]
    pub assessment_suggester: String,

    #[serde(default = "default_manager_prompt")]
    pub manager: String,
}

fn default_counselor_prompt() -> String {
    "You are an HIV PrEP counselor. Be considerate. Call the function provided to answer user's \
     questions. NEVER stop speaking before you have used the result from the function call, and \
     transformed into conversational english to answer the question."
        .to_string()
}
fn default_faq_prompt() -> String {
    "Suggests function to use to answer HIV/PrEP counselling questions".to_string()
}
fn default_search_prompt() -> String {
    "When asked for a counselor, only suggest the function you have been provided with and use \
     the ZIP code provided as an argument."
        .to_string()
}
fn default_assessment_prompt() -> String {
    "When a patient asks to assess HIV risk, only suggest the function you have been provided with."
        .to_string()
}
fn default_manager_prompt() -> String {
    "When the patient specifically asks to assess their HIV risk, use the function suggested for \
     that purpose. When the patient asks for their nearest provider, use the function suggested \
     for that purpose. When asked any other question about HIV/PREP, always call the FAQ agent \
     before to help the counselor answer. Then have the counselor answer the question concisely \
     using the retrieved information."
        .to_string()
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            counselor: default_counselor_prompt(),
            faq_suggester: default_faq_prompt(),
            search_suggester: default_search_prompt(),
            assessment_suggester: default_assessment_prompt(),
            manager: default_manager_prompt(),
        }
    }
}
