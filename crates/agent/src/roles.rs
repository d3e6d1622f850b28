//! Agent roster
//!
//! The named participants of a counseling session and the composite system
//! prompt the counselor runs with.

use chia_config::AgentPrompts;
use chia_core::{AgentProfile, AgentRole};

/// All profiles of one session
#[derive(Debug, Clone)]
pub struct AgentRoster {
    profiles: Vec<AgentProfile>,
}

impl AgentRoster {
    pub fn from_prompts(prompts: &AgentPrompts) -> Self {
        Self {
            profiles: vec![
                AgentProfile::new(AgentRole::Patient, ""),
                AgentProfile::new(AgentRole::Counselor, &prompts.counselor),
                AgentProfile::new(AgentRole::FaqSuggester, &prompts.faq_suggester),
                AgentProfile::new(AgentRole::SearchSuggester, &prompts.search_suggester),
                AgentProfile::new(AgentRole::AssessmentSuggester, &prompts.assessment_suggester),
                AgentProfile::new(AgentRole::Manager, &prompts.manager),
            ],
        }
    }

    pub fn profiles(&self) -> &[AgentProfile] {
        &self.profiles
    }

    pub fn get(&self, role: AgentRole) -> Option<&AgentProfile> {
        self.profiles.iter().find(|p| p.role == role)
    }

    /// Agent name for a role
    pub fn name(&self, role: AgentRole) -> &str {
        self.get(role)
            .map(|p| p.name.as_str())
            .unwrap_or_else(|| role.default_name())
    }

    /// Suggester that proposes a given tool
    pub fn suggester_for(&self, tool: &str) -> AgentRole {
        match tool {
            "answer_question" => AgentRole::FaqSuggester,
            "search_provider" => AgentRole::SearchSuggester,
            "assess_hiv_risk" => AgentRole::AssessmentSuggester,
            _ => AgentRole::Manager,
        }
    }

    /// Manager routing rules, counselor persona, then one note per suggester
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::new();

        if let Some(manager) = self.get(AgentRole::Manager) {
            prompt.push_str(&manager.system_message);
            prompt.push_str("\n\n");
        }
        if let Some(counselor) = self.get(AgentRole::Counselor) {
            prompt.push_str(&counselor.system_message);
        }

        let notes: Vec<String> = self
            .profiles
            .iter()
            .filter(|p| p.uses_llm && !p.executes_functions && p.role != AgentRole::Manager)
            .map(|p| format!("- {}: {}", p.name, p.system_message))
            .collect();
        if !notes.is_empty() {
            prompt.push_str("\n\nHelper roles:\n");
            prompt.push_str(&notes.join("\n"));
        }

        prompt
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::from_prompts(&AgentPrompts::default())
    }
}
