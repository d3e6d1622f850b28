//! Conversation termination policy
//!
//! A counselor reply ends the conversation when, after trimming trailing
//! whitespace, it ends with the sentinel (ASCII case-insensitive). The
//! sentinel is removed from the text shown to the patient. A patient message
//! equal to the exit phrase (trimmed, case-insensitive) also ends it.

use chia_config::AgentConfig;

/// Counselor reply after the termination check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedReply {
    /// Text to display, sentinel removed
    pub text: String,
    pub terminate: bool,
}

#[derive(Debug, Clone)]
pub struct TerminationPolicy {
    sentinel: String,
    exit_phrase: String,
}

impl TerminationPolicy {
    pub fn new(sentinel: impl Into<String>, exit_phrase: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into().trim().to_string(),
            exit_phrase: exit_phrase.into().trim().to_string(),
        }
    }

    /// Whether a patient message asks to end the session
    pub fn is_exit_phrase(&self, message: &str) -> bool {
        !self.exit_phrase.is_empty() && message.trim().eq_ignore_ascii_case(&self.exit_phrase)
    }

    /// Apply the sentinel rule to a counselor reply
    pub fn check_reply(&self, reply: &str) -> CheckedReply {
        let trimmed = reply.trim_end();

        if !self.sentinel.is_empty() && trimmed.len() >= self.sentinel.len() {
            let split = trimmed.len() - self.sentinel.len();
            if trimmed.is_char_boundary(split)
                && trimmed[split..].eq_ignore_ascii_case(&self.sentinel)
            {
                return CheckedReply {
                    text: trimmed[..split].trim_end().to_string(),
                    terminate: true,
                };
            }
        }

        CheckedReply {
            text: reply.trim().to_string(),
            terminate: false,
        }
    }
}

impl From<&AgentConfig> for TerminationPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self::new(&config.termination_sentinel, &config.exit_phrase)
    }
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}
