//! Interactive HIV risk assessment
//!
//! Asks the fixed questionnaire one question at a time over an
//! [`AnswerChannel`] and classifies the answers.

use std::time::Duration;

use chia_config::AgentConfig;
use chia_core::{AnswerChannel, Error, Result, RiskAssessment, ASSESSMENT_HEADER, RISK_QUESTIONS};

/// Assessment behaviour
#[derive(Debug, Clone)]
pub struct AssessmentOptions {
    /// Wait per answer
    pub answer_timeout: Duration,
    /// Send the questionnaire header first
    pub send_header: bool,
}

impl Default for AssessmentOptions {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for AssessmentOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            answer_timeout: Duration::from_secs(config.answer_timeout_secs),
            send_header: config.assessment_header,
        }
    }
}

/// Run the questionnaire and send the advisory line
pub async fn assess_risk(
    channel: &dyn AnswerChannel,
    options: &AssessmentOptions,
) -> Result<RiskAssessment> {
    if options.send_header {
        channel.notify(ASSESSMENT_HEADER).await?;
    }

    let mut assessment = RiskAssessment::default();
    for question in RISK_QUESTIONS.iter() {
        let answer = tokio::time::timeout(options.answer_timeout, channel.ask(question.text))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "No answer to '{}' within {}s",
                    question.key,
                    options.answer_timeout.as_secs()
                ))
            })??;
        assessment.record(question.key, &answer);
    }

    channel.notify(assessment.advice()).await?;

    tracing::info!(
        channel = channel.name(),
        high_risk = assessment.high_risk,
        "Risk assessment complete"
    );

    Ok(assessment)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Channel replaying canned answers and recording what was sent
    #[derive(Default)]
    pub struct ScriptedChannel {
        pub answers: Mutex<VecDeque<String>>,
        pub sent: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        pub fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnswerChannel for ScriptedChannel {
        async fn ask(&self, prompt: &str) -> Result<String> {
            self.sent.lock().push(prompt.to_string());
            let next = self.answers.lock().pop_front();
            match next {
                Some(answer) => Ok(answer),
                None => std::future::pending().await,
            }
        }

        async fn notify(&self, text: &str) -> Result<()> {
            self.sent.lock().push(text.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
