//! HIV risk questionnaire and classification
//!
//! The questionnaire is fixed: five yes/no questions asked in order. Any
//! answer that normalizes to `"yes"` marks the patient as higher risk.
//! Collecting the answers over a channel lives in `chia-tools`; this module
//! only holds the data and the pure classification.

use serde::{Deserialize, Serialize};

/// Header sent before the first question
pub const ASSESSMENT_HEADER: &str = "HIV Risk Assessment Questionnaire";

/// Advisory shown when any answer is "yes"
pub const HIGH_RISK_ADVICE: &str = "Based on your responses, you may be at a higher risk for HIV. \
It is recommended to consider taking PrEP to protect from HIV infection.";

/// Advisory shown when no answer is "yes"
pub const LOWER_RISK_ADVICE: &str = "Based on your responses, your risk for HIV appears to be lower. \
However, continue to practice safe behaviors and consult a healthcare professional for personalized advice.";

/// One questionnaire entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskQuestion {
    pub key: &'static str,
    pub text: &'static str,
}

/// The questionnaire, in the order it is asked
pub const RISK_QUESTIONS: [RiskQuestion; 5] = [
    RiskQuestion {
        key: "sex_with_men",
        text: "Have you had unprotected sexual intercourse with men in the past 3 months? (Yes/No): ",
    },
    RiskQuestion {
        key: "multiple_partners",
        text: "Have you had multiple sexual partners in the past 12 months? (Yes/No): ",
    },
    RiskQuestion {
        key: "iv_drug_use",
        text: "Have you used intravenous drugs or shared needles? (Yes/No): ",
    },
    RiskQuestion {
        key: "partner_hiv_positive/unknown",
        text: "Do you have a sexual partner who is HIV positive/ has unknown HIV status? (Yes/No): ",
    },
    RiskQuestion {
        key: "std_history",
        text: "Have you been diagnosed with a sexually transmitted disease (STD) in the past 12 months? (Yes/No): ",
    },
];

/// Normalize a raw answer (trim + lowercase)
pub fn normalize_answer(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Completed questionnaire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// `(question key, normalized answer)` in question order
    pub responses: Vec<(String, String)>,
    pub high_risk: bool,
}

impl RiskAssessment {
    /// Classify a set of answers. Answers are normalized on the way in.
    pub fn from_responses<I, K, V>(responses: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut assessment = Self::default();
        for (key, answer) in responses {
            assessment.record(key, answer.as_ref());
        }
        assessment
    }

    /// Record one answer; a "yes" latches `high_risk`
    pub fn record(&mut self, key: impl Into<String>, raw_answer: &str) {
        let answer = normalize_answer(raw_answer);
        if answer == "yes" {
            self.high_risk = true;
        }
        self.responses.push((key.into(), answer));
    }

    /// Look up a stored answer by question key
    pub fn answer(&self, key: &str) -> Option<&str> {
        self.responses
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Advisory message for the outcome
    pub fn advice(&self) -> &'static str {
        if self.high_risk {
            HIGH_RISK_ADVICE
        } else {
            LOWER_RISK_ADVICE
        }
    }

    /// JSON payload returned to the LLM as the tool result
    pub fn to_json(&self) -> serde_json::Value {
        let responses: serde_json::Map<String, serde_json::Value> = self
            .responses
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::json!({
            "responses": responses,
            "high_risk": self.high_risk,
            "advice": self.advice(),
        })
    }
}
