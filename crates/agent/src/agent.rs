//! Counselor agent
//!
//! Runs the tool-calling loop for one session: the LLM sees the manager and
//! counselor prompts, the recent conversation and the tool definitions, and
//! either answers or asks for tools. Tool calls are executed through the
//! registry and their results fed back until a final reply arrives or the
//! round limit is hit.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use chia_config::AgentConfig;
use chia_core::{
    AgentRole, ConversationTurn, GenerateRequest, LanguageModel, Message, ToolCall,
    ToolDefinition,
};
use chia_tools::{ToolExecutor, ToolSchema};

use crate::conversation::{ConversationEvent, ConversationLog, EndReason};
use crate::roles::AgentRoster;
use crate::termination::TerminationPolicy;
use crate::traits::{Agent, AgentReply};
use crate::AgentError;

/// One counseling session's agent
pub struct CounselorAgent {
    config: AgentConfig,
    llm: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolExecutor>,
    tool_defs: Vec<ToolDefinition>,
    roster: AgentRoster,
    termination: TerminationPolicy,
    log: Arc<ConversationLog>,
    system_prompt: String,
    /// Serializes turns within the session
    turn_lock: tokio::sync::Mutex<()>,
}

impl CounselorAgent {
    pub fn new(
        session_id: impl Into<String>,
        config: AgentConfig,
        llm: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        let roster = AgentRoster::from_prompts(&config.prompts);
        let tool_defs = tools
            .list_tools()
            .iter()
            .map(ToolSchema::to_definition)
            .collect();

        Self {
            termination: TerminationPolicy::from(&config),
            system_prompt: roster.system_prompt(),
            roster,
            config,
            llm,
            tools,
            tool_defs,
            log: Arc::new(ConversationLog::new(session_id)),
            turn_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Shared conversation log
    pub fn log(&self) -> Arc<ConversationLog> {
        self.log.clone()
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    fn patient(&self) -> &str {
        self.roster.name(AgentRole::Patient)
    }

    fn counselor(&self) -> &str {
        self.roster.name(AgentRole::Counselor)
    }

    fn manager(&self) -> &str {
        self.roster.name(AgentRole::Manager)
    }

    /// System prompt, recent patient/counselor exchanges, then the new message
    fn build_request(&self, prior: &[ConversationTurn], input: &str) -> GenerateRequest {
        let patient = self.patient();
        let counselor = self.counselor();

        let history: Vec<Message> = prior
            .iter()
            .filter_map(|turn| {
                if turn.sender == patient {
                    Some(Message::user(turn.message.clone()))
                } else if turn.sender == counselor && turn.receiver == patient {
                    Some(Message::assistant(turn.message.clone()))
                } else {
                    None
                }
            })
            .collect();
        let skip = history.len().saturating_sub(self.config.history_window);

        let mut request = GenerateRequest::new(self.system_prompt.clone()).with_temperature(0.0);
        request.messages.extend(history.into_iter().skip(skip));
        request.with_user_message(input)
    }

    /// Execute one tool call, recording the suggestion and the result
    async fn run_tool(&self, call: &ToolCall) -> String {
        let suggester = self.roster.name(self.roster.suggester_for(&call.name));
        let arguments = call.arguments_value();

        self.log.record(
            suggester,
            self.counselor(),
            format!("Suggested tool call: {}({})", call.name, arguments),
        );

        let result = match self.tools.execute(&call.name, arguments).await {
            Ok(output) => output.text_content(),
            Err(e) => json!({ "error": e.to_string() }).to_string(),
        };

        self.log.record(self.counselor(), suggester, result.clone());
        result
    }

    async fn run_turn(&self, input: &str) -> Result<AgentReply, AgentError> {
        let prior = self.log.history();
        self.log.record(self.patient(), self.manager(), input);

        if self.termination.is_exit_phrase(input) {
            self.log.end(EndReason::PatientExit);
            return Ok(AgentReply {
                text: String::new(),
                ended: true,
                tool_calls: 0,
            });
        }

        let mut request = self.build_request(&prior, input);
        let mut tool_calls = 0;

        for round in 0..self.config.max_rounds {
            let response = self
                .llm
                .generate_with_tools(request.clone(), &self.tool_defs)
                .await
                .map_err(|e| AgentError::Llm(e.to_string()))?;

            if !response.has_tool_calls() {
                let checked = self.termination.check_reply(&response.text);
                self.log
                    .record(self.counselor(), self.patient(), checked.text.clone());
                if checked.terminate {
                    self.log.end(EndReason::Terminated);
                }

                tracing::debug!(
                    session = %self.log.session_id(),
                    rounds = round + 1,
                    tool_calls,
                    ended = checked.terminate,
                    "Counselor replied"
                );
                return Ok(AgentReply {
                    text: checked.text,
                    ended: checked.terminate,
                    tool_calls,
                });
            }

            request = request.with_message(Message::assistant_tool_calls(
                response.text.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let result = self.run_tool(call).await;
                request = request.with_message(Message::tool(result, call.id.clone()));
                tool_calls += 1;
            }
        }

        Err(AgentError::MaxRounds(self.config.max_rounds))
    }
}

#[async_trait]
impl Agent for CounselorAgent {
    async fn process(&self, input: &str) -> Result<AgentReply, AgentError> {
        let _turn = self.turn_lock.lock().await;

        if !self.log.is_active() {
            return Err(AgentError::Conversation(
                "Conversation has ended".to_string(),
            ));
        }

        let start = Instant::now();
        let result = self.run_turn(input).await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("chia_agent_turns_total", "outcome" => outcome).increment(1);
        metrics::histogram!("chia_agent_turn_seconds").record(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::warn!(session = %self.log.session_id(), error = %e, "Turn failed");
        }
        result
    }

    fn greet(&self) -> String {
        self.log
            .record(self.counselor(), self.patient(), self.config.greeting.clone());
        self.config.greeting.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.log.subscribe()
    }

    fn history(&self) -> Vec<ConversationTurn> {
        self.log.history()
    }

    fn latest_response(&self) -> String {
        self.log.latest_response()
    }

    fn is_active(&self) -> bool {
        self.log.is_active()
    }

    fn name(&self) -> &str {
        self.counselor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chia_core::{GenerateResponse, ToolCall};
    use chia_tools::{InputSchema, PropertySchema, Tool, ToolError, ToolOutput, ToolRegistry};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};

    /// Replays canned responses and records requests
    struct ScriptedLlm {
        responses: Mutex<VecDeque<GenerateResponse>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<GenerateResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn generate(&self, request: GenerateRequest) -> chia_core::Result<GenerateResponse> {
            self.generate_with_tools(request, &[]).await
        }

        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[ToolDefinition],
        ) -> chia_core::Result<GenerateResponse> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| chia_core::Error::Llm("script exhausted".to_string()))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "answer_question"
        }

        fn description(&self) -> &str {
            "Uppercases the question"
        }

        fn schema(&self) -> chia_tools::ToolSchema {
            chia_tools::ToolSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                input_schema: InputSchema::object().property(
                    "user_question",
                    PropertySchema::string("Question"),
                    true,
                ),
            }
        }

        async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(
                input["user_question"].as_str().unwrap_or_default().to_uppercase(),
            ))
        }
    }

    fn call(name: &str, args: &[(&str, &str)]) -> ToolCall {
        let arguments: HashMap<String, Value> = args
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        ToolCall::new(format!("call_{}", name), name, arguments)
    }

    fn agent(llm: Arc<ScriptedLlm>) -> CounselorAgent {
        let mut registry = ToolRegistry::new();
        registry.register(UpperTool);
        CounselorAgent::new("s1", AgentConfig::default(), llm, Arc::new(registry))
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let llm = ScriptedLlm::new(vec![
            GenerateResponse::with_tool_calls(vec![call(
                "answer_question",
                &[("user_question", "what is prep?")],
            )]),
            GenerateResponse::text("PrEP is a daily pill."),
        ]);
        let agent = agent(llm.clone());

        let reply = agent.process("What is PrEP?").await.unwrap();
        assert_eq!(reply.text, "PrEP is a daily pill.");
        assert_eq!(reply.tool_calls, 1);
        assert!(!reply.ended);

        let lines = agent.log().formatted_history();
        assert_eq!(lines[0], "patient to manager: What is PrEP?");
        assert!(lines[1].starts_with("suggests_retrieve_function to counselor: Suggested tool call: answer_question"));
        assert_eq!(lines[2], "counselor to suggests_retrieve_function: WHAT IS PREP?");
        assert_eq!(lines[3], "counselor to patient: PrEP is a daily pill.");

        // Second round carries the tool result
        let requests = llm.requests.lock();
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.content, "WHAT IS PREP?");
        assert_eq!(last.tool_call_id.as_deref(), Some("call_answer_question"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let llm = ScriptedLlm::new(vec![
            GenerateResponse::with_tool_calls(vec![call("book_flight", &[])]),
            GenerateResponse::text("Sorry, I can't do that."),
        ]);
        let agent = agent(llm.clone());

        let reply = agent.process("Book me a flight").await.unwrap();
        assert_eq!(reply.text, "Sorry, I can't do that.");

        let requests = llm.requests.lock();
        let fed_back = &requests[1].messages.last().unwrap().content;
        assert!(fed_back.contains("Tool not found: book_flight"));
    }

    #[tokio::test]
    async fn test_exit_phrase_skips_llm() {
        let llm = ScriptedLlm::new(Vec::new());
        let agent = agent(llm.clone());

        let reply = agent.process("End conversation").await.unwrap();
        assert!(reply.ended);
        assert!(!agent.is_active());
        assert!(llm.requests.lock().is_empty());
        assert!(agent.process("hello?").await.is_err());
    }

    #[tokio::test]
    async fn test_sentinel_ends_conversation() {
        let llm = ScriptedLlm::new(vec![GenerateResponse::text("Take care! TERMINATE")]);
        let agent = agent(llm);

        let reply = agent.process("Thanks, bye").await.unwrap();
        assert!(reply.ended);
        assert_eq!(reply.text, "Take care!");
        assert_eq!(agent.latest_response(), "Take care!");
    }

    #[tokio::test]
    async fn test_max_rounds() {
        let looping: Vec<GenerateResponse> = (0..12)
            .map(|_| {
                GenerateResponse::with_tool_calls(vec![call(
                    "answer_question",
                    &[("user_question", "again")],
                )])
            })
            .collect();
        let agent = agent(ScriptedLlm::new(looping));

        assert!(matches!(
            agent.process("loop").await,
            Err(AgentError::MaxRounds(12))
        ));
    }

    #[tokio::test]
    async fn test_history_replayed() {
        let llm = ScriptedLlm::new(vec![
            GenerateResponse::text("Hi there."),
            GenerateResponse::text("Sure."),
        ]);
        let agent = agent(llm.clone());

        assert_eq!(agent.greet(), "How can I help you?");
        agent.process("Hello").await.unwrap();
        agent.process("Tell me more").await.unwrap();

        let requests = llm.requests.lock();
        let roles: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "assistant", "user", "assistant", "user"]);
        assert_eq!(requests[1].messages.last().unwrap().content, "Tell me more");
    }
}
