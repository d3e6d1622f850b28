//! Application State
//!
//! Process-wide collaborators are built once from [`Settings`] and shared by
//! every session through `Arc`.

use std::sync::Arc;
use std::time::Duration;

use chia_agent::{Agent, CounselorAgent, DetachedChannel};
use chia_config::{AgentConfig, Settings};
use chia_core::{AnswerChannel, LanguageModel};
use chia_llm::{OpenAIBackend, OpenAIConfig, OpenAIEmbeddings};
use chia_rag::{KnowledgeRetriever, QaChain};
use chia_tools::{create_registry, AssessmentOptions, ProviderLocator, ToolDeps, ToolRegistry};

use crate::session::{AgentFactory, SessionManager};
use crate::ServerError;

/// Shared backends: LLM client, knowledge chain and provider locator
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LanguageModel>,
    pub qa: Arc<QaChain>,
    pub tool_deps: ToolDeps,
}

impl Services {
    /// Connect the LLM, index the knowledge base and prepare the locator
    pub async fn build(settings: &Settings) -> Result<Self, ServerError> {
        let backend = OpenAIBackend::new(OpenAIConfig::from(&settings.llm))
            .map_err(|e| ServerError::Startup(e.to_string()))?;
        let llm: Arc<dyn LanguageModel> = Arc::new(backend);

        let embedder =
            OpenAIEmbeddings::from_settings(&settings.llm, settings.rag.embedding_batch_size)
                .map_err(|e| ServerError::Startup(e.to_string()))?;
        let retriever = KnowledgeRetriever::from_settings(&settings.rag, Arc::new(embedder))
            .await
            .map_err(|e| ServerError::Startup(e.to_string()))?;
        tracing::info!(
            source = %settings.rag.knowledge_source,
            store = ?settings.rag.vector_store,
            "Knowledge base indexed"
        );

        let qa = Arc::new(QaChain::new(
            Arc::new(retriever),
            llm.clone(),
            settings.rag.top_k,
        ));

        let locator = ProviderLocator::new(settings.locator.clone())
            .map_err(|e| ServerError::Startup(e.to_string()))?;

        let tool_deps = ToolDeps {
            answerer: qa.clone(),
            directory: Arc::new(locator),
            assessment: AssessmentOptions::from(&settings.agent),
            locator_timeout_secs: settings.locator.tool_timeout_secs,
            qa_timeout_secs: settings.agent.qa_timeout_secs,
        };

        Ok(Self { llm, qa, tool_deps })
    }
}

/// Factory building a counselor whose tools ask through the session channel
pub fn counselor_factory(
    config: AgentConfig,
    llm: Arc<dyn LanguageModel>,
    deps: ToolDeps,
) -> AgentFactory {
    Arc::new(move |user_id: &str, channel: Arc<dyn AnswerChannel>| {
        let registry = create_registry(&deps, channel);
        Arc::new(CounselorAgent::new(
            user_id,
            config.clone(),
            llm.clone(),
            Arc::new(registry),
        )) as Arc<dyn Agent>
    })
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Settings loaded at startup
    pub settings: Arc<Settings>,
    /// Session manager
    pub sessions: Arc<SessionManager>,
    /// Tool registry for direct calls; has no interactive channel
    pub tools: Arc<ToolRegistry>,
    /// LLM backend, probed by the readiness check
    pub llm: Arc<dyn LanguageModel>,
}

impl AppState {
    /// Create application state from built services
    pub fn new(settings: Settings, services: &Services) -> Self {
        let factory = counselor_factory(
            settings.agent.clone(),
            services.llm.clone(),
            services.tool_deps.clone(),
        );
        let tools = create_registry(&services.tool_deps, Arc::new(DetachedChannel));
        Self::with_parts(settings, services.llm.clone(), tools, factory)
    }

    /// Create application state from explicit parts
    pub fn with_parts(
        settings: Settings,
        llm: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        factory: AgentFactory,
    ) -> Self {
        let sessions = SessionManager::with_config(
            factory,
            settings.server.max_sessions,
            Duration::from_secs(settings.server.session_timeout_secs),
            Duration::from_secs(settings.server.cleanup_interval_secs),
        );
        Self {
            settings: Arc::new(settings),
            sessions: Arc::new(sessions),
            tools: Arc::new(tools),
            llm,
        }
    }

    /// Per-request timeout for HTTP message handling
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.server.timeout_seconds)
    }
}
