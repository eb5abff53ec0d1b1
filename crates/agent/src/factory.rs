use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use shopassist_core::config::AppConfig;
use tracing::info;

use crate::error::AgentError;
use crate::gateway::{Backend, HttpGateway};
use crate::llm::{ChatModel, ModelSettings};
use crate::prompt::{render_system_prompt, ASSISTANT_NAME, PROMPT_VERSION};
use crate::provider::OpenAiCompatibleModel;
use crate::runtime::{
    AgentShared, ConversationAgent, ShoppingAgent, DEFAULT_MAX_HISTORY_MESSAGES,
    DEFAULT_MAX_TOOL_ITERATIONS,
};
use crate::tools::{ShopTool, ToolSet};
use crate::transcript::{FileTranscriptStore, TranscriptStore};

#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, session_id: &str) -> Result<Box<dyn ConversationAgent>, AgentError>;
}

/// Builds [`ShoppingAgent`]s that share one model client, one backend gateway and one
/// rendered system prompt. Only the transcript is per session.
pub struct ShoppingAgentFactory {
    shared: AgentShared,
    storage_dir: PathBuf,
}

impl ShoppingAgentFactory {
    pub fn new(
        model: Arc<dyn ChatModel>,
        backend: Arc<dyn Backend>,
        settings: ModelSettings,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        let tools = ToolSet::new(backend);
        let shared = AgentShared {
            tool_specs: tools.specs().into(),
            system_prompt: Arc::from(render_system_prompt(tools.catalog())),
            tools,
            model,
            settings: Arc::new(settings),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            max_history_messages: DEFAULT_MAX_HISTORY_MESSAGES,
        };
        Self { shared, storage_dir: storage_dir.into() }
    }

    /// Wires the real model client and HTTP gateway. Fails when the model credentials are
    /// unusable, which callers treat as a startup error.
    pub fn from_config(config: &AppConfig) -> Result<Self, AgentError> {
        let model = OpenAiCompatibleModel::from_config(&config.llm)?;
        let gateway = HttpGateway::from_config(&config.backend).map_err(AgentError::GatewayInit)?;

        info!(
            event_name = "agent.factory.ready",
            provider = ?config.llm.provider,
            model = %config.llm.model,
            backend = %gateway.base_url(),
            prompt_version = PROMPT_VERSION,
            "agent factory initialized"
        );

        Ok(Self::new(
            Arc::new(model),
            Arc::new(gateway),
            ModelSettings::from(&config.llm),
            config.sessions.storage_dir.clone(),
        )
        .with_max_tool_iterations(config.sessions.max_tool_iterations)
        .with_max_history_messages(config.sessions.max_history_messages))
    }

    pub fn with_max_tool_iterations(mut self, limit: usize) -> Self {
        self.shared.max_tool_iterations = limit.max(1);
        self
    }

    pub fn with_max_history_messages(mut self, window: usize) -> Self {
        self.shared.max_history_messages = window.max(2);
        self
    }

    pub fn tools(&self) -> &'static [ShopTool] {
        self.shared.tools.catalog()
    }
}

#[async_trait]
impl AgentFactory for ShoppingAgentFactory {
    async fn create(&self, session_id: &str) -> Result<Box<dyn ConversationAgent>, AgentError> {
        let transcript = FileTranscriptStore::open(&self.storage_dir, session_id).await?;
        let history = transcript.load().await?;

        info!(
            event_name = "agent.created",
            session_id,
            agent = ASSISTANT_NAME,
            restored_messages = history.len(),
            "created agent for session"
        );

        Ok(Box::new(ShoppingAgent::new(session_id, self.shared.clone(), Box::new(transcript), history)))
    }
}
