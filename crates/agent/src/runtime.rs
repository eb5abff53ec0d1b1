use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ModelSettings, ModelTurn, Role};
use crate::tools::{ToolSet, ToolSpec};
use crate::transcript::TranscriptStore;

pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 40;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentResult {
    pub content: String,
    pub tool_invocations: usize,
    pub iterations: usize,
}

/// Agents may answer with a structured result or with bare text; callers only ever need the
/// text, via [`AgentReply::into_text`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentReply {
    Result(AgentResult),
    Text(String),
}

impl AgentReply {
    pub fn into_text(self) -> String {
        match self {
            Self::Result(result) => result.content,
            Self::Text(text) => text,
        }
    }
}

#[async_trait]
pub trait ConversationAgent: Send {
    async fn invoke(&mut self, message: &str) -> Result<AgentReply, AgentError>;
}

/// Pieces shared by every agent a factory builds.
#[derive(Clone)]
pub struct AgentShared {
    pub model: Arc<dyn ChatModel>,
    pub tools: ToolSet,
    pub tool_specs: Arc<[ToolSpec]>,
    pub settings: Arc<ModelSettings>,
    pub system_prompt: Arc<str>,
    pub max_tool_iterations: usize,
    pub max_history_messages: usize,
}

/// Index of the first message inside a window of at most `max` messages. A window never opens
/// on a tool result whose assistant call was cut off, and always keeps the latest user turn.
pub fn window_start(history: &[ChatMessage], max: usize) -> usize {
    let mut start = history.len().saturating_sub(max);
    while history.get(start).is_some_and(|message| message.role == Role::Tool) {
        start += 1;
    }
    match history.iter().rposition(|message| message.role == Role::User) {
        Some(latest_user) => start.min(latest_user),
        None => start,
    }
}

/// Tool-calling loop for one session. History lives in memory and is written through to the
/// transcript store after every completed exchange.
pub struct ShoppingAgent {
    session_id: String,
    shared: AgentShared,
    transcript: Box<dyn TranscriptStore>,
    history: Vec<ChatMessage>,
}

impl ShoppingAgent {
    pub fn new(
        session_id: impl Into<String>,
        shared: AgentShared,
        transcript: Box<dyn TranscriptStore>,
        history: Vec<ChatMessage>,
    ) -> Self {
        let mut agent = Self { session_id: session_id.into(), shared, transcript, history };
        agent.trim_history();
        agent
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    fn trim_history(&mut self) {
        let start = window_start(&self.history, self.shared.max_history_messages);
        if start > 0 {
            self.history.drain(..start);
            debug!(
                event_name = "agent.history.trimmed",
                session_id = %self.session_id,
                dropped = start,
                kept = self.history.len(),
                "dropped oldest messages"
            );
        }
    }

    async fn call_model(&self) -> Result<ModelTurn, AgentError> {
        let start = window_start(&self.history, self.shared.max_history_messages);
        self.shared
            .model
            .chat(ChatRequest {
                settings: &self.shared.settings,
                system_prompt: &self.shared.system_prompt,
                messages: &self.history[start..],
                tools: &self.shared.tool_specs,
            })
            .await
    }

    async fn run_loop(&mut self) -> Result<AgentResult, AgentError> {
        let mut tool_invocations = 0;

        for iteration in 1..=self.shared.max_tool_iterations {
            let turn = self.call_model().await?;

            if !turn.has_tool_calls() {
                let content = turn.text.clone().unwrap_or_default();
                self.history.push(ChatMessage::assistant(turn.text, Vec::new()));
                return Ok(AgentResult { content, tool_invocations, iterations: iteration });
            }

            let calls = turn.tool_calls.clone();
            self.history.push(ChatMessage::assistant(turn.text, turn.tool_calls));

            for call in calls {
                debug!(
                    event_name = "agent.tool_call",
                    session_id = %self.session_id,
                    tool = %call.name,
                    iteration,
                    "executing tool call"
                );
                let output = match call.parsed_arguments() {
                    Ok(arguments) => self.shared.tools.invoke(&call.name, &arguments).await,
                    Err(error) => format!(
                        "Invalid arguments for {}: arguments must be a JSON object ({error}).",
                        call.name
                    ),
                };
                tool_invocations += 1;
                self.history.push(ChatMessage::tool(call.id, output));
            }
        }

        Err(AgentError::ToolLoop { iterations: self.shared.max_tool_iterations })
    }
}

#[async_trait]
impl ConversationAgent for ShoppingAgent {
    async fn invoke(&mut self, message: &str) -> Result<AgentReply, AgentError> {
        let checkpoint = self.history.len();
        self.history.push(ChatMessage::user(message));

        let result = match self.run_loop().await {
            Ok(result) => result,
            Err(error) => {
                // A failed exchange leaves no partial turns behind.
                self.history.truncate(checkpoint);
                return Err(error);
            }
        };

        self.trim_history();
        if let Err(error) = self.transcript.save(&self.history).await {
            warn!(
                event_name = "transcript.save.failed",
                session_id = %self.session_id,
                error = %error,
                "conversation kept in memory but not persisted"
            );
        }

        info!(
            event_name = "agent.reply",
            session_id = %self.session_id,
            iterations = result.iterations,
            tool_invocations = result.tool_invocations,
            "agent produced a reply"
        );
        Ok(AgentReply::Result(result))
    }
}
