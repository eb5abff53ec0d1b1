use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopassist_core::config::LlmConfig;

use crate::error::AgentError;
use crate::tools::ToolSpec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool call as emitted by the model. `arguments` is the raw JSON text; it is parsed only
/// when the call is executed so malformed arguments can be reported back to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn parsed_arguments(&self) -> Result<Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// One entry of a session's conversation history. The system prompt is not stored here; it
/// is sent alongside the history on every model call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content, tool_calls, tool_call_id: None }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelSettings {
    pub model_id: String,
    pub temperature: f64,
    pub streaming: bool,
}

impl From<&LlmConfig> for ModelSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model_id: config.model.clone(),
            temperature: config.temperature,
            streaming: config.streaming,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ChatRequest<'a> {
    pub settings: &'a ModelSettings,
    pub system_prompt: &'a str,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolSpec],
}

/// What the model produced for one call: final text, tool calls, or both.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ModelTurn, AgentError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChatMessage, Role, ToolCall};

    #[test]
    fn empty_arguments_parse_as_empty_object() {
        let call = ToolCall { id: "c1".into(), name: "get_cart".into(), arguments: " ".into() };

        assert_eq!(call.parsed_arguments().expect("parse"), json!({}));
    }

    #[test]
    fn malformed_arguments_surface_parse_error() {
        let call = ToolCall { id: "c1".into(), name: "add_to_cart".into(), arguments: "{id:".into() };

        assert!(call.parsed_arguments().is_err());
    }

    #[test]
    fn messages_serialize_compactly() {
        let value = serde_json::to_value(ChatMessage::user("hi")).expect("serialize");
        assert_eq!(value, json!({ "role": "user", "content": "hi" }));

        let tool = ChatMessage::tool("c9", "done");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(serde_json::to_value(tool).expect("serialize")["tool_call_id"], "c9");
    }
}
