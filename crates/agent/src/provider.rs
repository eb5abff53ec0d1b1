//! OpenAI-compatible chat completions client.
//!
//! Bedrock (through its OpenAI-compatible endpoint), OpenAI and Ollama all accept the same
//! `/chat/completions` request with native tool definitions, so a single client covers every
//! configured provider. Streaming responses are assembled into one [`ModelTurn`] before they
//! are returned.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shopassist_core::config::LlmConfig;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ModelTurn, ToolCall};
use crate::tools::ToolSpec;

pub struct OpenAiCompatibleModel {
    name: String,
    base_url: String,
    credential: Option<SecretString>,
    client: Client,
}

impl std::fmt::Debug for OpenAiCompatibleModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleModel")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleModel {
    pub fn new(
        name: &str,
        base_url: &str,
        credential: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let credential =
            credential.filter(|secret| !secret.expose_secret().trim().is_empty());
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AgentError::ModelInit(format!("http client: {error}")))?;

        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
            client,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        let name = format!("{:?}", config.provider).to_lowercase();
        let model = Self::new(
            &name,
            &config.effective_base_url(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;

        if config.provider.requires_api_key() && model.credential.is_none() {
            return Err(AgentError::ModelInit(format!(
                "{name} requires an API key; set llm.api_key or SHOPASSIST_LLM_API_KEY"
            )));
        }
        Ok(model)
    }

    fn chat_completions_url(&self) -> String {
        if self.base_url.ends_with("/chat/completions") {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn convert_tools(tools: &[ToolSpec]) -> Option<Vec<NativeToolSpec<'_>>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|tool| NativeToolSpec {
                    kind: "function",
                    function: NativeToolFunctionSpec {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
        )
    }

    fn convert_messages<'a>(system_prompt: &'a str, messages: &'a [ChatMessage]) -> Vec<NativeMessage<'a>> {
        let mut native = Vec::with_capacity(messages.len() + 1);
        native.push(NativeMessage {
            role: "system",
            content: Some(system_prompt),
            tool_call_id: None,
            tool_calls: None,
        });

        for message in messages {
            let tool_calls = (!message.tool_calls.is_empty()).then(|| {
                message
                    .tool_calls
                    .iter()
                    .map(|call| NativeToolCallRequest {
                        id: &call.id,
                        kind: "function",
                        function: NativeFunctionCall { name: &call.name, arguments: &call.arguments },
                    })
                    .collect()
            });
            native.push(NativeMessage {
                role: message.role.as_str(),
                content: message.content.as_deref(),
                tool_call_id: message.tool_call_id.as_deref(),
                tool_calls,
            });
        }
        native
    }

    fn parse_native_response(message: ResponseMessage) -> ModelTurn {
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|call| {
                let function = call.function?;
                let name = function.name?;
                Some(ToolCall {
                    id: call.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                    name,
                    arguments: function.arguments.unwrap_or_else(|| "{}".to_string()),
                })
            })
            .collect();

        ModelTurn { text: message.content.filter(|text| !text.is_empty()), tool_calls }
    }

    async fn read_stream(&self, mut response: reqwest::Response) -> Result<ModelTurn, AgentError> {
        let mut accumulator = StreamAccumulator::default();
        let mut lines = LineBuffer::default();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|error| AgentError::Model(format!("{} stream interrupted: {error}", self.name)))?
        {
            for line in lines.push(&chunk) {
                accumulator.push_line(&line)?;
            }
        }
        if let Some(rest) = lines.finish() {
            accumulator.push_line(&rest)?;
        }

        Ok(accumulator.finish())
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleModel {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ModelTurn, AgentError> {
        let tools = Self::convert_tools(request.tools);
        let native_request = NativeApiChatRequest {
            model: &request.settings.model_id,
            messages: Self::convert_messages(request.system_prompt, request.messages),
            temperature: request.settings.temperature,
            stream: request.settings.streaming,
            tool_choice: tools.as_ref().map(|_| "auto"),
            tools,
        };

        let url = self.chat_completions_url();
        debug!(
            event_name = "llm.request",
            provider = %self.name,
            model = %request.settings.model_id,
            messages = request.messages.len(),
            streaming = request.settings.streaming,
            "sending chat completion request"
        );

        let mut builder = self.client.post(&url).json(&native_request);
        if let Some(credential) = &self.credential {
            builder = builder.bearer_auth(credential.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|error| AgentError::Model(format!("{} request failed: {error}", self.name)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "llm.response.error",
                provider = %self.name,
                status = status.as_u16(),
                "model endpoint returned a failure status"
            );
            return Err(AgentError::Model(format!(
                "{} API error ({}): {}",
                self.name,
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        if request.settings.streaming {
            return self.read_stream(response).await;
        }

        let chat_response: ApiChatResponse = response
            .json()
            .await
            .map_err(|error| AgentError::Model(format!("{} response decode: {error}", self.name)))?;
        let message = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AgentError::Model(format!("No response from {}", self.name)))?;
        Ok(Self::parse_native_response(message))
    }
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct NativeApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<NativeMessage<'a>>,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<NativeToolSpec<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NativeMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<NativeToolCallRequest<'a>>>,
}

#[derive(Debug, Serialize)]
struct NativeToolSpec<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    function: NativeToolFunctionSpec<'a>,
}

#[derive(Debug, Serialize)]
struct NativeToolFunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct NativeToolCallRequest<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    function: NativeFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct NativeFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiFunction>,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunkResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiFunction>,
}

// ----------------------------------------------------------------------------
// Streaming assembly
// ----------------------------------------------------------------------------

/// Splits raw body bytes into lines. Chunks may end inside a multi-byte character, so bytes
/// are only decoded once a full line has arrived.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=newline).collect::<Vec<_>>();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    fn finish(self) -> Option<String> {
        (!self.pending.is_empty()).then(|| String::from_utf8_lossy(&self.pending).into_owned())
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds SSE `data:` lines into a single turn. Tool call fragments are keyed by their
/// `index` and concatenated in arrival order.
#[derive(Debug, Default)]
struct StreamAccumulator {
    text: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
}

impl StreamAccumulator {
    fn push_line(&mut self, line: &str) -> Result<(), AgentError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(());
        }

        let chunk: StreamChunkResponse = serde_json::from_str(data)
            .map_err(|error| AgentError::Model(format!("malformed stream chunk: {error}")))?;
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                self.text.push_str(&content);
            }
            for fragment in choice.delta.tool_calls {
                let partial = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                    partial.id = Some(id);
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> ModelTurn {
        let tool_calls = self
            .tool_calls
            .into_values()
            .filter(|partial| !partial.name.is_empty())
            .map(|partial| ToolCall {
                id: partial.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name: partial.name,
                arguments: if partial.arguments.is_empty() {
                    "{}".to_string()
                } else {
                    partial.arguments
                },
            })
            .collect();

        ModelTurn { text: (!self.text.is_empty()).then_some(self.text), tool_calls }
    }
}
