use std::sync::Arc;

use tracing::{error, info};

use crate::error::AgentError;
use crate::registry::SessionRegistry;

pub const APOLOGY: &str = "I apologize, but I encountered an error while processing your request. \
Please try again or rephrase your question.";

pub const EMPTY_REPLY_FALLBACK: &str =
    "I'm sorry, I don't have a response for that. Could you rephrase your question?";

const LOG_PREVIEW_CHARS: usize = 100;

/// Entry point for one chat message. Never fails: every error below this point is logged and
/// replaced by [`APOLOGY`].
#[derive(Clone)]
pub struct MessageProcessor {
    registry: Arc<SessionRegistry>,
}

impl MessageProcessor {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn process(&self, message: &str, session_id: &str) -> String {
        info!(
            event_name = "chat.message.received",
            session_id,
            preview = %preview(message),
            "processing message"
        );

        match self.try_process(message, session_id).await {
            Ok(reply) => {
                info!(
                    event_name = "chat.message.replied",
                    session_id,
                    preview = %preview(&reply),
                    "generated response"
                );
                reply
            }
            Err(error) => {
                error!(
                    event_name = "chat.message.failed",
                    session_id,
                    error = %error,
                    detail = ?error,
                    "message processing failed"
                );
                APOLOGY.to_string()
            }
        }
    }

    async fn try_process(&self, message: &str, session_id: &str) -> Result<String, AgentError> {
        let session = self.registry.get_or_create(session_id).await?;
        let reply = session.invoke(message).await?.into_text();

        if reply.trim().is_empty() {
            return Ok(EMPTY_REPLY_FALLBACK.to_string());
        }
        Ok(reply)
    }

    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.registry.clear(session_id).await
    }

    pub async fn active_sessions(&self) -> usize {
        self.registry.count().await
    }
}

fn preview(text: &str) -> String {
    let mut preview = text.chars().take(LOG_PREVIEW_CHARS).collect::<String>();
    if text.chars().nth(LOG_PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}
