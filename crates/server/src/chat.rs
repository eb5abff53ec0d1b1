use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use shopassist_agent::MessageProcessor;
use shopassist_core::errors::InterfaceError;
use tracing::{error, info};

pub const MAX_MESSAGE_CHARS: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub processor: MessageProcessor,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatError(pub InterfaceError);

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::Validation { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            InterfaceError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.0.user_message(),
            error_type: self.0.error_type(),
            session_id: self.0.session_id().map(ToString::to_string),
        }
    }
}

impl From<InterfaceError> for ChatError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidChat {
    pub message: String,
    pub session_id: String,
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatResponse>, ChatError> {
    let ValidChat { message, session_id } = validate(&headers, &body)?;

    info!(
        event_name = "http.chat.accepted",
        session_id = %session_id,
        message_chars = message.chars().count(),
        "chat request accepted"
    );

    // Processing runs in its own task so a panic inside the agent surfaces as a JoinError
    // instead of tearing down the connection.
    let processor = state.processor.clone();
    let task_session = session_id.clone();
    let outcome =
        tokio::spawn(async move { processor.process(&message, &task_session).await }).await;

    match outcome {
        Ok(response) => Ok(Json(ChatResponse { response, session_id })),
        Err(join_error) => {
            error!(
                event_name = "http.chat.failed",
                session_id = %session_id,
                error = %join_error,
                "chat processing task aborted"
            );
            Err(InterfaceError::Server { session_id: Some(session_id) }.into())
        }
    }
}

pub async fn not_found() -> ChatError {
    ChatError(InterfaceError::NotFound)
}

/// Checks run in order and stop at the first failure.
pub fn validate(headers: &HeaderMap, body: &[u8]) -> Result<ValidChat, InterfaceError> {
    if !is_json_content_type(headers) {
        return Err(InterfaceError::validation("Content-Type must be application/json"));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(InterfaceError::validation("Request body is required"));
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| InterfaceError::validation("Request body must be valid JSON"))?;
    let object = match payload {
        Value::Null => return Err(InterfaceError::validation("Request body is required")),
        Value::Object(object) if object.is_empty() => {
            return Err(InterfaceError::validation("Request body is required"))
        }
        Value::Object(object) => object,
        _ => return Err(InterfaceError::validation("Request body must be a JSON object")),
    };

    let session_hint = object.get("session_id").and_then(Value::as_str).map(ToString::to_string);

    let message = match object.get("message") {
        None | Some(Value::Null) => {
            return Err(InterfaceError::validation("Message is required").with_session(session_hint))
        }
        Some(Value::String(message)) if message.is_empty() => {
            return Err(InterfaceError::validation("Message is required").with_session(session_hint))
        }
        Some(Value::String(message)) => message.clone(),
        Some(_) => {
            return Err(
                InterfaceError::validation("Message must be a string").with_session(session_hint)
            )
        }
    };

    let session_id = match session_hint {
        Some(session_id) if !session_id.is_empty() => session_id,
        _ => return Err(InterfaceError::validation("Session ID is required")),
    };

    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(InterfaceError::validation(format!(
            "Message is too long (max {MAX_MESSAGE_CHARS} characters)"
        ))
        .with_session(Some(session_id)));
    }

    Ok(ValidChat { message, session_id })
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let mime = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
    use serde_json::json;
    use shopassist_core::errors::InterfaceError;

    use super::{validate, ChatError, ValidChat, MAX_MESSAGE_CHARS};

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers
    }

    fn message_of(result: Result<ValidChat, InterfaceError>) -> (String, Option<String>) {
        let error = result.expect_err("validation should fail");
        (error.user_message(), error.session_id().map(ToString::to_string))
    }

    #[test]
    fn content_type_is_checked_before_body() {
        let (message, _) = message_of(validate(&HeaderMap::new(), b""));

        assert_eq!(message, "Content-Type must be application/json");
    }

    #[test]
    fn vendor_json_content_type_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/vnd.api+json"));

        let chat = validate(&headers, br#"{"message":"hi","session_id":"s"}"#).expect("valid");

        assert_eq!(chat.session_id, "s");
    }

    #[test]
    fn empty_and_blank_bodies_are_required_errors() {
        let bodies: [&[u8]; 4] = [b"", b"  ", b"null", b"{}"];
        for body in bodies {
            let (message, _) = message_of(validate(&json_headers(), body));
            assert_eq!(message, "Request body is required");
        }
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let (message, _) = message_of(validate(&json_headers(), b"{\"message\":"));

        assert_eq!(message, "Request body must be valid JSON");
    }

    #[test]
    fn missing_message_echoes_session_id() {
        let body = json!({ "session_id": "abc" }).to_string();

        let (message, session_id) = message_of(validate(&json_headers(), body.as_bytes()));

        assert_eq!(message, "Message is required");
        assert_eq!(session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn message_is_checked_before_session_id() {
        let body = json!({ "message": "" }).to_string();

        let (message, session_id) = message_of(validate(&json_headers(), body.as_bytes()));

        assert_eq!(message, "Message is required");
        assert_eq!(session_id, None);
    }

    #[test]
    fn non_string_message_is_rejected() {
        let body = json!({ "message": 42, "session_id": "abc" }).to_string();

        let (message, _) = message_of(validate(&json_headers(), body.as_bytes()));

        assert_eq!(message, "Message must be a string");
    }

    #[test]
    fn missing_session_id_is_rejected() {
        let body = json!({ "message": "hello" }).to_string();

        let (message, session_id) = message_of(validate(&json_headers(), body.as_bytes()));

        assert_eq!(message, "Session ID is required");
        assert_eq!(session_id, None);
    }

    #[test]
    fn length_limit_is_inclusive() {
        let at_limit = json!({ "message": "é".repeat(MAX_MESSAGE_CHARS), "session_id": "s" });
        let over = json!({ "message": "a".repeat(MAX_MESSAGE_CHARS + 1), "session_id": "s" });

        assert!(validate(&json_headers(), at_limit.to_string().as_bytes()).is_ok());
        let (message, session_id) =
            message_of(validate(&json_headers(), over.to_string().as_bytes()));
        assert_eq!(message, "Message is too long (max 10000 characters)");
        assert_eq!(session_id.as_deref(), Some("s"));
    }

    #[test]
    fn api_errors_map_to_statuses() {
        assert_eq!(ChatError(InterfaceError::validation("x")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ChatError(InterfaceError::NotFound).status(), StatusCode::NOT_FOUND);

        let server = ChatError(InterfaceError::Server { session_id: Some("s".into()) });
        assert_eq!(server.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(server.body().error, "An internal error occurred. Please try again.");
        assert_eq!(server.body().session_id.as_deref(), Some("s"));
    }
}
