use thiserror::Error;

/// Failure categories surfaced to users and operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    Network,
    Api,
    Unknown,
    Server,
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Api => "api",
            Self::Unknown => "unknown",
            Self::Server => "server",
            Self::Configuration => "configuration",
        }
    }
}

/// Errors that cross the HTTP boundary. Messages are user-safe by construction.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("validation failed: {message}")]
    Validation { message: String, session_id: Option<String> },
    #[error("internal error")]
    Server { session_id: Option<String> },
    #[error("endpoint not found")]
    NotFound,
}

impl InterfaceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), session_id: None }
    }

    pub fn with_session(self, session_id: Option<String>) -> Self {
        match self {
            Self::Validation { message, .. } => Self::Validation { message, session_id },
            Self::Server { .. } => Self::Server { session_id },
            Self::NotFound => Self::NotFound,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation.as_str(),
            Self::Server { .. } => ErrorCategory::Server.as_str(),
            Self::NotFound => "not_found",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::Server { .. } => "An internal error occurred. Please try again.".to_string(),
            Self::NotFound => "Endpoint not found".to_string(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Validation { session_id, .. } | Self::Server { session_id } => {
                session_id.as_deref()
            }
            Self::NotFound => None,
        }
    }
}
