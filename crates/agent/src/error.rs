use std::path::PathBuf;

use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    #[error("model request failed: {0}")]
    Model(String),
    #[error("backend gateway could not be initialized: {0}")]
    GatewayInit(#[source] GatewayError),
    #[error("transcript i/o failed for `{path}`: {source}")]
    TranscriptIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transcript `{path}` could not be decoded: {source}")]
    TranscriptFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no final answer after {iterations} tool iterations")]
    ToolLoop { iterations: usize },
}
