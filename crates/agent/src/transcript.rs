use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::AgentError;
use crate::llm::ChatMessage;

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Returns the saved history, or an empty history when nothing was saved yet.
    async fn load(&self) -> Result<Vec<ChatMessage>, AgentError>;
    async fn save(&self, messages: &[ChatMessage]) -> Result<(), AgentError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TranscriptFile {
    session_id: String,
    updated_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
}

/// One JSON file per session under the configured storage directory.
#[derive(Clone, Debug)]
pub struct FileTranscriptStore {
    session_id: String,
    path: PathBuf,
}

impl FileTranscriptStore {
    pub async fn open(storage_dir: &Path, session_id: &str) -> Result<Self, AgentError> {
        tokio::fs::create_dir_all(storage_dir).await.map_err(|source| {
            AgentError::TranscriptIo { path: storage_dir.to_path_buf(), source }
        })?;

        Ok(Self {
            session_id: session_id.to_string(),
            path: storage_dir.join(transcript_file_name(session_id)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn load(&self) -> Result<Vec<ChatMessage>, AgentError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(AgentError::TranscriptIo { path: self.path.clone(), source }),
        };

        let file: TranscriptFile = serde_json::from_slice(&raw)
            .map_err(|source| AgentError::TranscriptFormat { path: self.path.clone(), source })?;
        debug!(
            event_name = "transcript.loaded",
            session_id = %self.session_id,
            messages = file.messages.len(),
            "restored saved conversation"
        );
        Ok(file.messages)
    }

    async fn save(&self, messages: &[ChatMessage]) -> Result<(), AgentError> {
        let file = TranscriptFile {
            session_id: self.session_id.clone(),
            updated_at: Utc::now(),
            messages: messages.to_vec(),
        };
        let encoded = serde_json::to_vec_pretty(&file)
            .map_err(|source| AgentError::TranscriptFormat { path: self.path.clone(), source })?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, encoded)
            .await
            .map_err(|source| AgentError::TranscriptIo { path: staging.clone(), source })?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| AgentError::TranscriptIo { path: self.path.clone(), source })
    }
}

/// Longest escaped id used verbatim. Longer ids keep a readable prefix plus a digest so the
/// name, including the `.json.tmp` staging suffix, stays well under NAME_MAX.
const MAX_ESCAPED_ID: usize = 128;
const KEPT_PREFIX: usize = 64;

/// Session ids are caller-chosen, so anything outside `[A-Za-z0-9_-]` is hex-escaped before
/// it becomes part of a file name.
fn transcript_file_name(session_id: &str) -> String {
    let mut escaped = String::with_capacity(session_id.len());
    for ch in session_id.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            escaped.push(ch);
        } else {
            let mut buffer = [0_u8; 4];
            for byte in ch.encode_utf8(&mut buffer).bytes() {
                escaped.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    if escaped.len() <= MAX_ESCAPED_ID {
        return format!("session_{escaped}.json");
    }

    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    format!("session_{}~{:x}.json", &escaped[..KEPT_PREFIX], hasher.finalize())
}
