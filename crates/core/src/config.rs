use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub backend: BackendConfig,
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub region: String,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub streaming: bool,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionsConfig {
    pub storage_dir: PathBuf,
    pub idle_timeout_secs: Option<u64>,
    pub max_tool_iterations: usize,
    /// Most recent messages sent to the model and kept in the transcript.
    pub max_history_messages: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Bedrock,
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub backend_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub storage_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Operator-facing hint printed next to the error when startup is aborted.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Validation(message) if message.contains("llm.api_key") => {
                "Set SHOPASSIST_LLM_API_KEY in the environment, or add `api_key` under [llm] in shopassist.toml."
            }
            Self::Validation(_) | Self::InvalidEnvOverride { .. } => {
                "Check the SHOPASSIST_* environment variables and shopassist.toml against the documented keys."
            }
            Self::MissingEnvInterpolation { .. } | Self::UnterminatedInterpolation => {
                "Every `${VAR}` referenced in shopassist.toml must be set and closed with `}`."
            }
            Self::ReadFile { .. } | Self::ParseFile { .. } | Self::MissingConfigFile(_) => {
                "Create shopassist.toml (or config/shopassist.toml) or point --config at a readable TOML file."
            }
        }
    }
}

pub const DEFAULT_MODEL_ID: &str = "us.amazon.nova-pro-v1:0";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Bedrock,
                api_key: None,
                region: "us-west-2".to_string(),
                base_url: None,
                model: DEFAULT_MODEL_ID.to_string(),
                temperature: 0.7,
                streaming: true,
                timeout_secs: 120,
            },
            backend: BackendConfig {
                base_url: "http://localhost:5000".to_string(),
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 5001,
                allowed_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
                graceful_shutdown_secs: 15,
            },
            sessions: SessionsConfig {
                storage_dir: PathBuf::from("./sessions"),
                idle_timeout_secs: None,
                max_tool_iterations: 10,
                max_history_messages: 40,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bedrock" => Ok(Self::Bedrock),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected bedrock|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn requires_api_key(self) -> bool {
        matches!(self, Self::Bedrock | Self::OpenAi)
    }
}

impl LlmConfig {
    /// Chat-completions base URL; explicit `base_url` wins over the provider default.
    pub fn effective_base_url(&self) -> String {
        if let Some(base_url) = self.base_url.as_deref().filter(|value| !value.trim().is_empty()) {
            return base_url.trim_end_matches('/').to_string();
        }

        match self.provider {
            LlmProvider::Bedrock => {
                format!("https://bedrock-runtime.{}.amazonaws.com/openai/v1", self.region)
            }
            LlmProvider::OpenAi => "https://api.openai.com/v1".to_string(),
            LlmProvider::Ollama => "http://localhost:11434/v1".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("shopassist.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(region) = llm.region {
                self.llm.region = region;
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(streaming) = llm.streaming {
                self.llm.streaming = streaming;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(allowed_origins) = server.allowed_origins {
                self.server.allowed_origins = allowed_origins;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(sessions) = patch.sessions {
            if let Some(storage_dir) = sessions.storage_dir {
                self.sessions.storage_dir = storage_dir;
            }
            if let Some(idle_timeout_secs) = sessions.idle_timeout_secs {
                self.sessions.idle_timeout_secs = Some(idle_timeout_secs);
            }
            if let Some(max_tool_iterations) = sessions.max_tool_iterations {
                self.sessions.max_tool_iterations = max_tool_iterations;
            }
            if let Some(max_history_messages) = sessions.max_history_messages {
                self.sessions.max_history_messages = max_history_messages;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SHOPASSIST_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SHOPASSIST_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SHOPASSIST_LLM_REGION") {
            self.llm.region = value;
        }
        if let Some(value) = read_env("SHOPASSIST_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SHOPASSIST_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SHOPASSIST_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f64("SHOPASSIST_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("SHOPASSIST_LLM_STREAMING") {
            self.llm.streaming = parse_bool("SHOPASSIST_LLM_STREAMING", &value)?;
        }
        if let Some(value) = read_env("SHOPASSIST_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SHOPASSIST_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPASSIST_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("SHOPASSIST_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("SHOPASSIST_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPASSIST_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SHOPASSIST_SERVER_PORT") {
            self.server.port = parse_u16("SHOPASSIST_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SHOPASSIST_SERVER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(value) = read_env("SHOPASSIST_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SHOPASSIST_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPASSIST_SESSIONS_STORAGE_DIR") {
            self.sessions.storage_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("SHOPASSIST_SESSIONS_IDLE_TIMEOUT_SECS") {
            self.sessions.idle_timeout_secs =
                Some(parse_u64("SHOPASSIST_SESSIONS_IDLE_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = read_env("SHOPASSIST_SESSIONS_MAX_TOOL_ITERATIONS") {
            self.sessions.max_tool_iterations =
                parse_usize("SHOPASSIST_SESSIONS_MAX_TOOL_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("SHOPASSIST_SESSIONS_MAX_HISTORY_MESSAGES") {
            self.sessions.max_history_messages =
                parse_usize("SHOPASSIST_SESSIONS_MAX_HISTORY_MESSAGES", &value)?;
        }

        let log_level =
            read_env("SHOPASSIST_LOGGING_LEVEL").or_else(|| read_env("SHOPASSIST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SHOPASSIST_LOGGING_FORMAT").or_else(|| read_env("SHOPASSIST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(base_url);
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(base_url) = overrides.backend_base_url {
            self.backend.base_url = base_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(storage_dir) = overrides.storage_dir {
            self.sessions.storage_dir = storage_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_backend(&self.backend)?;
        validate_server(&self.server)?;
        validate_sessions(&self.sessions)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("shopassist.toml"), PathBuf::from("config/shopassist.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.provider.requires_api_key() {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for bedrock/openai providers. Set SHOPASSIST_LLM_API_KEY or add it to shopassist.toml".to_string(),
            ));
        }
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.provider == LlmProvider::Bedrock && llm.region.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.region is required for the bedrock provider".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_sessions(sessions: &SessionsConfig) -> Result<(), ConfigError> {
    if sessions.storage_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "sessions.storage_dir must not be empty".to_string(),
        ));
    }

    if sessions.idle_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "sessions.idle_timeout_secs must be greater than zero when set".to_string(),
        ));
    }

    if sessions.max_tool_iterations == 0 {
        return Err(ConfigError::Validation(
            "sessions.max_tool_iterations must be greater than zero".to_string(),
        ));
    }

    if sessions.max_history_messages < 2 {
        return Err(ConfigError::Validation(
            "sessions.max_history_messages must be at least 2".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    backend: Option<BackendPatch>,
    server: Option<ServerPatch>,
    sessions: Option<SessionsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    region: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    streaming: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionsPatch {
    storage_dir: Option<PathBuf>,
    idle_timeout_secs: Option<u64>,
    max_tool_iterations: Option<usize>,
    max_history_messages: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
