//! Configuration loading, validation, and management for GoalClaw.
//!
//! Loads configuration from `~/.goalclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.goalclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name, used to pick a default base URL
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Explicit base URL (overrides the provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Total tokens the model accepts across prompt and completion
    #[serde(default = "default_context_window_tokens")]
    pub context_window_tokens: usize,

    /// Tokens reserved for the completion
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_context_window_tokens() -> usize {
    8000
}
fn default_max_response_tokens() -> usize {
    2000
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("context_window_tokens", &self.context_window_tokens)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("embedding", &self.embedding)
            .field("agent", &self.agent)
            .field("workspace", &self.workspace)
            .finish()
    }
}

/// Embedding client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Longest single input accepted, in tokens
    #[serde(default = "default_max_tokens_per_input")]
    pub max_tokens_per_input: usize,

    /// Most inputs sent in one request
    #[serde(default = "default_max_inputs_per_request")]
    pub max_inputs_per_request: usize,

    /// Wait after a rate-limited response before retrying
    #[serde(default = "default_rate_limit_delay_secs")]
    pub rate_limit_delay_secs: u64,

    /// Attempts per batch, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_max_tokens_per_input() -> usize {
    8191
}
fn default_max_inputs_per_request() -> usize {
    2048
}
fn default_rate_limit_delay_secs() -> u64 {
    15
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            max_tokens_per_input: default_max_tokens_per_input(),
            max_inputs_per_request: default_max_inputs_per_request(),
            rate_limit_delay_secs: default_rate_limit_delay_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Function loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Plain-text replies in a row before the loop nudges the model
    #[serde(default = "default_loop_prevention_threshold")]
    pub loop_prevention_threshold: u32,

    /// Function results longer than this (in characters) go to the
    /// variable store. 0 disables size-based offloading.
    #[serde(default = "default_variable_threshold_chars")]
    pub variable_threshold_chars: usize,

    /// Hard upper bound on model calls per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Default number of results for the `search` function
    #[serde(default = "default_search_results")]
    pub search_results: usize,
}

fn default_loop_prevention_threshold() -> u32 {
    1
}
fn default_variable_threshold_chars() -> usize {
    3000
}
fn default_max_iterations() -> usize {
    100
}
fn default_search_results() -> usize {
    5
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            loop_prevention_threshold: default_loop_prevention_threshold(),
            variable_threshold_chars: default_variable_threshold_chars(),
            max_iterations: default_max_iterations(),
            timeout_secs: None,
            search_results: default_search_results(),
        }
    }
}

/// Where sessions and collections live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,

    #[serde(default = "default_collections_dir")]
    pub collections_dir: String,
}

fn default_root_dir() -> PathBuf {
    AppConfig::config_dir()
}
fn default_sessions_dir() -> String {
    "sessions".into()
}
fn default_collections_dir() -> String {
    "collections".into()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            sessions_dir: default_sessions_dir(),
            collections_dir: default_collections_dir(),
        }
    }
}

impl WorkspaceConfig {
    pub fn sessions_path(&self) -> PathBuf {
        self.root_dir.join(&self.sessions_dir)
    }

    pub fn collections_path(&self) -> PathBuf {
        self.root_dir.join(&self.collections_dir)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.goalclaw/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `GOALCLAW_API_KEY`, then `OPENAI_API_KEY`
    /// - `GOALCLAW_MODEL`, then `GPT_MODEL`
    /// - `CONTEXT_WINDOW_TOKENS`, `MAX_RESPONSE_TOKENS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GOALCLAW_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("GOALCLAW_MODEL").or_else(|| lookup("GPT_MODEL")) {
            self.model = model;
        }
        if let Some(raw) = lookup("CONTEXT_WINDOW_TOKENS") {
            self.context_window_tokens = parse_env("CONTEXT_WINDOW_TOKENS", &raw)?;
        }
        if let Some(raw) = lookup("MAX_RESPONSE_TOKENS") {
            self.max_response_tokens = parse_env("MAX_RESPONSE_TOKENS", &raw)?;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".goalclaw")
    }

    /// Tokens available to the chat log once the completion is reserved.
    pub fn chat_budget(&self) -> usize {
        self.context_window_tokens.saturating_sub(self.max_response_tokens)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_response_tokens >= self.context_window_tokens {
            return Err(ConfigError::ValidationError(format!(
                "max_response_tokens ({}) must be smaller than context_window_tokens ({})",
                self.max_response_tokens, self.context_window_tokens
            )));
        }

        if self.embedding.max_inputs_per_request == 0 || self.embedding.max_tokens_per_input == 0 {
            return Err(ConfigError::ValidationError(
                "embedding batch and input limits must be > 0".into(),
            ));
        }

        if self.embedding.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.max_attempts must be at least 1".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} must be a positive integer, got '{raw}'")))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            context_window_tokens: default_context_window_tokens(),
            max_response_tokens: default_max_response_tokens(),
            embedding: EmbeddingConfig::default(),
            agent: AgentSettings::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
