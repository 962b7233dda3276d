//! Configuration loading, validation, and management for Lumi.
//!
//! Loads configuration from `$LUMI_CONFIG` or `~/.lumi/config.toml` with
//! environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.lumi/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completion API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Chat model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upstream request timeout, seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Optional file replacing the built-in system prompt template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<PathBuf>,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Specialized retrieval topics, checked in order (first match wins)
    #[serde(default = "default_topics")]
    pub topics: Vec<TopicConfig>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_max_tokens() -> u32 {
    1200
}
fn default_temperature() -> f32 {
    0.3
}
fn default_request_timeout() -> u64 {
    30
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
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("system_prompt_path", &self.system_prompt_path)
            .field("retrieval", &self.retrieval)
            .field("history", &self.history)
            .field("confirmation", &self.confirmation)
            .field("topics", &self.topics)
            .field("gateway", &self.gateway)
            .field("store", &self.store)
            .field("auth", &self.auth)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks requested in the first pass
    #[serde(default = "default_k")]
    pub k: usize,

    /// Best-scoring sources kept for refinement
    #[serde(default = "default_top_sources")]
    pub top_sources: usize,

    /// Chunks requested per source in the second pass
    #[serde(default = "default_refine_depth")]
    pub refine_depth: usize,

    /// Upper bound on the document-knowledge prompt layer, in chars
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_k() -> usize {
    15
}
fn default_top_sources() -> usize {
    2
}
fn default_refine_depth() -> usize {
    5
}
fn default_max_context_chars() -> usize {
    24_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            top_sources: default_top_sources(),
            refine_depth: default_refine_depth(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_limit_per_role")]
    pub limit_per_role: usize,
}

fn default_limit_per_role() -> usize {
    5
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit_per_role: default_limit_per_role(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Minutes a proposal stays pending; 0 keeps it until answered
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

fn default_ttl_minutes() -> u64 {
    30
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

/// A specialized retrieval topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    /// Lowercase phrases; any one matching selects the topic
    pub keywords: Vec<String>,
    /// Expanded query run through the aggregator
    pub query: String,
}

fn default_topics() -> Vec<TopicConfig> {
    let topic = |name: &str, keywords: &[&str], query: &str| TopicConfig {
        name: name.into(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        query: query.into(),
    };
    vec![
        topic(
            "night_weaning",
            &[
                "tomas nocturnas",
                "destete nocturno",
                "desmame nocturno",
                "disminuir tomas",
                "reducir tomas",
                "quitar tomas",
                "lorena furtado",
            ],
            "desmame nocturno etapas Lorena Furtado destete respetuoso",
        ),
        topic(
            "partner_support",
            &[
                "pareja",
                "esposo",
                "papá",
                "padre",
                "dividir",
                "ayuda",
                "trabajo nocturno",
                "acompañar",
                "turno",
                "por turnos",
            ],
            "pareja acompañamiento neurociencia asociación materna trabajo nocturno firmeza tranquila",
        ),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Requests per minute per caller; 0 disables limiting
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_rate_limit() -> u32 {
    60
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rate_limit_per_minute: default_rate_limit(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file (`:memory:` for a throwaway store)
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "lumi.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Bearer tokens accepted by the gateway.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// token → user id
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &format!("[{} REDACTED]", self.tokens.len()))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `$LUMI_CONFIG` or `~/.lumi/config.toml`.
    ///
    /// Environment overrides, highest priority first:
    /// - `LUMI_API_KEY`, then `OPENAI_API_KEY`
    /// - `LUMI_MODEL`, then `OPENAI_MODEL`
    /// - `LUMI_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("LUMI_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("LUMI_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = non_empty("LUMI_MODEL").or_else(|| non_empty("OPENAI_MODEL")) {
            self.model = model;
        }
        if let Some(url) = non_empty("LUMI_API_URL") {
            self.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lumi")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.retrieval.k == 0 || self.retrieval.top_sources == 0 || self.retrieval.refine_depth == 0
        {
            return Err(ConfigError::ValidationError(
                "retrieval.k, retrieval.top_sources and retrieval.refine_depth must be >= 1".into(),
            ));
        }
        if self.history.limit_per_role == 0 {
            return Err(ConfigError::ValidationError(
                "history.limit_per_role must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Checks required before serving chat traffic.
    pub fn validate_for_serving(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if !self.has_api_key() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            system_prompt_path: None,
            retrieval: RetrievalConfig::default(),
            history: HistoryConfig::default(),
            confirmation: ConfirmationConfig::default(),
            topics: default_topics(),
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
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

    #[error("No API key configured (set LUMI_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey,
}
