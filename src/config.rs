use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReplyError, Result};
use crate::formatter::ELLIPSIS;

/// Platform gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the platform API
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,
    /// Environment variable holding the user-context access token
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    /// Page size requested when fetching mentions and DMs
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Longest wait honored when the platform reports a rate limit
    #[serde(default = "default_rate_limit_max_wait_secs")]
    pub rate_limit_max_wait_secs: u64,
}

fn default_gateway_base_url() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_access_token_env() -> String {
    "TWITTER_ACCESS_TOKEN".to_string()
}

fn default_max_results() -> u32 {
    50
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_max_wait_secs() -> u64 {
    900
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            access_token_env: default_access_token_env(),
            max_results: default_max_results(),
            request_timeout_secs: default_gateway_timeout_secs(),
            rate_limit_max_wait_secs: default_rate_limit_max_wait_secs(),
        }
    }
}

/// Response generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Chat completions endpoint
    #[serde(default = "default_generator_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// System message sent ahead of every cleaned input
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_generator_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_generator_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    3000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_system_prompt() -> String {
    "You answer questions sent to a social media account. \
     Reply in plain text, concisely, and keep the answer under 280 characters when possible."
        .to_string()
}

fn default_generator_timeout_secs() -> u64 {
    120
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_generator_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            request_timeout_secs: default_generator_timeout_secs(),
        }
    }
}

/// Main configuration for the reply-loop service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds to sleep between polling cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum outbound message length in characters
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    /// Stop after this many cycles (None = run until shutdown)
    #[serde(default)]
    pub max_cycles: Option<u32>,
    /// Initial mention high-water mark (None = process start time)
    #[serde(default)]
    pub mention_epoch: Option<DateTime<Utc>>,
    /// Leading character of address tokens stripped from inbound text
    #[serde(default = "default_address_marker")]
    pub address_marker: char,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_message_limit() -> usize {
    280
}

fn default_address_marker() -> char {
    '@'
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            message_limit: default_message_limit(),
            max_cycles: None,
            mention_epoch: None,
            address_marker: default_address_marker(),
            gateway: GatewayConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ReplyError::ConfigError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ReplyError::ConfigError(e.to_string()))
    }

    /// Default config file location, `<config_dir>/reply-loop/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reply-loop").join("config.toml"))
    }

    /// Load from an explicit path, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Merge CLI arguments into this configuration
    /// CLI arguments take precedence over config file values
    pub fn merge_cli_args(
        &mut self,
        interval_secs: Option<u64>,
        message_limit: Option<usize>,
        max_cycles: Option<u32>,
    ) {
        if let Some(secs) = interval_secs {
            self.interval_secs = secs;
        }
        if let Some(limit) = message_limit {
            self.message_limit = limit;
        }
        if max_cycles.is_some() {
            self.max_cycles = max_cycles;
        }
    }

    /// Reject values the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let marker_len = ELLIPSIS.chars().count();
        if self.message_limit <= marker_len {
            return Err(ReplyError::ConfigError(format!(
                "message_limit must be greater than {}, got {}",
                marker_len, self.message_limit
            )));
        }
        if self.address_marker.is_whitespace() {
            return Err(ReplyError::ConfigError(
                "address_marker must not be whitespace".to_string(),
            ));
        }
        if self.max_cycles == Some(0) {
            return Err(ReplyError::ConfigError(
                "max_cycles must be at least 1 when set".to_string(),
            ));
        }
        if self.gateway.max_results == 0 {
            return Err(ReplyError::ConfigError(
                "gateway.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a secret from the environment variable named by the config
pub fn credential_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ReplyError::MissingCredential(var.to_string())),
    }
}
