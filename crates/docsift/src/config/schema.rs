use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const SUMMARIZER: &str = "summarizer";
pub const ENTITY_EXTRACTOR: &str = "entity_extractor";
pub const SENTIMENT_ANALYZER: &str = "sentiment_analyzer";
pub const KEYWORD_EXTRACTOR: &str = "keyword_extractor";

/// Every agent the crate knows how to build, in default execution order.
pub const KNOWN_AGENTS: [&str; 4] = [
    SUMMARIZER,
    ENTITY_EXTRACTOR,
    SENTIMENT_ANALYZER,
    KEYWORD_EXTRACTOR,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Hard wall-clock ceiling for one agent run, retries included.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: f64,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_agent_timeout_secs() -> f64 {
    30.0
}

fn default_max_file_size_mb() -> u64 {
    10
}

fn default_agents() -> Vec<String> {
    KNOWN_AGENTS.iter().map(|name| name.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            agent_timeout_secs: default_agent_timeout_secs(),
            max_file_size_mb: default_max_file_size_mb(),
            agents: default_agents(),
            retry: RetryConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.agent_timeout_secs)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Retry policy for remote calls made by agents.
    ///
    /// Without an explicit per-attempt timeout each attempt is bounded by the
    /// agent timeout.
    pub fn retry_policy(&self) -> RetryPolicy {
        let attempt_timeout = self
            .retry
            .attempt_timeout_secs
            .unwrap_or(self.agent_timeout_secs);
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            multiplier: self.retry.multiplier,
            jitter: self.retry.jitter,
            attempt_timeout: Some(Duration::from_secs_f64(attempt_timeout)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default)]
    pub attempt_timeout_secs: Option<f64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            attempt_timeout_secs: None,
        }
    }
}

/// Connection settings for an OpenAI-compatible chat completion endpoint.
///
/// The API key is resolved through [`crate::secrets::resolve_secret_optional`]
/// from the direct value, a file, or an environment variable, in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_api_key_env_var() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
