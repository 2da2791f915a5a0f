use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::schema::{Config, KNOWN_AGENTS};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// `<config dir>/docsift/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("docsift").join("config.json"))
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if !(config.agent_timeout_secs > 0.0) {
        return Err(ConfigError::Validation {
            message: "agent_timeout_secs must be positive".to_string(),
        });
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }
    if retry.multiplier < 1.0 {
        return Err(ConfigError::Validation {
            message: "retry.multiplier must be at least 1.0".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        return Err(ConfigError::Validation {
            message: "retry.jitter must be between 0 and 1".to_string(),
        });
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::Validation {
            message: "retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string(),
        });
    }
    if let Some(secs) = retry.attempt_timeout_secs {
        if !(secs > 0.0) {
            return Err(ConfigError::Validation {
                message: "retry.attempt_timeout_secs must be positive".to_string(),
            });
        }
    }

    if config.agents.is_empty() {
        return Err(ConfigError::Validation {
            message: "at least one agent must be configured".to_string(),
        });
    }
    let mut seen = HashSet::new();
    for agent in &config.agents {
        if !KNOWN_AGENTS.contains(&agent.as_str()) {
            return Err(ConfigError::UnknownAgent(agent.clone()));
        }
        if !seen.insert(agent.as_str()) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate agent '{}'", agent),
            });
        }
    }

    Ok(())
}
