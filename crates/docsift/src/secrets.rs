//! Secret resolution for provider credentials.
//!
//! A secret may come from a literal value in the config, from a file (the
//! Docker secrets pattern), or from an environment variable. Sources are
//! tried in that order and the first one configured wins.

use secrecy::SecretString;
use std::fs;

use crate::config::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: String },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first configured source.
///
/// Empty strings count as "not configured". File contents and environment
/// values are trimmed.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SecretError::EmptyFile { path: expanded });
        }
        return Ok(SecretString::from(trimmed.to_string()));
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but a missing source yields `None`.
///
/// An unset environment variable also counts as missing, since the env var
/// name usually comes from a default rather than from the user.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) | Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Resolves the API key for the configured LLM provider, if any.
pub fn resolve_llm_api_key(config: &LlmConfig) -> Result<Option<SecretString>> {
    resolve_secret_optional(
        config.api_key.as_deref(),
        config.api_key_file.as_deref(),
        config.api_key_env_var.as_deref(),
    )
}

/// Expands a leading `~` to the current user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_direct_value_takes_priority() {
        let secret = resolve_secret(Some("direct"), Some("/nonexistent"), Some("NOPE")).unwrap();
        assert_eq!(secret.expose_secret(), "direct");
    }

    #[test]
    fn test_file_is_read_and_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  sk-from-file  ").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let secret = resolve_secret(None, Some(&path), None).unwrap();
        assert_eq!(secret.expose_secret(), "sk-from-file");
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();

        let result = resolve_secret(None, Some(&path), None);
        assert!(matches!(result, Err(SecretError::EmptyFile { .. })));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = resolve_secret(None, Some("/nonexistent/docsift/key"), None);
        assert!(matches!(result, Err(SecretError::FileReadError { .. })));
    }

    #[test]
    #[serial]
    fn test_env_var_fallback() {
        std::env::set_var("DOCSIFT_TEST_SECRET", "sk-env\n");
        let secret = resolve_secret(Some(""), None, Some("DOCSIFT_TEST_SECRET")).unwrap();
        assert_eq!(secret.expose_secret(), "sk-env");
        std::env::remove_var("DOCSIFT_TEST_SECRET");
    }

    #[test]
    #[serial]
    fn test_optional_treats_unset_env_var_as_missing() {
        std::env::remove_var("DOCSIFT_TEST_UNSET");
        let secret = resolve_secret_optional(None, None, Some("DOCSIFT_TEST_UNSET")).unwrap();
        assert!(secret.is_none());
    }

    #[test]
    fn test_no_source() {
        assert!(matches!(
            resolve_secret(None, None, None),
            Err(SecretError::NoSourceProvided)
        ));
        assert!(resolve_secret_optional(None, Some(""), None).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_resolve_llm_api_key_prefers_config_value() {
        let config = LlmConfig {
            api_key: Some("sk-config".to_string()),
            ..LlmConfig::default()
        };
        let key = resolve_llm_api_key(&config).unwrap().unwrap();
        assert_eq!(key.expose_secret(), "sk-config");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/etc/key"), "/etc/key");
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home("~/key");
            assert_eq!(expanded, format!("{}/key", home.to_string_lossy()));
        }
    }
}
