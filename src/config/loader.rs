//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = parse_config(
            r#"
            [backend]
            base_url = "http://api.internal:8080"

            [chat.pool]
            max_connections = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.base_url, "http://api.internal:8080");
        assert_eq!(config.backend.request_timeout_secs, None);
        assert_eq!(config.chat.pool.max_connections, 8);
        assert_eq!(config.chat.pool.max_idle_secs, 30);
        assert_eq!(config.chat.stream_timeout_secs, 300);
        assert_eq!(config.auth.cookie_name, "token");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config(
            r#"
            [chat]
            stream_timeout_secs = 0
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("chat.stream_timeout_secs"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(parse_config("[backend"), Err(ConfigError::Parse(_))));
    }
}
