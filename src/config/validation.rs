//! Configuration validation.
//!
//! Serde handles syntax; this module checks that values make sense together.
//! Every problem is reported, not just the first one.

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, PoolConfig};

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }

    // The backend relay speaks plain HTTP only.
    check_url(&mut errors, "backend.base_url", &config.backend.base_url, &["http"]);
    if config.backend.request_timeout_secs == Some(0) {
        errors.push(ValidationError::new(
            "backend.request_timeout_secs",
            "must be greater than 0 when set",
        ));
    }
    check_pool(&mut errors, "backend.pool", &config.backend.pool);

    check_url(&mut errors, "chat.base_url", &config.chat.base_url, &["http", "https"]);
    if config.chat.stream_timeout_secs == 0 {
        errors.push(ValidationError::new("chat.stream_timeout_secs", "must be greater than 0"));
    }
    if config.chat.max_buffer_bytes == 0 {
        errors.push(ValidationError::new("chat.max_buffer_bytes", "must be greater than 0"));
    }
    if config.chat.history_window == 0 {
        errors.push(ValidationError::new("chat.history_window", "must be greater than 0"));
    }
    if config.chat.default_models.is_empty() {
        errors.push(ValidationError::new("chat.default_models", "must list at least one model"));
    }
    if config.chat.max_conversations == 0 {
        errors.push(ValidationError::new("chat.max_conversations", "must be greater than 0"));
    }
    if config.chat.conversation_idle_secs == 0 {
        errors.push(ValidationError::new("chat.conversation_idle_secs", "must be greater than 0"));
    }
    check_pool(&mut errors, "chat.pool", &config.chat.pool);

    if config.auth.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new("auth.cookie_name", "must not be empty"));
    }
    if !config.auth.login_path.starts_with('/') {
        errors.push(ValidationError::new("auth.login_path", "must start with '/'"));
    }
    if !config.auth.post_login_path.starts_with('/') {
        errors.push(ValidationError::new("auth.post_login_path", "must start with '/'"));
    }
    if !config.auth.public_paths.iter().any(|p| p == &config.auth.login_path) {
        errors.push(ValidationError::new(
            "auth.public_paths",
            "must contain the login path, otherwise the login redirect loops",
        ));
    }

    if let Some(pages) = &config.pages.base_url {
        check_url(&mut errors, "pages.base_url", pages, &["http"]);
    }

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a socket address", value)));
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str, schemes: &[&str]) {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

fn check_pool(errors: &mut Vec<ValidationError>, prefix: &str, pool: &PoolConfig) {
    let positive = [
        ("max_connections", pool.max_connections as u64),
        ("max_idle_secs", pool.max_idle_secs),
        ("max_lifetime_secs", pool.max_lifetime_secs),
        ("pending_acquire_timeout_secs", pool.pending_acquire_timeout_secs),
        ("evict_interval_secs", pool.evict_interval_secs),
        ("connect_timeout_secs", pool.connect_timeout_secs),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(
                format!("{}.{}", prefix, name),
                "must be greater than 0",
            ));
        }
    }
    if pool.read_timeout_secs == Some(0) {
        errors.push(ValidationError::new(
            format!("{}.read_timeout_secs", prefix),
            "must be greater than 0 when set",
        ));
    }
}
