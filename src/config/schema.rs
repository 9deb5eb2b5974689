//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Upstream backend API used by the generic relay.
    pub backend: BackendConfig,

    /// AI inference service used by the chat relay.
    pub chat: ChatConfig,

    /// Session cookie gate.
    pub auth: AuthConfig,

    /// View-rendering web tier.
    pub pages: PagesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,

    /// Maximum inbound request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Outbound connection pool settings, one block per upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrently leased connections.
    pub max_connections: usize,

    /// Idle connections are closed after this many seconds.
    pub max_idle_secs: u64,

    /// Connections are recycled once their client generation is this old.
    pub max_lifetime_secs: u64,

    /// How long a caller may wait for a free lease.
    pub pending_acquire_timeout_secs: u64,

    /// Interval of the background eviction sweep.
    pub evict_interval_secs: u64,

    /// TCP connect timeout.
    pub connect_timeout_secs: u64,

    /// Per-read timeout. `None` keeps the transport default.
    pub read_timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            max_idle_secs: 30,
            max_lifetime_secs: 300,
            pending_acquire_timeout_secs: 60,
            evict_interval_secs: 120,
            connect_timeout_secs: 10,
            read_timeout_secs: None,
        }
    }
}

impl PoolConfig {
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn pending_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_acquire_timeout_secs)
    }

    pub fn evict_interval(&self) -> Duration {
        Duration::from_secs(self.evict_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }
}

/// Backend API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g., "http://localhost:8080").
    pub base_url: String,

    /// Optional whole-call deadline for relayed requests.
    /// Unset means no deadline beyond the transport's own behaviour.
    pub request_timeout_secs: Option<u64>,

    /// Connection pool for backend calls.
    pub pool: PoolConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: None,
            pool: PoolConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// AI chat service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the AI service.
    pub base_url: String,

    /// Absolute wall-clock limit for one streamed completion.
    pub stream_timeout_secs: u64,

    /// Largest single upstream line the relay will buffer.
    pub max_buffer_bytes: usize,

    /// Number of most recent conversation messages sent as context.
    pub history_window: usize,

    /// Models reported when the model list cannot be fetched.
    pub default_models: Vec<String>,

    /// Conversations kept in memory at once; least recently used go first.
    pub max_conversations: usize,

    /// Conversations untouched this long are forgotten.
    pub conversation_idle_secs: u64,

    /// Connection pool for AI calls.
    pub pool: PoolConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            stream_timeout_secs: 300,
            max_buffer_bytes: 10 * 1024 * 1024,
            history_window: 10,
            default_models: vec![
                "llama3".to_string(),
                "mistral".to_string(),
                "gemma".to_string(),
            ],
            max_conversations: 10_000,
            conversation_idle_secs: 1800,
            pool: PoolConfig {
                read_timeout_secs: Some(300),
                ..PoolConfig::default()
            },
        }
    }
}

impl ChatConfig {
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn conversation_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_idle_secs)
    }
}

/// Session cookie gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the cookie carrying the auth token.
    pub cookie_name: String,

    /// Where unauthenticated page requests are sent.
    pub login_path: String,

    /// Where an already authenticated user visiting the login page is sent.
    pub post_login_path: String,

    /// Paths that bypass the gate on exact match.
    pub public_paths: Vec<String>,

    /// Path prefixes that bypass the gate.
    pub public_prefixes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "token".to_string(),
            login_path: "/login".to_string(),
            post_login_path: "/dashboard".to_string(),
            public_paths: ["/login", "/favicon.ico", "/error"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            public_prefixes: ["/api/auth/", "/css/", "/js/", "/images/", "/static/", "/webjars/"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// View-rendering tier configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PagesConfig {
    /// Base URL of the page renderer. Pages answer with a generic error view when unset.
    pub base_url: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8082".to_string(),
        }
    }
}
