//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the outbound pools and the relays on top of them
//! - Create the Axum router: `/api/**`, chat, session, invoice pages, fallback
//! - Wire up middleware (request ID, tracing, body limit, auth gate)
//! - Serve until shutdown, then stop the pool eviction sweeps

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_gate_middleware, session, AuthGate};
use crate::chat::{self, ChatClient, ConversationStore, InMemoryConversationStore};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::request;
use crate::lifecycle::shutdown;
use crate::pool::{
    backend_client, chat_client, BackendClient, ChatHttpClient, ConnectionPool, PoolStats,
};
use crate::proxy::{self, invoice, pages, BackendRelay};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gate: Arc<AuthGate>,
    pub relay: Arc<BackendRelay>,
    pub pages: Option<Arc<BackendRelay>>,
    pub chat: Arc<ChatClient>,
    pub conversations: Arc<dyn ConversationStore>,
}

impl AppState {
    pub fn max_body_bytes(&self) -> usize {
        self.config.listener.max_body_bytes
    }

    pub fn history_window(&self) -> usize {
        self.config.chat.history_window
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    state: AppState,
    backend_pool: Arc<ConnectionPool<BackendClient>>,
    pages_pool: Option<Arc<ConnectionPool<BackendClient>>>,
    chat_pool: Arc<ConnectionPool<ChatHttpClient>>,
}

impl HttpServer {
    /// Create the server and its pools. No sockets are opened yet.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        check_upstream("backend", &config.backend.base_url)?;
        check_upstream("chat", &config.chat.base_url)?;

        let backend_pool = Arc::new(ConnectionPool::new(
            "backend",
            config.backend.pool.clone(),
            backend_client,
        )?);
        let chat_pool = Arc::new(ConnectionPool::new(
            "chat",
            config.chat.pool.clone(),
            chat_client,
        )?);

        let relay = Arc::new(BackendRelay::new(
            "backend",
            &config.backend.base_url,
            "/api",
            &config.auth.cookie_name,
            backend_pool.clone(),
            config.backend.request_timeout(),
        ));

        let (pages, pages_pool) = match &config.pages.base_url {
            Some(base_url) => {
                check_upstream("pages", base_url)?;
                let pool = Arc::new(ConnectionPool::new(
                    "pages",
                    config.backend.pool.clone(),
                    backend_client,
                )?);
                let relay = BackendRelay::new(
                    "pages",
                    base_url,
                    "",
                    &config.auth.cookie_name,
                    pool.clone(),
                    config.backend.request_timeout(),
                );
                (Some(Arc::new(relay)), Some(pool))
            }
            None => (None, None),
        };

        let state = AppState {
            gate: Arc::new(AuthGate::from_config(&config.auth)),
            relay,
            pages,
            chat: Arc::new(ChatClient::new(&config.chat, chat_pool.clone())),
            conversations: Arc::new(InMemoryConversationStore::from_config(&config.chat)),
            config: Arc::new(config),
        };

        Ok(Self {
            state,
            backend_pool,
            pages_pool,
            chat_pool,
        })
    }

    pub fn backend_pool(&self) -> &Arc<ConnectionPool<BackendClient>> {
        &self.backend_pool
    }

    pub fn chat_pool(&self) -> &Arc<ConnectionPool<ChatHttpClient>> {
        &self.chat_pool
    }

    /// Source of pool statistics for the admin API.
    pub fn pool_monitor(&self) -> PoolMonitor {
        PoolMonitor {
            backend: self.backend_pool.clone(),
            pages: self.pages_pool.clone(),
            chat: self.chat_pool.clone(),
        }
    }

    /// The full router with all middleware layers.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), GatewayError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut sweeps = vec![
            self.backend_pool.spawn_eviction(shutdown.resubscribe()),
            self.chat_pool.spawn_eviction(shutdown.resubscribe()),
        ];
        if let Some(pool) = &self.pages_pool {
            sweeps.push(pool.spawn_eviction(shutdown.resubscribe()));
        }

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        for sweep in sweeps {
            let _ = sweep.await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Read-only handle on every pool, shared with the admin API.
#[derive(Debug, Clone)]
pub struct PoolMonitor {
    backend: Arc<ConnectionPool<BackendClient>>,
    pages: Option<Arc<ConnectionPool<BackendClient>>>,
    chat: Arc<ConnectionPool<ChatHttpClient>>,
}

impl PoolMonitor {
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats = vec![self.backend.stats(), self.chat.stats()];
        if let Some(pages) = &self.pages {
            stats.push(pages.stats());
        }
        stats
    }
}

fn check_upstream(name: &'static str, base_url: &str) -> Result<(), GatewayError> {
    url::Url::parse(base_url)
        .map(|_| ())
        .map_err(|e| GatewayError::Upstream {
            name,
            url: base_url.to_string(),
            message: e.to_string(),
        })
}

/// Build the Axum router with all middleware layers.
///
/// Layers run outermost first: request ID, tracing, ID echo, body limit,
/// then the auth gate in front of every route and the fallback.
fn build_router(state: AppState) -> Router {
    let max_body = state.max_body_bytes();
    let gate = state.gate.clone();

    Router::new()
        .merge(proxy::api_routes())
        .merge(chat::chat_routes())
        .route("/login", get(session::login_page))
        .route("/logout", post(session::logout))
        .route("/invoices/download", get(invoice::download_page))
        .fallback(pages::page_fallback)
        .layer(middleware::from_fn_with_state(gate, auth_gate_middleware))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(request::propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request::set_request_id_layer())
}
