//! Client factories for the two upstreams.
//!
//! The backend relay forwards through a hyper-util client, the same way the
//! proxy forwards any other request. The AI relay uses reqwest for its
//! streaming body API.

use axum::body::Body;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};

use crate::config::PoolConfig;

pub type BackendClient = Client<HttpConnector, Body>;
pub type ChatHttpClient = reqwest::Client;

/// Build the hyper client used for backend calls.
pub fn backend_client(config: &PoolConfig) -> Result<BackendClient, String> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(config.connect_timeout()));
    connector.set_nodelay(true);

    Ok(Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(config.max_idle())
        .pool_max_idle_per_host(config.max_connections)
        .build(connector))
}

/// Build the reqwest client used for AI calls.
///
/// reqwest has no write timeout; the relay's absolute stream deadline bounds
/// slow writes instead.
pub fn chat_client(config: &PoolConfig) -> Result<ChatHttpClient, String> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .pool_idle_timeout(config.max_idle())
        .pool_max_idle_per_host(config.max_connections)
        .no_proxy();

    if let Some(read_timeout) = config.read_timeout() {
        builder = builder.read_timeout(read_timeout);
    }

    builder.build().map_err(|e| e.to_string())
}
