//! Admin API.
//!
//! Served on its own listener, behind a bearer API key.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Instant;

use crate::http::server::PoolMonitor;
use self::auth::admin_auth_middleware;
use self::handlers::{get_pools, get_status};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub api_key: Arc<str>,
    pub pools: PoolMonitor,
    pub started: Instant,
}

impl AdminState {
    pub fn new(api_key: &str, pools: PoolMonitor) -> Self {
        Self {
            api_key: Arc::from(api_key),
            pools,
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/pools", get(get_pools))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
