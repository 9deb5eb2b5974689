use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::pool::PoolStats;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

/// Capacity, outstanding leases and client generation age per pool.
pub async fn get_pools(State(state): State<AdminState>) -> Json<Vec<PoolStats>> {
    Json(state.pools.stats())
}
