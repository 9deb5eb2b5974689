//! Inventory UI gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                     GATEWAY                      │
//!   Browser            │  ┌────────────┐   ┌───────────┐   ┌───────────┐  │
//!   ───────────────────┼─▶│ request id │──▶│ auth gate │──▶│  routes   │  │
//!                      │  │  + trace   │   │ (cookie)  │   └─────┬─────┘  │
//!                      │  └────────────┘   └─────┬─────┘         │        │
//!                      │          302 /login ◀───┘               │        │
//!                      │               ┌─────────────────────────┼──────┐ │
//!                      │               ▼                         ▼      │ │
//!                      │        ┌─────────────┐          ┌────────────┐│ │
//!                      │        │ proxy relay │          │ chat relay ││ │
//!                      │        │  /api/**    │          │ SSE/NDJSON ││ │
//!                      │        └──────┬──────┘          └─────┬──────┘│ │
//!                      │               │ lease                 │ lease │ │
//!                      │        ┌──────▼──────┐          ┌─────▼──────┐│ │
//!                      │        │backend pool │          │ chat pool  ││ │
//!                      │        └──────┬──────┘          └─────┬──────┘│ │
//!                      └───────────────┼───────────────────────┼────────┘
//!                                      ▼                       ▼
//!                                Backend API              AI service
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use inventory_gateway::admin::{self, AdminState};
use inventory_gateway::config::{load_config, GatewayConfig};
use inventory_gateway::lifecycle::{shutdown, signals, Shutdown};
use inventory_gateway::observability::{logging, metrics};
use inventory_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "inventory-gateway")]
#[command(about = "Authenticated reverse proxy and chat relay for the inventory UI", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "inventory-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.base_url,
        chat = %config.chat.base_url,
        pages = ?config.pages.base_url,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let admin_config = config.admin.clone();
    let server = HttpServer::new(config)?;

    if admin_config.enabled {
        let admin_listener = TcpListener::bind(&admin_config.bind_address).await?;
        let router = admin::setup_admin_router(AdminState::new(
            &admin_config.api_key,
            server.pool_monitor(),
        ));
        let admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %admin_config.bind_address, "Admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, router)
                .with_graceful_shutdown(shutdown::wait(admin_shutdown))
                .await
            {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    server.run(listener, shutdown.subscribe()).await?;

    if !shutdown.is_triggered() {
        tracing::warn!("HTTP server stopped without a shutdown signal");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
