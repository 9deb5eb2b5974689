//! Inventory UI gateway library.
//!
//! Authenticated reverse proxy in front of the inventory backend, plus a
//! streaming relay for the AI chat service.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod proxy;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
