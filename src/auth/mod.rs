//! Session cookie authentication.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → gate.rs (allow-list? token cookie present?)
//!         → allow: AuthToken in request extensions → routes
//!         → deny: 302 to /login?redirect=<original URL>
//!
//! Any upstream call
//!     → cookies.rs (Cookie header verbatim, optional bearer)
//! Any backend response
//!     → cookies.rs (every Set-Cookie republished in order)
//! ```
//!
//! # Design Decisions
//! - The token is opaque: never decoded or validated here
//! - One pair of helpers for cookie and bearer extraction, used by every relay

pub mod cookies;
pub mod gate;
pub mod session;

pub use cookies::ForwardedAuth;
pub use gate::{auth_gate_middleware, AuthGate, AuthToken, GateDecision};
