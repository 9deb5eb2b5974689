//! Generic backend relay.
//!
//! # Data Flow
//! ```text
//! Inbound request (gate already passed)
//!     → routes.rs (dedicated entry points + `/api/**` catch-all)
//!     → InboundRequest (method, path without `/api`, query, headers, body)
//!     → relay.rs (OutboundRequest → leased backend client → ProxyResponse)
//!     → Response to browser (status + body verbatim, Set-Cookie republished)
//!
//! Page requests:
//!     → pages.rs (pages tier if configured, otherwise an error view)
//! ```
//!
//! # Design Decisions
//! - Every entry point funnels into `BackendRelay::forward`, which never fails:
//!   transport errors become a 500 `{"error": ...}` envelope
//! - Backend 4xx/5xx pass through untouched
//! - Binary responses keep backend headers; JSON responses only keep cookies

pub mod invoice;
pub mod pages;
pub mod relay;
pub mod routes;

pub use relay::{
    AuthForwarding, BackendRelay, HeaderPolicy, InboundRequest, OutboundRequest, ProxyResponse,
    RelayError, RelayOptions,
};
pub use routes::api_routes;
