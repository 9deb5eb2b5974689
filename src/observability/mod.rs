//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging via `tracing` fields, never interpolated strings
//! - Request ID flows from the inbound layer to relayed backend calls
//! - Metric updates go through the `metrics` facade and are no-ops until an
//!   exporter is installed

pub mod logging;
pub mod metrics;
