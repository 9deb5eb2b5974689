//! Top-level gateway errors.
//!
//! Subsystems own their error enums (`ConfigError`, `PoolError`,
//! `RelayError`, `ChatError`). This type only covers start-up and serving;
//! request paths resolve every failure into a response themselves.

use thiserror::Error;

use crate::config::ConfigError;
use crate::pool::PoolError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("invalid {name} upstream '{url}': {message}")]
    Upstream {
        name: &'static str,
        url: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error message followed by its sources, joined with `": "`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("client error (Connect)")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn chain_includes_sources() {
        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert_eq!(error_chain(&err), "client error (Connect): Connection refused");
    }
}
