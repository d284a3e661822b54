//! Delivery of tailed log text downstream.
//!
//! The tailer hands each non-empty portion to a [`Sink`] and knows nothing
//! about where it goes. A delivery error is terminal for the tail loop; any
//! retrying happens inside the sink before the error is returned.

// External crates
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write to stdout: {0}")]
    Console(#[source] std::io::Error),
    #[error("write to {addr} still failing after {attempts} attempts over {elapsed:?}: {source}")]
    Network {
        addr: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid destination address {0:?}, expected host:port")]
    InvalidAddress(String),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load root certificate from {path:?}: {reason}")]
    Certificate { path: PathBuf, reason: String },
    #[error("invalid TLS configuration: {0}")]
    Tls(String),
}

/// Destination for tailed log text.
#[async_trait]
pub trait Sink: Send {
    /// Deliver one portion of log text, verbatim.
    async fn deliver(&mut self, text: &str) -> Result<(), SinkError>;
}
