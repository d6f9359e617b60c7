//! Error types for the consumer.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for consumer operations.
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Errors that end a consumer run.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The producer could not be reached.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Producer address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The producer closed the connection before a whole unit arrived.
    #[error("server closed the connection after {received_blocks} of {expected_blocks} blocks")]
    ServerClosed {
        /// Whole blocks received.
        received_blocks: u32,
        /// Blocks in a unit.
        expected_blocks: u32,
    },

    /// Socket error while receiving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Latency histogram could not be created.
    #[error("histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}
