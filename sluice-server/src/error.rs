//! Error types for the distributor.

use std::net::SocketAddr;

use sluice_flow::FlowError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for distributor operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the distributor.
///
/// Per-client failures never surface here; they tear down one session and
/// the loop carries on.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error outside of any single client.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listening socket could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting from the listening socket failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Flow control rejected an operation the loop expected to succeed.
    #[error("flow control error: {0}")]
    Flow(#[from] FlowError),

    /// A connection arrived while the admission ring was full and the
    /// configured policy is to stop.
    #[error("admission ring full: {capacity} clients already waiting")]
    AdmissionRingFull {
        /// Ring capacity.
        capacity: usize,
    },
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors returned by the channel writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The reading side is gone.
    #[error("channel closed")]
    Closed,

    /// Not enough free space right now.
    #[error("channel full")]
    Full,

    /// The chunk can never fit.
    #[error("chunk of {len} bytes exceeds channel capacity {capacity}")]
    ChunkTooLarge {
        /// Chunk length.
        len: usize,
        /// Channel capacity.
        capacity: usize,
    },
}
