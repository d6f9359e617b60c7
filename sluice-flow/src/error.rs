//! Flow control error types.

/// Flow control error type.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The channel does not hold enough data to promise another unit.
    #[error("insufficient capacity: {occupied_bytes} bytes buffered, need more than {required_bytes}")]
    InsufficientCapacity {
        /// Bytes currently buffered in the channel.
        occupied_bytes: u64,
        /// Occupancy that must be exceeded.
        required_bytes: u64,
    },

    /// Queue is full.
    #[error("queue full: {size} items (max {max_size})")]
    QueueFull {
        /// Current queue size.
        size: usize,
        /// Maximum queue size.
        max_size: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

/// Result type for flow control operations.
pub type FlowResult<T> = Result<T, FlowError>;
