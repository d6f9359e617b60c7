//! Sluice consumer.
//!
//! Connects to a producer repeatedly, receiving one unit per connection, until
//! its simulated storage is full. Records how long each connection waited for
//! its first block and how long the unit took to arrive, then reports
//! latency percentiles.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod storage;
mod timing;

pub use client::Consumer;
pub use config::{ConfigError, ConsumerConfig};
pub use error::{ConsumerError, ConsumerResult};
pub use storage::Storage;
pub use timing::{ConsumerSummary, LatencyPercentiles, SessionTiming};
