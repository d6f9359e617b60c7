//! Sluice producer.
//!
//! A block generator fills a bounded channel at a fixed rate. A single-threaded
//! distributor accepts TCP clients and sends each one unit of blocks, but only
//! promises a unit once the channel holds enough data to back it. Clients that
//! cannot be served yet wait in a FIFO admission ring.
//!
//! ```text
//!   ┌───────────┐  chunks   ┌─────────┐  blocks  ┌──────────────┐
//!   │ Generator │──────────▶│ Channel │─────────▶│ Distributor  │──▶ clients
//!   │ (thread)  │  (waits   └─────────┘          │ budget, ring │
//!   └───────────┘  if full)                      │ sessions     │
//!                                                └──────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
mod config;
mod distributor;
mod error;
pub mod generator;
pub mod multiplexer;
pub mod report;
pub mod session;

pub use channel::{bounded, ChannelReader, ChannelWriter};
pub use config::{ConfigError, DistributorConfig, OverflowPolicy};
pub use distributor::{Distributor, DistributorSnapshot, DistributorStats};
pub use error::{ChannelError, ChannelResult, ServerError, ServerResult};
pub use generator::{Generator, GeneratorStats};
