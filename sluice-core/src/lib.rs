//! Sluice Core - Strongly-typed identifiers and system geometry for Sluice.
//!
//! This crate holds the pieces shared by the producer and the consumer: the
//! block/unit/channel sizes both sides must agree on, endpoint parsing for the
//! address argument, and the session identifier used by the distributor.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: a `SessionId` cannot be confused with a raw count
//! - **Explicit limits**: every buffer and queue has a bounded maximum
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod endpoint;
mod error;
mod geometry;
mod types;

pub use endpoint::{Endpoint, Host, LOOPBACK_FALLBACK};
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use types::SessionId;
