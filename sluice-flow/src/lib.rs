//! Flow control for Sluice.
//!
//! This crate decides *whether* another client may be served. It owns no
//! sockets and no clocks, so every decision is testable in isolation:
//!
//! - **Block budget**: counts blocks promised to active clients and gates new
//!   admissions on the channel occupancy.
//! - **Admission ring**: bounded FIFO of clients waiting for capacity.
//!
//! # Architecture
//!
//! ```text
//!   accept ──▶ ┌────────────────┐   admits()?   ┌──────────────┐
//!              │ AdmissionRing  │──────────────▶│ BlockBudget  │──▶ active
//!              │  (FIFO, bound) │◀──────────────│ (promised)   │
//!              └────────────────┘   release()   └──────────────┘
//! ```
//!
//! # Admission test
//!
//! A unit may be promised only when the channel already holds more than every
//! block promised so far plus one more unit:
//!
//! ```rust
//! use sluice_core::Geometry;
//! use sluice_flow::BlockBudget;
//!
//! let mut budget = BlockBudget::new(&Geometry::new());
//!
//! // 20000 bytes buffered, nothing promised yet: 20000 > 0 + 13312.
//! assert!(budget.try_reserve(20_000).is_ok());
//!
//! // A second unit would need more than 4 * 3328 + 13312 bytes.
//! assert!(budget.try_reserve(20_000).is_err());
//! ```

#![warn(missing_docs)]

pub mod admission_ring;
pub mod budget;
pub mod error;

// Re-export main types for convenience.
pub use admission_ring::{AdmissionRing, RingStats};
pub use budget::BlockBudget;
pub use error::{FlowError, FlowResult};
