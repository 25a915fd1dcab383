//! # Festival Core
//!
//! Shared vocabulary for the festival ticket economy.
//!
//! This crate provides the pieces every component depends on:
//!
//! - **Types**: identities, event and ticket ids, credit and value amounts,
//!   exchange rates and basis points
//! - **Environment**: the injected [`Clock`](environment::Clock)
//! - **Errors**: one taxonomy, one variant per violated constraint
//! - **Observations**: the append-only log external monitors subscribe to
//! - **Oracle**: the interface to the external event-metadata service
//!
//! The components themselves (ledger, ticket registry, voting engine,
//! marketplace, directory) live in `festival-ticketing`.

pub mod environment;
pub mod error;
pub mod observation;
pub mod oracle;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{EconomyError, ErrorCategory, Result};
pub use observation::{Observation, ObservationError, ObservationLog, Recorded};
pub use oracle::{EventMetadata, EventOracle, OracleError, OracleResult};
pub use types::{
    Address, BasisPoints, Capability, Credits, EventId, ExchangeRate, NativeValue, TicketId,
};
