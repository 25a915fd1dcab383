//! Festival ticket economy: credits, tickets, cancellation votes and resale.
//!
//! Attendees buy festival credits with external value, spend them on event
//! tickets, may vote to cancel an event after it starts, and may resell
//! tickets on a capped secondary market. It showcases:
//!
//! - **Ledger**: one fungible credit balance per identity, minted against
//!   external value at an owner-set exchange rate
//! - **Ticket registries**: one per event, with a supply cap, role-gated
//!   minting and scanning, and a treasury collecting sales
//! - **Cancellation voting**: a two-thirds vote by ticket holders inside the
//!   post-event window cancels the event and refunds every sold ticket
//! - **Marketplace**: listings capped at 110% of face value with a small fee
//!   paid to the organiser
//! - **Directory**: creates all of the above per event, after checking the
//!   organiser against an external oracle
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────┐
//!                     │ EventDirectory  │◄──── EventOracle (metadata, verification)
//!                     └─────────────────┘
//!              creates   │      │      │
//!          ┌─────────────┘      │      └──────────────┐
//!          ▼                    ▼                     ▼
//! ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │ TicketRegistry  │◄─│  VotingEngine   │  │   Marketplace   │
//! │  (per event)    │◄─┼─────────────────┼──│  (per event)    │
//! └─────────────────┘  └─────────────────┘  └─────────────────┘
//!          │ settle
//!          ▼
//! ┌─────────────────┐       ┌─────────────────┐
//! │     Ledger      │──────►│ ObservationLog  │
//! └─────────────────┘       └─────────────────┘
//! ```
//!
//! # Atomicity
//!
//! Every operation validates all of its preconditions before mutating
//! anything. Operations that move credits as well as tickets (purchase,
//! resale, refund) hand the ledger a complete set of legs which is checked in
//! full before any leg is applied, so an insufficient balance anywhere leaves
//! every component untouched.
//!
//! # Usage
//!
//! See [`EventDirectory::create_event`] for the entry point and the
//! `tests/` directory for whole-lifecycle scenarios.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod directory;
pub mod ledger;
pub mod marketplace;
pub mod metrics;
pub mod registry;
pub mod telemetry;
pub mod voting;

pub use config::{ConfigError, EconomyConfig};
pub use directory::{CreateEventRequest, EventDirectory, EventSummary};
pub use ledger::Ledger;
pub use marketplace::{Listing, Marketplace};
pub use registry::{EventDetails, Governance, TicketDetails, TicketRegistry};
pub use voting::{VoteOutcome, VotingDetail, VotingEngine, VotingPhase, cancellation_threshold};
