//! Append-only observation log consumed by external monitors.
//!
//! Components record an [`Observation`] after an operation has fully
//! succeeded; failed operations record nothing. The log keeps every entry in
//! order and fans each one out to live subscribers over a
//! `tokio::sync::broadcast` channel. Observations are notifications only and
//! never feed back into control flow.
//!
//! # Example
//!
//! ```
//! use festival_core::environment::SystemClock;
//! use festival_core::observation::{Observation, ObservationLog};
//! use festival_core::types::{Address, Credits, NativeValue};
//! use std::sync::Arc;
//!
//! let log = ObservationLog::new(Arc::new(SystemClock), 16);
//! let mut monitor = log.subscribe();
//!
//! log.record(Observation::CreditReceived {
//!     identity: Address::new(),
//!     amount: Credits::new(600),
//!     value: NativeValue::new(600_000),
//! });
//!
//! assert_eq!(log.len(), 1);
//! assert!(monitor.try_recv().is_ok());
//! ```

use crate::environment::Clock;
use crate::types::{Address, Credits, EventId, ExchangeRate, NativeValue, TicketId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors raised while exporting observations.
#[derive(Error, Debug)]
pub enum ObservationError {
    /// Failed to serialize an observation to bytes.
    #[error("Failed to serialize observation: {0}")]
    Serialization(String),

    /// Failed to deserialize an observation from bytes.
    #[error("Failed to deserialize observation: {0}")]
    Deserialization(String),
}

/// A fact emitted by one of the economy's components.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    // ========== Ledger ==========
    /// Credits were acquired with external value
    CreditReceived {
        /// Account credited
        identity: Address,
        /// Credits issued
        amount: Credits,
        /// Value paid in
        value: NativeValue,
    },
    /// Credits moved between accounts
    CreditTransferred {
        /// Debited account
        from: Address,
        /// Credited account
        to: Address,
        /// Amount moved
        amount: Credits,
    },
    /// Credits were burned and external value released to the holder
    CreditWithdrawn {
        /// Account debited
        identity: Address,
        /// Credits burned
        amount: Credits,
        /// Value released
        value: NativeValue,
    },
    /// The ledger owner swept all held external value
    ValueSwept {
        /// Ledger owner
        owner: Address,
        /// Value released
        value: NativeValue,
    },
    /// The exchange rate changed
    RateChanged {
        /// New rate
        rate: ExchangeRate,
    },

    // ========== Ticket registry ==========
    /// Tickets were pre-allocated without charge
    TicketsMinted {
        /// Event the tickets belong to
        event_id: EventId,
        /// Holder of the new tickets
        recipient: Address,
        /// Minted ids
        tickets: Vec<TicketId>,
    },
    /// Tickets were bought at face value
    TicketsPurchased {
        /// Event the tickets belong to
        event_id: EventId,
        /// Buyer
        buyer: Address,
        /// Tickets handed to the buyer
        tickets: Vec<TicketId>,
        /// Credits paid into the treasury
        paid: Credits,
    },
    /// A ticket was scanned at the gate
    TicketScanned {
        /// Event the ticket belongs to
        event_id: EventId,
        /// Holder presenting the ticket
        holder: Address,
        /// Ticket scanned
        ticket: TicketId,
    },
    /// The organiser withdrew the treasury
    FundsWithdrawn {
        /// Event
        event_id: EventId,
        /// Organiser receiving the funds
        organiser: Address,
        /// Credits withdrawn
        amount: Credits,
    },

    // ========== Voting ==========
    /// A vote was recorded
    VoteCast {
        /// Event voted on
        event_id: EventId,
        /// Voter
        voter: Address,
        /// `true` for a vote to cancel the event
        support_cancellation: bool,
    },
    /// The event was cancelled and every customer refunded
    Refund {
        /// Cancelled event
        event_id: EventId,
        /// Total credits returned to customers
        total: Credits,
    },

    // ========== Directory ==========
    /// An event was created with its registry
    EventCreated {
        /// New event
        event_id: EventId,
        /// Treasury identity of the event's registry
        registry: Address,
    },

    // ========== Marketplace ==========
    /// A ticket was listed for resale
    TicketListed {
        /// Event
        event_id: EventId,
        /// Listed ticket
        ticket: TicketId,
        /// Seller
        seller: Address,
        /// Asking price
        price: Credits,
    },
    /// A listing was withdrawn by its seller
    TicketUnlisted {
        /// Event
        event_id: EventId,
        /// Ticket no longer for sale
        ticket: TicketId,
    },
    /// A listed ticket changed hands
    TicketResold {
        /// Event
        event_id: EventId,
        /// Ticket sold
        ticket: TicketId,
        /// Previous holder
        seller: Address,
        /// New holder
        buyer: Address,
        /// Price paid by the buyer
        price: Credits,
        /// Part of the price credited to the organiser
        fee: Credits,
    },
}

impl Observation {
    /// Stable, versioned type name used by monitors for routing.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::CreditReceived { .. } => "CreditReceived.v1",
            Self::CreditTransferred { .. } => "CreditTransferred.v1",
            Self::CreditWithdrawn { .. } => "CreditWithdrawn.v1",
            Self::ValueSwept { .. } => "ValueSwept.v1",
            Self::RateChanged { .. } => "RateChanged.v1",
            Self::TicketsMinted { .. } => "TicketsMinted.v1",
            Self::TicketsPurchased { .. } => "TicketsPurchased.v1",
            Self::TicketScanned { .. } => "TicketScanned.v1",
            Self::FundsWithdrawn { .. } => "FundsWithdrawn.v1",
            Self::VoteCast { .. } => "VoteCast.v1",
            Self::Refund { .. } => "Refund.v1",
            Self::EventCreated { .. } => "EventCreated.v1",
            Self::TicketListed { .. } => "TicketListed.v1",
            Self::TicketUnlisted { .. } => "TicketUnlisted.v1",
            Self::TicketResold { .. } => "TicketResold.v1",
        }
    }

    /// Serialize this observation to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ObservationError> {
        bincode::serialize(self).map_err(|e| ObservationError::Serialization(e.to_string()))
    }

    /// Deserialize an observation from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::Deserialization`] if the bytes are not a valid observation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ObservationError> {
        bincode::deserialize(bytes).map_err(|e| ObservationError::Deserialization(e.to_string()))
    }
}

/// An observation together with its position in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recorded {
    /// Position in the log, starting at 1
    pub sequence: u64,
    /// When the observation was recorded
    pub recorded_at: DateTime<Utc>,
    /// The observation itself
    pub observation: Observation,
}

struct LogInner {
    entries: Mutex<Vec<Recorded>>,
    sender: broadcast::Sender<Recorded>,
    clock: Arc<dyn Clock>,
}

/// Shared append-only log. Cloning yields another handle to the same log.
#[derive(Clone)]
pub struct ObservationLog {
    inner: Arc<LogInner>,
}

impl ObservationLog {
    /// Creates an empty log whose live channel buffers up to `capacity`
    /// entries per lagging subscriber.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(LogInner {
                entries: Mutex::new(Vec::new()),
                sender,
                clock,
            }),
        }
    }

    /// Appends an observation and forwards it to live subscribers.
    pub fn record(&self, observation: Observation) -> u64 {
        let mut entries = self.inner.entries.lock();
        let sequence = entries.len() as u64 + 1;
        let recorded = Recorded {
            sequence,
            recorded_at: self.inner.clock.now(),
            observation,
        };
        tracing::trace!(
            sequence,
            event_type = recorded.observation.event_type(),
            "Observation recorded"
        );
        // No subscribers is not an error; the entry stays in the log.
        let _ = self.inner.sender.send(recorded.clone());
        entries.push(recorded);
        sequence
    }

    /// Subscribes to observations recorded from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Recorded> {
        self.inner.sender.subscribe()
    }

    /// Returns a copy of every entry in order.
    #[must_use]
    pub fn entries(&self) -> Vec<Recorded> {
        self.inner.entries.lock().clone()
    }

    /// Returns entries with a sequence number greater than `sequence`.
    #[must_use]
    pub fn since(&self, sequence: u64) -> Vec<Recorded> {
        self.inner
            .entries
            .lock()
            .iter()
            .filter(|r| r.sequence > sequence)
            .cloned()
            .collect()
    }

    /// Returns the observations matching a predicate, in order.
    #[must_use]
    pub fn matching<F>(&self, predicate: F) -> Vec<Observation>
    where
        F: Fn(&Observation) -> bool,
    {
        self.inner
            .entries
            .lock()
            .iter()
            .map(|r| &r.observation)
            .filter(|o| predicate(o))
            .cloned()
            .collect()
    }

    /// Number of recorded entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for ObservationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationLog")
            .field("len", &self.len())
            .field("subscribers", &self.inner.sender.receiver_count())
            .finish()
    }
}
