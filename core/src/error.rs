//! Error taxonomy for the ticket economy.
//!
//! Every failure names the constraint it violated. All errors are local,
//! synchronous and abort the triggering operation without side effects.
//! Nothing in the core retries; callers use [`EconomyError::is_retryable`]
//! to tell "try again later" apart from "will never succeed as submitted".

use crate::types::{Address, Capability, Credits, EventId, NativeValue, TicketId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result alias used by every fallible operation in the economy.
pub type Result<T> = std::result::Result<T, EconomyError>;

/// Broad family an [`EconomyError`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed arguments, zero amounts, bad time windows
    InvalidInput,
    /// Role or ownership violations
    Authorization,
    /// Entity-lifecycle violations (missing or duplicate entities)
    Lifecycle,
    /// Economic constraint violations
    Economic,
    /// State-machine violations
    State,
}

/// Errors raised by the ledger, registries, voting engine, marketplace and directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    // ========== Invalid input ==========
    /// Malformed argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transfer to the null identity
    #[error("Invalid recipient address")]
    InvalidRecipient,

    /// Voting or event window is not in the future or is empty
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Arithmetic would leave the representable range
    #[error("Arithmetic overflow")]
    Overflow,

    // ========== Authorization ==========
    /// Caller is not allowed to perform an owner-only or self-only action
    #[error("{caller} is not authorized to {action}")]
    Unauthorized {
        /// Identity that attempted the action
        caller: Address,
        /// What was attempted
        action: &'static str,
    },

    /// Caller lacks a registry capability
    #[error("{caller} must have {capability} role")]
    Forbidden {
        /// Identity that attempted the action
        caller: Address,
        /// Capability that was required
        capability: Capability,
    },

    /// Identity does not own the ticket
    #[error("{holder} does not own ticket {ticket}")]
    NotOwner {
        /// Claimed holder
        holder: Address,
        /// Ticket in question
        ticket: TicketId,
    },

    /// Owner has not authorised the operator to move the ticket
    #[error("{operator} is not approved to transfer ticket {ticket}")]
    NotApproved {
        /// Operator that needed authorisation
        operator: Address,
        /// Ticket in question
        ticket: TicketId,
    },

    /// Oracle does not vouch for the organiser
    #[error("Organiser {0} could not be verified")]
    NotVerified(Address),

    /// Voter holds no ticket for the event
    #[error("Voter {0} is not a ticket holder")]
    NotTicketHolder(Address),

    // ========== Lifecycle ==========
    /// No voting session exists for the event
    #[error("Voting does not exist for event {0}")]
    VotingNotFound(EventId),

    /// A voting session already exists for the event
    #[error("Voting already exists for event {0}")]
    VotingAlreadyExists(EventId),

    /// The registry is already governed by a voting session
    #[error("Registry for event {0} is already governed by a voting session")]
    GovernanceAlreadyBound(EventId),

    /// Oracle or directory has no such event
    #[error("Event {0} not found")]
    EventNotFound(EventId),

    /// Event id is already registered in the directory
    #[error("Event ID {0} already exists")]
    EventAlreadyExists(EventId),

    /// Ticket id was never minted
    #[error("Ticket {0} does not exist")]
    TicketNotFound(TicketId),

    /// No active listing for the ticket, or caller is not its seller
    #[error("Ticket {0} not listed for sale")]
    NotListed(TicketId),

    // ========== Economic ==========
    /// Account cannot cover the debit
    #[error("Insufficient balance: {account} holds {available}, needs {required}")]
    InsufficientBalance {
        /// Account being debited
        account: Address,
        /// Current balance
        available: Credits,
        /// Amount requested
        required: Credits,
    },

    /// Held external value cannot cover a withdrawal
    #[error("Insufficient reserve: {available} held, {required} requested")]
    InsufficientReserve {
        /// Value currently held by the ledger
        available: NativeValue,
        /// Value requested
        required: NativeValue,
    },

    /// Ledger holds no external value
    #[error("No value to withdraw")]
    NothingToWithdraw,

    /// Not enough unsold tickets remain
    #[error("Exceeds maximum supply: requested {requested}, remaining {remaining}")]
    SupplyExceeded {
        /// Tickets requested
        requested: u64,
        /// Tickets still available
        remaining: u64,
    },

    /// Resale price above the cap
    #[error("Re-selling price {price} exceeds cap of {cap}")]
    PriceTooHigh {
        /// Requested listing price
        price: Credits,
        /// Highest admissible price
        cap: Credits,
    },

    /// Marketplace fee above the configured ceiling
    #[error("Marketplace fee {fee} bps too high (ceiling {ceiling} bps)")]
    FeeTooHigh {
        /// Requested fee
        fee: u32,
        /// Configured ceiling
        ceiling: u32,
    },

    // ========== State machine ==========
    /// Ticket was already scanned
    #[error("Ticket {0} has already been used")]
    AlreadyUsed(TicketId),

    /// Voting window has not opened yet
    #[error("Voting not started (opens at {starts_at})")]
    VotingNotStarted {
        /// When the window opens
        starts_at: DateTime<Utc>,
    },

    /// Voting window has ended or the event was cancelled
    #[error("Voting closed for event {0}")]
    VotingClosed(EventId),

    /// Identity already voted in this session
    #[error("{0} already voted")]
    AlreadyVoted(Address),

    /// Operator withdrawal attempted before the voting window ended
    #[error("Voting has not ended (ends at {ends_at})")]
    VotingNotEnded {
        /// When the window ends
        ends_at: DateTime<Utc>,
    },

    /// Event was cancelled by vote
    #[error("Event {0} is cancelled")]
    EventCancelled(EventId),

    /// Refund requested for an event that is not cancelled
    #[error("Event {0} is not cancelled")]
    EventNotCancelled(EventId),

    /// Refunds for the event were already disbursed
    #[error("Refunds for event {0} were already disbursed")]
    AlreadyRefunded(EventId),

    // ========== External collaborators ==========
    /// Event oracle could not be reached
    #[error("Event oracle failure: {0}")]
    Oracle(String),
}

impl EconomyError {
    /// Returns the family this error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidRecipient
            | Self::InvalidWindow(_)
            | Self::Overflow => ErrorCategory::InvalidInput,
            Self::Unauthorized { .. }
            | Self::Forbidden { .. }
            | Self::NotOwner { .. }
            | Self::NotApproved { .. }
            | Self::NotVerified(_)
            | Self::NotTicketHolder(_) => ErrorCategory::Authorization,
            Self::VotingNotFound(_)
            | Self::VotingAlreadyExists(_)
            | Self::GovernanceAlreadyBound(_)
            | Self::EventNotFound(_)
            | Self::EventAlreadyExists(_)
            | Self::TicketNotFound(_)
            | Self::NotListed(_)
            | Self::Oracle(_) => ErrorCategory::Lifecycle,
            Self::InsufficientBalance { .. }
            | Self::InsufficientReserve { .. }
            | Self::NothingToWithdraw
            | Self::SupplyExceeded { .. }
            | Self::PriceTooHigh { .. }
            | Self::FeeTooHigh { .. } => ErrorCategory::Economic,
            Self::AlreadyUsed(_)
            | Self::VotingNotStarted { .. }
            | Self::VotingClosed(_)
            | Self::AlreadyVoted(_)
            | Self::VotingNotEnded { .. }
            | Self::EventCancelled(_)
            | Self::EventNotCancelled(_)
            | Self::AlreadyRefunded(_) => ErrorCategory::State,
        }
    }

    /// Whether resubmitting the same request later could succeed without
    /// anyone else acting first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::VotingNotStarted { .. } | Self::VotingNotEnded { .. } | Self::Oracle(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_dependent_failures_are_retryable() {
        let later = EconomyError::VotingNotEnded { ends_at: Utc::now() };
        assert!(later.is_retryable());
        assert_eq!(later.category(), ErrorCategory::State);
    }

    #[test]
    fn constraint_violations_are_final() {
        let err = EconomyError::PriceTooHigh {
            price: Credits::new(200),
            cap: Credits::new(110),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Economic);
        assert_eq!(
            err.to_string(),
            "Re-selling price 200 cr exceeds cap of 110 cr"
        );
    }
}
