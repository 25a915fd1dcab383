//! Interface to the external event-metadata oracle.
//!
//! The oracle supplies event name, date, venue and description and vouches
//! for the organiser's identity. Retrieval, transport and credentials live
//! outside the economy; only this capability is consumed.
//!
//! Returns boxed futures instead of `async fn` so the trait stays
//! dyn-compatible (`Arc<dyn EventOracle>`).

use crate::error::EconomyError;
use crate::types::{Address, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Metadata the oracle returns for a known event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Display name
    pub name: String,
    /// When the event takes place
    pub date_time: DateTime<Utc>,
    /// Venue
    pub location: String,
    /// Free-form description
    pub description: String,
    /// Identity the oracle records as the organiser
    pub organiser: Address,
}

/// Oracle failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle has no record of the event
    #[error("Event {0} not found")]
    NotFound(EventId),

    /// The oracle could not be reached or answered garbage
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

impl From<OracleError> for EconomyError {
    fn from(error: OracleError) -> Self {
        match error {
            OracleError::NotFound(event_id) => Self::EventNotFound(event_id),
            OracleError::Unavailable(reason) => Self::Oracle(reason),
        }
    }
}

/// Oracle result type
pub type OracleResult<T> = Result<T, OracleError>;

/// External source of event metadata and organiser verification.
pub trait EventOracle: Send + Sync {
    /// Fetch metadata for an event.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::NotFound`] for unknown events and
    /// [`OracleError::Unavailable`] on transport failure.
    fn fetch(
        &self,
        event_id: &EventId,
    ) -> Pin<Box<dyn Future<Output = OracleResult<EventMetadata>> + Send + '_>>;

    /// Whether the oracle vouches for `identity` as a legitimate organiser.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Unavailable`] on transport failure.
    fn verify_organiser(
        &self,
        identity: Address,
    ) -> Pin<Box<dyn Future<Output = OracleResult<bool>> + Send + '_>>;
}
