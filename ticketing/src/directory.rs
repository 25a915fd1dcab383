//! Event directory: the composition root.
//!
//! Creating an event pulls its metadata from the external [`EventOracle`],
//! checks that the oracle vouches for the caller as organiser, and then wires
//! one [`TicketRegistry`], one voting session over
//! `[date_time, date_time + voting_period)` and one [`Marketplace`] together.
//! The directory keeps handles to all three for later lookups.

use crate::config::EconomyConfig;
use crate::ledger::Ledger;
use crate::marketplace::Marketplace;
use crate::metrics;
use crate::registry::{EventDetails, TicketRegistry};
use crate::voting::VotingEngine;
use chrono::{DateTime, Utc};
use festival_core::environment::Clock;
use festival_core::observation::{Observation, ObservationLog};
use festival_core::oracle::EventOracle;
use festival_core::types::{Address, Credits, EventId, ExchangeRate};
use festival_core::{EconomyError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What an organiser supplies when creating an event.
///
/// Name, date, venue and description come from the oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEventRequest {
    /// Oracle event id
    pub event_id: EventId,
    /// Ticker symbol printed on tickets
    pub symbol: String,
    /// Face value of one ticket
    pub ticket_price: Credits,
    /// Most tickets that can ever exist
    pub max_supply: u64,
}

/// Directory view of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event id
    pub event_id: EventId,
    /// Display name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// When the event takes place
    pub date_time: DateTime<Utc>,
    /// Venue
    pub location: String,
    /// Free-form description
    pub description: String,
    /// Face value of one ticket
    pub ticket_price: Credits,
    /// Supply cap
    pub max_supply: u64,
    /// Organiser identity
    pub organiser: Address,
    /// Treasury identity of the event's registry
    pub registry: Address,
    /// Identity of the event's marketplace
    pub marketplace: Address,
    /// False once the event was cancelled by vote
    pub is_active: bool,
}

#[derive(Clone)]
struct Entry {
    registry: TicketRegistry,
    marketplace: Marketplace,
}

#[derive(Default)]
struct DirectoryState {
    order: Vec<EventId>,
    events: HashMap<EventId, Entry>,
}

/// Registry of every event created through the economy.
pub struct EventDirectory {
    oracle: Arc<dyn EventOracle>,
    ledger: Ledger,
    voting: VotingEngine,
    config: EconomyConfig,
    clock: Arc<dyn Clock>,
    log: ObservationLog,
    state: Mutex<DirectoryState>,
}

impl EventDirectory {
    /// Creates an empty directory sharing `ledger` and `log`.
    #[must_use]
    pub fn new(
        ledger: Ledger,
        oracle: Arc<dyn EventOracle>,
        clock: Arc<dyn Clock>,
        log: ObservationLog,
        config: EconomyConfig,
    ) -> Self {
        Self {
            voting: VotingEngine::new(clock.clone(), log.clone()),
            oracle,
            ledger,
            config,
            clock,
            log,
            state: Mutex::new(DirectoryState::default()),
        }
    }

    /// Builds a fresh economy from `config`: one observation log sized by
    /// `config.observations`, one ledger owned by `ledger_owner`, and an
    /// empty directory over both.
    #[must_use]
    pub fn bootstrap(
        ledger_owner: Address,
        rate: ExchangeRate,
        oracle: Arc<dyn EventOracle>,
        clock: Arc<dyn Clock>,
        config: EconomyConfig,
    ) -> Self {
        let log = ObservationLog::new(clock.clone(), config.observations.channel_capacity);
        let ledger = Ledger::new(ledger_owner, rate, log.clone());
        tracing::info!(
            %ledger_owner,
            channel_capacity = config.observations.channel_capacity,
            "Economy bootstrapped"
        );
        Self::new(ledger, oracle, clock, log, config)
    }

    /// Creates an event organised by `caller`.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidInput`] if the price or supply is zero
    /// - [`EconomyError::EventAlreadyExists`] if the id is taken
    /// - [`EconomyError::EventNotFound`] if the oracle has no such event
    /// - [`EconomyError::Oracle`] if the oracle cannot be reached
    /// - [`EconomyError::NotVerified`] unless the oracle names and vouches for `caller`
    /// - [`EconomyError::InvalidWindow`] if the event date is not in the future
    pub async fn create_event(
        &self,
        caller: Address,
        request: CreateEventRequest,
    ) -> Result<EventSummary> {
        let event_id = request.event_id.clone();
        if request.ticket_price.is_zero() {
            return Err(EconomyError::InvalidInput(
                "ticket price must be greater than zero".to_string(),
            ));
        }
        if request.max_supply == 0 {
            return Err(EconomyError::InvalidInput(
                "max supply must be greater than zero".to_string(),
            ));
        }
        self.ensure_unused(&event_id)?;

        let (metadata, verified) = futures::try_join!(
            self.oracle.fetch(&event_id),
            self.oracle.verify_organiser(caller)
        )?;
        if metadata.organiser != caller || !verified {
            tracing::warn!(%event_id, %caller, "Organiser verification failed");
            return Err(EconomyError::NotVerified(caller));
        }
        if metadata.date_time <= self.clock.now() {
            return Err(EconomyError::InvalidWindow(
                "event date time must be in the future".to_string(),
            ));
        }

        let mut state = self.state.lock();
        // The id may have been taken while the oracle answered.
        if state.events.contains_key(&event_id) {
            return Err(EconomyError::EventAlreadyExists(event_id));
        }

        let details = EventDetails {
            event_id: event_id.clone(),
            name: metadata.name,
            symbol: request.symbol,
            date_time: metadata.date_time,
            location: metadata.location,
            description: metadata.description,
            ticket_price: request.ticket_price,
            max_supply: request.max_supply,
            organiser: caller,
        };
        let registry = TicketRegistry::new(
            details,
            self.ledger.clone(),
            self.clock.clone(),
            self.log.clone(),
        )?;
        let start = metadata.date_time;
        self.voting.create_voting(
            &event_id,
            start,
            start + self.config.voting.voting_period(),
            &registry,
        )?;
        let marketplace = Marketplace::new(
            caller,
            registry.clone(),
            &self.config.marketplace,
            self.log.clone(),
        );
        registry.set_marketplace(caller, marketplace.address())?;

        let entry = Entry {
            registry,
            marketplace,
        };
        let summary = self.summarize(&entry);
        state.order.push(event_id.clone());
        state.events.insert(event_id.clone(), entry);

        self.log.record(Observation::EventCreated {
            event_id: event_id.clone(),
            registry: summary.registry,
        });
        metrics::record_event_created();
        tracing::info!(%event_id, organiser = %caller, registry = %summary.registry, "Event created");
        Ok(summary)
    }

    /// Summary of one event.
    ///
    /// # Errors
    ///
    /// [`EconomyError::EventNotFound`] for unknown ids.
    pub fn event_details(&self, event_id: &EventId) -> Result<EventSummary> {
        let entry = self.entry(event_id)?;
        Ok(self.summarize(&entry))
    }

    /// Events organised by `organiser`, in creation order
    #[must_use]
    pub fn organiser_events(&self, organiser: Address) -> Vec<EventSummary> {
        self.all_events()
            .into_iter()
            .filter(|summary| summary.organiser == organiser)
            .collect()
    }

    /// Every event, in creation order
    #[must_use]
    pub fn all_events(&self) -> Vec<EventSummary> {
        let entries: Vec<Entry> = {
            let state = self.state.lock();
            state
                .order
                .iter()
                .filter_map(|id| state.events.get(id).cloned())
                .collect()
        };
        entries.iter().map(|entry| self.summarize(entry)).collect()
    }

    /// Registry of an event.
    ///
    /// # Errors
    ///
    /// [`EconomyError::EventNotFound`] for unknown ids.
    pub fn registry(&self, event_id: &EventId) -> Result<TicketRegistry> {
        self.entry(event_id).map(|entry| entry.registry)
    }

    /// Marketplace of an event.
    ///
    /// # Errors
    ///
    /// [`EconomyError::EventNotFound`] for unknown ids.
    pub fn marketplace(&self, event_id: &EventId) -> Result<Marketplace> {
        self.entry(event_id).map(|entry| entry.marketplace)
    }

    /// Voting engine holding every event's session
    #[must_use]
    pub fn voting(&self) -> &VotingEngine {
        &self.voting
    }

    /// Shared ledger
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Observation log every component records into
    #[must_use]
    pub fn observations(&self) -> &ObservationLog {
        &self.log
    }

    fn ensure_unused(&self, event_id: &EventId) -> Result<()> {
        if self.state.lock().events.contains_key(event_id) {
            return Err(EconomyError::EventAlreadyExists(event_id.clone()));
        }
        Ok(())
    }

    fn entry(&self, event_id: &EventId) -> Result<Entry> {
        self.state
            .lock()
            .events
            .get(event_id)
            .cloned()
            .ok_or_else(|| EconomyError::EventNotFound(event_id.clone()))
    }

    fn summarize(&self, entry: &Entry) -> EventSummary {
        let event = entry.registry.event();
        EventSummary {
            event_id: event.event_id.clone(),
            name: event.name.clone(),
            symbol: event.symbol.clone(),
            date_time: event.date_time,
            location: event.location.clone(),
            description: event.description.clone(),
            ticket_price: event.ticket_price,
            max_supply: event.max_supply,
            organiser: event.organiser,
            registry: entry.registry.treasury(),
            marketplace: entry.marketplace.address(),
            is_active: !self.voting.is_cancelled(&event.event_id),
        }
    }
}

impl std::fmt::Debug for EventDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDirectory")
            .field("events", &self.state.lock().order.len())
            .field("voting", &self.voting)
            .finish_non_exhaustive()
    }
}
