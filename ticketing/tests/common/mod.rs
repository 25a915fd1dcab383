//! Shared fixture for the lifecycle tests.
//!
//! Builds a whole economy around a [`ManualClock`] so tests can walk an event
//! through sale, voting window and settlement.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, Utc};
use festival_core::environment::Clock;
use festival_core::observation::ObservationLog;
use festival_core::oracle::EventMetadata;
use festival_core::types::{Address, Credits, EventId, ExchangeRate};
use festival_testing::{ManualClock, MockEventOracle, cr, init_test_tracing, test_clock, value_for};
use festival_ticketing::{
    CreateEventRequest, EconomyConfig, EventDirectory, EventSummary, Ledger, Marketplace,
    TicketRegistry,
};
use std::sync::Arc;

/// Exchange rate used by every fixture: 1 000 value units per credit
pub const RATE: u128 = 1_000;

/// Face value used by every fixture
pub const PRICE: u64 = 100;

/// A running economy with one event already created.
pub struct World {
    pub clock: ManualClock,
    pub log: ObservationLog,
    pub oracle: Arc<MockEventOracle>,
    pub directory: EventDirectory,
    pub ledger_owner: Address,
    pub organiser: Address,
    pub event: EventSummary,
}

impl World {
    /// Economy whose event starts one day after the test clock's epoch.
    pub async fn new() -> Self {
        Self::with_supply(100).await
    }

    /// Same as [`World::new`] with a custom supply cap.
    pub async fn with_supply(max_supply: u64) -> Self {
        init_test_tracing();
        festival_ticketing::metrics::register_economy_metrics();
        let clock = ManualClock::starting_at(test_clock().now());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let ledger_owner = Address::new();
        let oracle = MockEventOracle::shared();
        let directory = EventDirectory::bootstrap(
            ledger_owner,
            ExchangeRate::new(RATE).unwrap(),
            oracle.clone(),
            shared,
            EconomyConfig::default(),
        );
        let log = directory.observations().clone();

        let organiser = Address::new();
        let event_id = EventId::parse("SF001").unwrap();
        oracle.insert_event(event_id.clone(), metadata(organiser, clock.now() + Duration::days(1)));
        let event = directory
            .create_event(
                organiser,
                CreateEventRequest {
                    event_id,
                    symbol: "SF24".to_string(),
                    ticket_price: cr(PRICE),
                    max_supply,
                },
            )
            .await
            .unwrap();

        Self {
            clock,
            log,
            oracle,
            directory,
            ledger_owner,
            organiser,
            event,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        self.directory.ledger()
    }

    pub fn registry(&self) -> TicketRegistry {
        self.directory.registry(&self.event.event_id).unwrap()
    }

    pub fn marketplace(&self) -> Marketplace {
        self.directory.marketplace(&self.event.event_id).unwrap()
    }

    /// Gives `identity` exactly `credits` fresh credits.
    pub fn fund(&self, identity: Address, credits: u64) {
        let rate = self.ledger().rate();
        assert_eq!(
            self.ledger().acquire_credit(identity, value_for(credits, rate)).unwrap(),
            cr(credits)
        );
    }

    /// Creates `n` funded identities that each buy one ticket.
    pub fn sell_to(&self, n: usize, credits_each: u64) -> Vec<Address> {
        let registry = self.registry();
        (0..n)
            .map(|_| {
                let buyer = Address::new();
                self.fund(buyer, credits_each);
                registry.buy_tickets(buyer, 1).unwrap();
                buyer
            })
            .collect()
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn balance(&self, identity: Address) -> Credits {
        self.ledger().check_credit(identity)
    }

    /// Moves the clock into the voting window.
    pub fn open_voting(&self) {
        assert!(self.clock.advance_to(self.event.date_time));
    }

    /// Moves the clock past the voting window.
    pub fn close_voting(&self) {
        let end = self
            .directory
            .voting()
            .get_voting_detail(&self.event.event_id)
            .unwrap()
            .end;
        assert!(self.clock.advance_to(end));
    }
}

pub fn metadata(organiser: Address, date_time: DateTime<Utc>) -> EventMetadata {
    EventMetadata {
        name: "Summer Festival".to_string(),
        date_time,
        location: "Main Park".to_string(),
        description: "Three days of open air music".to_string(),
        organiser,
    }
}
