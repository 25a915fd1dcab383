//! Cancellation voting.
//!
//! One session per event, bound to that event's [`TicketRegistry`] through
//! its [`Governance`] handle. Sessions move through
//!
//! ```text
//! Scheduled (now < start) ──▶ Open (start ≤ now < end) ──▶ Closed (now ≥ end)
//!                                   │
//!                                   └── threshold reached ──▶ Cancelled
//! ```
//!
//! Every ticket holder gets one vote. A vote for cancellation counts as a
//! "no" vote against the event going ahead. Once the "no" votes reach
//! `max(1, ceil(2n / 3))`, with `n` the number of distinct customers, the
//! event is cancelled and every paid ticket refunded in the same step. If
//! the refund cannot be settled the vote fails and nothing changes.

use crate::metrics;
use crate::registry::{Governance, TicketRegistry};
use chrono::{DateTime, Utc};
use festival_core::environment::Clock;
use festival_core::observation::{Observation, ObservationLog};
use festival_core::types::{Address, Credits, EventId};
use festival_core::{EconomyError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Where a session stands at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingPhase {
    /// Window has not opened
    Scheduled,
    /// Accepting votes
    Open,
    /// Window has ended without cancellation
    Closed,
    /// Event was cancelled by vote
    Cancelled,
}

/// Read-only view of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingDetail {
    /// Event voted on
    pub event_id: EventId,
    /// Votes for cancellation
    pub no_votes: u64,
    /// Votes for the event going ahead
    pub yes_votes: u64,
    /// Window start
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Treasury identity of the governed registry
    pub registry: Address,
    /// Whether the event was cancelled
    pub cancelled: bool,
}

/// Result of a successful vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote counted; the event stands
    Recorded,
    /// Vote counted and reached the threshold; the event is cancelled
    Cancelled {
        /// Credits returned to customers
        refunded: Credits,
    },
}

/// Cancellation threshold for `customers` distinct customers: `max(1, ceil(2n/3))`.
#[must_use]
pub const fn cancellation_threshold(customers: u64) -> u64 {
    let threshold = (2 * customers).div_ceil(3);
    if threshold == 0 { 1 } else { threshold }
}

struct Session {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    yes_votes: u64,
    no_votes: u64,
    voters: HashSet<Address>,
    governance: Governance,
    cancelled: bool,
}

impl Session {
    fn phase(&self, now: DateTime<Utc>) -> VotingPhase {
        if self.cancelled {
            VotingPhase::Cancelled
        } else if now < self.start {
            VotingPhase::Scheduled
        } else if now < self.end {
            VotingPhase::Open
        } else {
            VotingPhase::Closed
        }
    }

    fn threshold(&self) -> u64 {
        cancellation_threshold(self.governance.number_of_customers() as u64)
    }
}

/// Voting sessions for every event. Cloning yields another handle to the same sessions.
#[derive(Clone)]
pub struct VotingEngine {
    sessions: Arc<Mutex<HashMap<EventId, Arc<Mutex<Session>>>>>,
    clock: Arc<dyn Clock>,
    log: ObservationLog,
}

impl VotingEngine {
    /// Creates an engine with no sessions
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, log: ObservationLog) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            clock,
            log,
        }
    }

    /// Opens a session over `[start, end)` governing `registry`.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidWindow`] if `start` is not in the future or `end ≤ start`
    /// - [`EconomyError::VotingAlreadyExists`] if the event already has a session
    /// - [`EconomyError::InvalidInput`] if `registry` belongs to another event
    /// - [`EconomyError::GovernanceAlreadyBound`] if `registry` is already governed
    pub fn create_voting(
        &self,
        event_id: &EventId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        registry: &TicketRegistry,
    ) -> Result<()> {
        let now = self.clock.now();
        if start <= now {
            tracing::warn!(%event_id, %start, %now, "Voting window starts in the past");
            return Err(EconomyError::InvalidWindow(
                "start date time must be in the future".to_string(),
            ));
        }
        if end <= start {
            return Err(EconomyError::InvalidWindow(
                "end date time must be after start date time".to_string(),
            ));
        }

        let mut sessions = self.sessions.lock();
        if sessions.contains_key(event_id) {
            return Err(EconomyError::VotingAlreadyExists(event_id.clone()));
        }
        if registry.event_id() != event_id {
            return Err(EconomyError::InvalidInput(format!(
                "registry issues tickets for {}, not {event_id}",
                registry.event_id()
            )));
        }
        let governance = registry.bind_governance(end)?;

        sessions.insert(
            event_id.clone(),
            Arc::new(Mutex::new(Session {
                start,
                end,
                yes_votes: 0,
                no_votes: 0,
                voters: HashSet::new(),
                governance,
                cancelled: false,
            })),
        );
        tracing::info!(%event_id, %start, %end, "Voting session created");
        Ok(())
    }

    /// Records `voter`'s vote and cancels the event if it reaches the threshold.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::VotingNotFound`] if the event has no session
    /// - [`EconomyError::VotingNotStarted`] before the window opens
    /// - [`EconomyError::VotingClosed`] after the window or once cancelled
    /// - [`EconomyError::NotTicketHolder`] unless `voter` holds a ticket
    /// - [`EconomyError::AlreadyVoted`] if `voter` voted before
    /// - any settlement error from the triggered refund
    pub fn vote(
        &self,
        voter: Address,
        event_id: &EventId,
        support_cancellation: bool,
    ) -> Result<VoteOutcome> {
        let session = self.session(event_id)?;
        let mut session = session.lock();

        let now = self.clock.now();
        match session.phase(now) {
            VotingPhase::Scheduled => {
                return Err(EconomyError::VotingNotStarted {
                    starts_at: session.start,
                });
            }
            VotingPhase::Closed | VotingPhase::Cancelled => {
                return Err(EconomyError::VotingClosed(event_id.clone()));
            }
            VotingPhase::Open => {}
        }
        if !session.governance.holds_ticket(voter) {
            tracing::warn!(%event_id, %voter, "Vote from non-holder rejected");
            return Err(EconomyError::NotTicketHolder(voter));
        }
        if session.voters.contains(&voter) {
            return Err(EconomyError::AlreadyVoted(voter));
        }

        let mut outcome = VoteOutcome::Recorded;
        if support_cancellation {
            let no_votes = session.no_votes + 1;
            let threshold = session.threshold();
            tracing::debug!(%event_id, no_votes, threshold, "Cancellation vote tallied");
            if no_votes >= threshold {
                let refunded = session.governance.cancel_and_refund()?;
                session.cancelled = true;
                outcome = VoteOutcome::Cancelled { refunded };
            }
            session.no_votes = no_votes;
        } else {
            session.yes_votes += 1;
        }
        session.voters.insert(voter);

        self.log.record(Observation::VoteCast {
            event_id: event_id.clone(),
            voter,
            support_cancellation,
        });
        metrics::record_vote(support_cancellation);
        if let VoteOutcome::Cancelled { refunded } = outcome {
            metrics::record_cancellation(refunded);
            tracing::info!(%event_id, %refunded, "Event cancelled by vote");
        }
        tracing::info!(%event_id, %voter, support_cancellation, "Vote recorded");
        Ok(outcome)
    }

    /// Read-only view of the event's session.
    ///
    /// # Errors
    ///
    /// [`EconomyError::VotingNotFound`] if the event has no session.
    pub fn get_voting_detail(&self, event_id: &EventId) -> Result<VotingDetail> {
        let session = self.session(event_id)?;
        let session = session.lock();
        Ok(VotingDetail {
            event_id: event_id.clone(),
            no_votes: session.no_votes,
            yes_votes: session.yes_votes,
            start: session.start,
            end: session.end,
            registry: session.governance.registry().treasury(),
            cancelled: session.cancelled,
        })
    }

    /// Phase of the event's session right now.
    ///
    /// # Errors
    ///
    /// [`EconomyError::VotingNotFound`] if the event has no session.
    pub fn status(&self, event_id: &EventId) -> Result<VotingPhase> {
        let session = self.session(event_id)?;
        let phase = session.lock().phase(self.clock.now());
        Ok(phase)
    }

    /// Whether `identity` has voted on the event.
    ///
    /// # Errors
    ///
    /// [`EconomyError::VotingNotFound`] if the event has no session.
    pub fn has_voted(&self, event_id: &EventId, identity: Address) -> Result<bool> {
        let session = self.session(event_id)?;
        let voted = session.lock().voters.contains(&identity);
        Ok(voted)
    }

    /// Cancellation votes currently required.
    ///
    /// # Errors
    ///
    /// [`EconomyError::VotingNotFound`] if the event has no session.
    pub fn threshold(&self, event_id: &EventId) -> Result<u64> {
        let session = self.session(event_id)?;
        let threshold = session.lock().threshold();
        Ok(threshold)
    }

    /// Whether the event was cancelled by vote (false for unknown events)
    #[must_use]
    pub fn is_cancelled(&self, event_id: &EventId) -> bool {
        self.session(event_id)
            .is_ok_and(|session| session.lock().cancelled)
    }

    fn session(&self, event_id: &EventId) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .lock()
            .get(event_id)
            .cloned()
            .ok_or_else(|| EconomyError::VotingNotFound(event_id.clone()))
    }
}

impl std::fmt::Debug for VotingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VotingEngine")
            .field("sessions", &self.sessions.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, Leg};
    use crate::registry::EventDetails;
    use chrono::Duration;
    use festival_core::types::ExchangeRate;
    use festival_testing::{ManualClock, cr, test_clock, value_for};

    struct Setup {
        engine: VotingEngine,
        registry: TicketRegistry,
        ledger: Ledger,
        clock: ManualClock,
        event_id: EventId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    }

    fn setup() -> Setup {
        let clock = ManualClock::starting_at(test_clock().now());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let log = ObservationLog::new(shared.clone(), 128);
        let ledger = Ledger::new(Address::new(), ExchangeRate::new(1_000).unwrap(), log.clone());
        let event_id = EventId::parse("G5vYZb2n_2V2d").unwrap();
        let start = clock.now() + Duration::hours(1);
        let end = start + Duration::days(1);
        let registry = TicketRegistry::new(
            EventDetails {
                event_id: event_id.clone(),
                name: "Testing Event".to_string(),
                symbol: "ANDY2024".to_string(),
                date_time: start,
                location: "Test Location".to_string(),
                description: "Test Description".to_string(),
                ticket_price: cr(100),
                max_supply: 200,
                organiser: Address::new(),
            },
            ledger.clone(),
            shared.clone(),
            log.clone(),
        )
        .unwrap();
        Setup {
            engine: VotingEngine::new(shared, log),
            registry,
            ledger,
            clock,
            event_id,
            start,
            end,
        }
    }

    fn holder(s: &Setup) -> Address {
        let who = Address::new();
        s.ledger
            .acquire_credit(who, value_for(100, s.ledger.rate()))
            .unwrap();
        s.registry.buy_tickets(who, 1).unwrap();
        who
    }

    #[test]
    fn threshold_residues() {
        assert_eq!(cancellation_threshold(0), 1);
        assert_eq!(cancellation_threshold(1), 1);
        assert_eq!(cancellation_threshold(2), 2);
        assert_eq!(cancellation_threshold(3), 2);
        assert_eq!(cancellation_threshold(4), 3);
        assert_eq!(cancellation_threshold(5), 4);
        assert_eq!(cancellation_threshold(6), 4);
        assert_eq!(cancellation_threshold(7), 5);
    }

    #[test]
    fn window_must_be_future_and_non_empty() {
        let s = setup();
        let past = s.clock.now() - Duration::hours(1);
        assert!(matches!(
            s.engine.create_voting(&s.event_id, past, s.end, &s.registry),
            Err(EconomyError::InvalidWindow(_))
        ));
        assert!(matches!(
            s.engine
                .create_voting(&s.event_id, s.start, s.start - Duration::hours(1), &s.registry),
            Err(EconomyError::InvalidWindow(_))
        ));
        assert!(matches!(
            s.engine.create_voting(&s.event_id, s.start, s.start, &s.registry),
            Err(EconomyError::InvalidWindow(_))
        ));

        s.engine
            .create_voting(&s.event_id, s.start, s.end, &s.registry)
            .unwrap();
        assert_eq!(
            s.engine.create_voting(&s.event_id, s.start, s.end, &s.registry),
            Err(EconomyError::VotingAlreadyExists(s.event_id.clone()))
        );

        let detail = s.engine.get_voting_detail(&s.event_id).unwrap();
        assert_eq!(detail.start, s.start);
        assert_eq!(detail.end, s.end);
        assert_eq!(detail.registry, s.registry.treasury());
    }

    #[test]
    fn registry_must_match_event() {
        let s = setup();
        let other = EventId::parse("G5vYZb2n_2V2e").unwrap();
        assert!(matches!(
            s.engine.create_voting(&other, s.start, s.end, &s.registry),
            Err(EconomyError::InvalidInput(_))
        ));
    }

    #[test]
    fn vote_follows_the_window() {
        let s = setup();
        let voter = holder(&s);
        assert_eq!(
            s.engine.vote(voter, &s.event_id, true),
            Err(EconomyError::VotingNotFound(s.event_id.clone()))
        );
        s.engine
            .create_voting(&s.event_id, s.start, s.end, &s.registry)
            .unwrap();

        assert_eq!(s.engine.status(&s.event_id).unwrap(), VotingPhase::Scheduled);
        assert_eq!(
            s.engine.vote(voter, &s.event_id, true),
            Err(EconomyError::VotingNotStarted { starts_at: s.start })
        );

        s.clock.advance_to(s.start);
        assert_eq!(s.engine.status(&s.event_id).unwrap(), VotingPhase::Open);

        s.clock.advance_to(s.end);
        assert_eq!(s.engine.status(&s.event_id).unwrap(), VotingPhase::Closed);
        assert_eq!(
            s.engine.vote(voter, &s.event_id, true),
            Err(EconomyError::VotingClosed(s.event_id.clone()))
        );
    }

    #[test]
    fn one_vote_per_holder() {
        let s = setup();
        let a = holder(&s);
        holder(&s);
        holder(&s);
        s.engine
            .create_voting(&s.event_id, s.start, s.end, &s.registry)
            .unwrap();
        s.clock.advance_to(s.start + Duration::hours(2));

        let outsider = Address::new();
        assert_eq!(
            s.engine.vote(outsider, &s.event_id, true),
            Err(EconomyError::NotTicketHolder(outsider))
        );
        assert_eq!(
            s.engine.vote(a, &s.event_id, true).unwrap(),
            VoteOutcome::Recorded
        );
        assert_eq!(
            s.engine.vote(a, &s.event_id, false),
            Err(EconomyError::AlreadyVoted(a))
        );
        assert!(s.engine.has_voted(&s.event_id, a).unwrap());

        let detail = s.engine.get_voting_detail(&s.event_id).unwrap();
        assert_eq!(detail.no_votes + detail.yes_votes, 1);
    }

    #[test]
    fn two_thirds_of_three_customers_cancel() {
        let s = setup();
        s.registry
            .bulk_mint_tickets(s.registry.organiser(), 10, s.registry.organiser())
            .unwrap();
        let [a, b, c] = [holder(&s), holder(&s), holder(&s)];
        assert_eq!(s.registry.treasury_balance(), cr(300));
        s.engine
            .create_voting(&s.event_id, s.start, s.end, &s.registry)
            .unwrap();
        s.clock.advance_to(s.start + Duration::hours(2));
        assert_eq!(s.engine.threshold(&s.event_id).unwrap(), 2);

        assert_eq!(s.engine.vote(c, &s.event_id, false).unwrap(), VoteOutcome::Recorded);
        assert_eq!(s.engine.vote(a, &s.event_id, true).unwrap(), VoteOutcome::Recorded);
        assert!(!s.registry.is_cancelled());
        assert_eq!(
            s.engine.vote(b, &s.event_id, true).unwrap(),
            VoteOutcome::Cancelled { refunded: cr(300) }
        );

        assert!(s.registry.is_cancelled());
        assert!(s.engine.is_cancelled(&s.event_id));
        assert_eq!(s.engine.status(&s.event_id).unwrap(), VotingPhase::Cancelled);
        for customer in [a, b, c] {
            assert_eq!(s.ledger.check_credit(customer), cr(100));
        }
        let detail = s.engine.get_voting_detail(&s.event_id).unwrap();
        assert_eq!((detail.no_votes, detail.yes_votes), (2, 1));
        assert!(detail.cancelled);
    }

    #[test]
    fn two_customers_need_both_votes() {
        let s = setup();
        let [a, b] = [holder(&s), holder(&s)];
        s.engine
            .create_voting(&s.event_id, s.start, s.end, &s.registry)
            .unwrap();
        s.clock.advance_to(s.start);

        assert_eq!(s.engine.vote(a, &s.event_id, true).unwrap(), VoteOutcome::Recorded);
        assert!(matches!(
            s.engine.vote(b, &s.event_id, true).unwrap(),
            VoteOutcome::Cancelled { .. }
        ));
    }

    #[test]
    fn votes_after_cancellation_are_closed() {
        let s = setup();
        let [a, b] = [holder(&s), holder(&s)];
        let late = holder(&s);
        s.engine
            .create_voting(&s.event_id, s.start, s.end, &s.registry)
            .unwrap();
        s.clock.advance_to(s.start);
        s.engine.vote(a, &s.event_id, true).unwrap();
        s.engine.vote(b, &s.event_id, true).unwrap();

        assert_eq!(
            s.engine.vote(late, &s.event_id, false),
            Err(EconomyError::VotingClosed(s.event_id.clone()))
        );
        assert!(matches!(
            s.registry.withdraw_funds(s.registry.organiser()),
            Err(EconomyError::VotingNotEnded { .. })
        ));
        s.clock.advance_to(s.end);
        assert!(matches!(
            s.registry.withdraw_funds(s.registry.organiser()),
            Err(EconomyError::EventCancelled(_))
        ));
    }

    #[test]
    fn unsettleable_refund_leaves_vote_and_event_untouched() {
        let s = setup();
        let [a, b] = [holder(&s), holder(&s)];
        s.engine
            .create_voting(&s.event_id, s.start, s.end, &s.registry)
            .unwrap();
        s.clock.advance_to(s.start);
        s.engine.vote(a, &s.event_id, true).unwrap();

        let treasury = s.registry.treasury();
        let escrow = Address::new();
        s.ledger.settle(&[Leg::new(treasury, escrow, cr(150))]).unwrap();
        let observed = s.ledger.observations().len();

        assert!(matches!(
            s.engine.vote(b, &s.event_id, true),
            Err(EconomyError::InsufficientBalance { account, .. }) if account == treasury
        ));
        assert!(!s.registry.is_cancelled());
        assert!(!s.engine.is_cancelled(&s.event_id));
        assert!(!s.engine.has_voted(&s.event_id, b).unwrap());
        let detail = s.engine.get_voting_detail(&s.event_id).unwrap();
        assert_eq!((detail.no_votes, detail.yes_votes), (1, 0));
        assert_eq!(s.engine.status(&s.event_id).unwrap(), VotingPhase::Open);
        assert_eq!(s.ledger.check_credit(b), Credits::ZERO);
        assert_eq!(s.ledger.observations().len(), observed);

        s.ledger.settle(&[Leg::new(escrow, treasury, cr(150))]).unwrap();
        assert_eq!(
            s.engine.vote(b, &s.event_id, true).unwrap(),
            VoteOutcome::Cancelled { refunded: cr(200) }
        );
    }
}
