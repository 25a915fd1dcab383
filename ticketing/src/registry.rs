//! Ticket registry: issuance, ownership and usage state for one event.
//!
//! Each ticket moves through a one-way lifecycle:
//!
//! ```text
//! Minted ──buy──▶ Sold ──scan──▶ Used
//!                  │ ▲
//!           list   │ │  resale (marketplace)
//!                  ▼ │
//!                 Listed
//! ```
//!
//! Refund is a side channel: after cancellation every paid-for ticket is
//! marked refunded and its face value returned to its current holder, while
//! ownership stays where it is. A ticket is never destroyed.
//!
//! Privileged operations are gated by a per-identity capability set
//! ([`Capability`]). Two collaborators get narrow handles instead of open
//! mutation:
//!
//! - the paired voting session binds a [`Governance`] handle, which is the
//!   only way to cancel the event and trigger refunds
//! - the paired marketplace is granted [`Capability::Marketplace`] and moves
//!   tickets only through an atomic resale
//!
//! Proceeds are held in a treasury sub-account of the shared [`Ledger`].

use crate::ledger::{Leg, Ledger};
use crate::metrics;
use chrono::{DateTime, Utc};
use festival_core::environment::Clock;
use festival_core::observation::{Observation, ObservationLog};
use festival_core::types::{Address, Capability, Credits, EventId, TicketId};
use festival_core::{EconomyError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// Data Structures
// ============================================================================

/// Immutable description of the event a registry issues tickets for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Externally supplied event id
    pub event_id: EventId,
    /// Display name
    pub name: String,
    /// Short ticker symbol printed on tickets
    pub symbol: String,
    /// When the event takes place
    pub date_time: DateTime<Utc>,
    /// Venue
    pub location: String,
    /// Free-form description
    pub description: String,
    /// Face value of one ticket
    pub ticket_price: Credits,
    /// Most tickets that can ever exist
    pub max_supply: u64,
    /// Organiser identity, receives proceeds and resale fees
    pub organiser: Address,
}

/// Snapshot of one ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetails {
    /// Ticket id
    pub id: TicketId,
    /// Current holder
    pub owner: Address,
    /// Scanned at the gate
    pub is_used: bool,
    /// Paid for through a primary sale
    pub is_sold: bool,
    /// Face value returned after cancellation
    pub refunded: bool,
}

#[derive(Clone, Copy, Debug)]
struct TicketRecord {
    owner: Address,
    is_used: bool,
    is_sold: bool,
    refunded: bool,
}

#[derive(Clone, Copy, Debug)]
struct GovernanceLink {
    voting_ends_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    tickets: BTreeMap<TicketId, TicketRecord>,
    holdings: HashMap<Address, BTreeSet<TicketId>>,
    customers: HashSet<Address>,
    roles: HashMap<Address, HashSet<Capability>>,
    approvals: HashMap<TicketId, Address>,
    operators: HashMap<Address, HashSet<Address>>,
    minted: u64,
    marketplace: Option<Address>,
    governance: Option<GovernanceLink>,
    cancelled: bool,
    refunded: bool,
}

impl RegistryState {
    fn has_role(&self, identity: &Address, capability: Capability) -> bool {
        self.roles
            .get(identity)
            .is_some_and(|caps| caps.contains(&capability))
    }

    fn ensure_role(&self, caller: Address, capability: Capability) -> Result<()> {
        if self.has_role(&caller, capability) {
            Ok(())
        } else {
            Err(EconomyError::Forbidden { caller, capability })
        }
    }

    fn record(&self, ticket: TicketId) -> Result<&TicketRecord> {
        self.tickets
            .get(&ticket)
            .ok_or(EconomyError::TicketNotFound(ticket))
    }

    fn balance_of(&self, holder: &Address) -> usize {
        self.holdings.get(holder).map_or(0, BTreeSet::len)
    }

    fn is_authorized(&self, operator: &Address, ticket: TicketId) -> bool {
        let Some(record) = self.tickets.get(&ticket) else {
            return false;
        };
        record.owner == *operator
            || self.approvals.get(&ticket) == Some(operator)
            || self
                .operators
                .get(&record.owner)
                .is_some_and(|ops| ops.contains(operator))
    }

    fn mint(&mut self, to: Address) -> TicketId {
        self.minted += 1;
        let id = TicketId::new(self.minted);
        self.tickets.insert(
            id,
            TicketRecord {
                owner: to,
                is_used: false,
                is_sold: false,
                refunded: false,
            },
        );
        self.holdings.entry(to).or_default().insert(id);
        id
    }

    fn move_ticket(&mut self, ticket: TicketId, to: Address) {
        let Some(record) = self.tickets.get_mut(&ticket) else {
            return;
        };
        let from = std::mem::replace(&mut record.owner, to);
        if let Some(held) = self.holdings.get_mut(&from) {
            held.remove(&ticket);
            if held.is_empty() {
                self.holdings.remove(&from);
            }
        }
        self.holdings.entry(to).or_default().insert(ticket);
        self.approvals.remove(&ticket);
    }

    fn update_customers(&mut self, old_holder: Address, new_holder: Address) {
        self.customers.insert(new_holder);
        if self.balance_of(&old_holder) == 0 {
            self.customers.remove(&old_holder);
        }
    }

    /// Refund legs grouped by current holder, for paid tickets not yet refunded.
    fn refund_legs(&self, treasury: Address, price: Credits) -> Result<(Vec<Leg>, Credits)> {
        let mut owed: BTreeMap<Address, u64> = BTreeMap::new();
        for record in self.tickets.values().filter(|r| r.is_sold && !r.refunded) {
            *owed.entry(record.owner).or_default() += 1;
        }
        let mut legs = Vec::with_capacity(owed.len());
        let mut total = Credits::ZERO;
        for (customer, held) in owed {
            let amount = price.checked_mul(held)?;
            total = total.checked_add(amount)?;
            legs.push(Leg::new(treasury, customer, amount));
        }
        Ok((legs, total))
    }
}

struct RegistryInner {
    details: EventDetails,
    treasury: Address,
    state: Mutex<RegistryState>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    log: ObservationLog,
}

// ============================================================================
// TicketRegistry
// ============================================================================

/// Per-event ticket authority. Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct TicketRegistry {
    inner: Arc<RegistryInner>,
}

impl TicketRegistry {
    /// Creates a registry for `details`, opening its treasury in `ledger`.
    ///
    /// The organiser starts with the admin, minter and scanner capabilities.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidInput`] if the price or supply is zero
    /// - [`EconomyError::InvalidRecipient`] if the organiser is the null identity
    pub fn new(
        details: EventDetails,
        ledger: Ledger,
        clock: Arc<dyn Clock>,
        log: ObservationLog,
    ) -> Result<Self> {
        validate_details(&details)?;

        let treasury = ledger.open_treasury();
        let mut state = RegistryState::default();
        state.roles.insert(
            details.organiser,
            HashSet::from([Capability::Admin, Capability::Minter, Capability::Scanner]),
        );

        tracing::info!(
            event_id = %details.event_id,
            organiser = %details.organiser,
            price = %details.ticket_price,
            max_supply = details.max_supply,
            %treasury,
            "Ticket registry created"
        );

        Ok(Self {
            inner: Arc::new(RegistryInner {
                details,
                treasury,
                state: Mutex::new(state),
                ledger,
                clock,
                log,
            }),
        })
    }

    // ========== Issuance ==========

    /// Pre-allocates `count` tickets to `recipient` without charge. Minter-only.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Forbidden`] if `caller` lacks [`Capability::Minter`]
    /// - [`EconomyError::InvalidInput`] if `count` is zero
    /// - [`EconomyError::InvalidRecipient`] if `recipient` is the null identity
    /// - [`EconomyError::SupplyExceeded`] if the supply cap would be passed
    pub fn bulk_mint_tickets(
        &self,
        caller: Address,
        count: u64,
        recipient: Address,
    ) -> Result<Vec<TicketId>> {
        let details = &self.inner.details;
        let mut state = self.inner.state.lock();
        state.ensure_role(caller, Capability::Minter)?;
        if count == 0 {
            return Err(EconomyError::InvalidInput(
                "mint count must be greater than zero".to_string(),
            ));
        }
        if recipient.is_null() {
            return Err(EconomyError::InvalidRecipient);
        }
        let remaining = details.max_supply.saturating_sub(state.minted);
        if count > remaining {
            tracing::warn!(event_id = %details.event_id, count, remaining, "Mint exceeds supply");
            return Err(EconomyError::SupplyExceeded {
                requested: count,
                remaining,
            });
        }

        let tickets: Vec<TicketId> = (0..count).map(|_| state.mint(recipient)).collect();

        self.inner.log.record(Observation::TicketsMinted {
            event_id: details.event_id.clone(),
            recipient,
            tickets: tickets.clone(),
        });
        metrics::record_tickets_minted(count);
        tracing::info!(event_id = %details.event_id, %recipient, count, "Tickets minted");
        Ok(tickets)
    }

    /// Sells `quantity` tickets at face value to `buyer`.
    ///
    /// Unsold tickets still held by the organiser go first (lowest ids
    /// first), then fresh ids are minted up to the supply cap. The buyer
    /// joins the customer set.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidInput`] if `quantity` is zero
    /// - [`EconomyError::InvalidRecipient`] if `buyer` is the null identity
    /// - [`EconomyError::EventCancelled`] once the event is cancelled
    /// - [`EconomyError::SupplyExceeded`] if not enough tickets remain
    /// - [`EconomyError::InsufficientBalance`] if `buyer` cannot pay `quantity × price`
    pub fn buy_tickets(&self, buyer: Address, quantity: u64) -> Result<Vec<TicketId>> {
        let details = &self.inner.details;
        let mut state = self.inner.state.lock();
        if quantity == 0 {
            return Err(EconomyError::InvalidInput(
                "quantity must be greater than zero".to_string(),
            ));
        }
        if buyer.is_null() {
            return Err(EconomyError::InvalidRecipient);
        }
        if state.cancelled {
            return Err(EconomyError::EventCancelled(details.event_id.clone()));
        }

        let wanted = usize::try_from(quantity).unwrap_or(usize::MAX);
        let from_pool: Vec<TicketId> = state
            .tickets
            .iter()
            .filter(|(_, r)| !r.is_sold && !r.is_used && r.owner == details.organiser)
            .map(|(id, _)| *id)
            .take(wanted)
            .collect();
        let pooled = from_pool.len() as u64;
        let fresh_available = details.max_supply.saturating_sub(state.minted);
        let fresh = quantity - pooled;
        if fresh > fresh_available {
            tracing::warn!(event_id = %details.event_id, %buyer, quantity, "Purchase exceeds supply");
            return Err(EconomyError::SupplyExceeded {
                requested: quantity,
                remaining: pooled + fresh_available,
            });
        }

        let cost = details.ticket_price.checked_mul(quantity)?;
        self.inner
            .ledger
            .settle(&[Leg::new(buyer, self.inner.treasury, cost)])?;

        let mut tickets = from_pool;
        for ticket in &tickets {
            state.move_ticket(*ticket, buyer);
        }
        for _ in 0..fresh {
            tickets.push(state.mint(buyer));
        }
        for ticket in &tickets {
            if let Some(record) = state.tickets.get_mut(ticket) {
                record.is_sold = true;
            }
        }
        state.customers.insert(buyer);

        self.inner.log.record(Observation::TicketsPurchased {
            event_id: details.event_id.clone(),
            buyer,
            tickets: tickets.clone(),
            paid: cost,
        });
        metrics::record_tickets_sold(quantity);
        tracing::info!(event_id = %details.event_id, %buyer, quantity, paid = %cost, "Tickets purchased");
        Ok(tickets)
    }

    /// Marks `ticket` as used after checking that `holder` presents it. Scanner-only.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Forbidden`] if `caller` lacks [`Capability::Scanner`]
    /// - [`EconomyError::TicketNotFound`] if the ticket was never minted
    /// - [`EconomyError::NotOwner`] if `holder` does not own it
    /// - [`EconomyError::AlreadyUsed`] if it was scanned before
    pub fn scan_ticket(&self, caller: Address, holder: Address, ticket: TicketId) -> Result<()> {
        let event_id = &self.inner.details.event_id;
        let mut state = self.inner.state.lock();
        state.ensure_role(caller, Capability::Scanner)?;
        let record = state.record(ticket)?;
        if record.owner != holder {
            tracing::warn!(%event_id, %holder, %ticket, "Scan by non-holder rejected");
            return Err(EconomyError::NotOwner { holder, ticket });
        }
        if record.is_used {
            return Err(EconomyError::AlreadyUsed(ticket));
        }
        if let Some(record) = state.tickets.get_mut(&ticket) {
            record.is_used = true;
        }

        self.inner.log.record(Observation::TicketScanned {
            event_id: event_id.clone(),
            holder,
            ticket,
        });
        metrics::record_ticket_scanned();
        tracing::info!(%event_id, %holder, %ticket, "Ticket scanned");
        Ok(())
    }

    // ========== Funds ==========

    /// Transfers the whole treasury to the organiser. Minter-only, and only
    /// once the voting window has closed without cancellation.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Forbidden`] if `caller` lacks [`Capability::Minter`]
    /// - [`EconomyError::VotingNotFound`] if no voting session governs the registry
    /// - [`EconomyError::VotingNotEnded`] before the voting window ends
    /// - [`EconomyError::EventCancelled`] if the event was cancelled
    /// - [`EconomyError::NothingToWithdraw`] if the treasury is empty
    pub fn withdraw_funds(&self, caller: Address) -> Result<Credits> {
        let details = &self.inner.details;
        let state = self.inner.state.lock();
        state.ensure_role(caller, Capability::Minter)?;
        let link = state
            .governance
            .ok_or_else(|| EconomyError::VotingNotFound(details.event_id.clone()))?;
        if self.inner.clock.now() < link.voting_ends_at {
            return Err(EconomyError::VotingNotEnded {
                ends_at: link.voting_ends_at,
            });
        }
        if state.cancelled {
            return Err(EconomyError::EventCancelled(details.event_id.clone()));
        }

        let amount = self.inner.ledger.check_credit(self.inner.treasury);
        if amount.is_zero() {
            return Err(EconomyError::NothingToWithdraw);
        }
        self.inner
            .ledger
            .settle(&[Leg::new(self.inner.treasury, details.organiser, amount)])?;

        self.inner.log.record(Observation::FundsWithdrawn {
            event_id: details.event_id.clone(),
            organiser: details.organiser,
            amount,
        });
        tracing::info!(event_id = %details.event_id, organiser = %details.organiser, %amount, "Funds withdrawn");
        Ok(amount)
    }

    /// Refunds every paid ticket to its holder.
    ///
    /// Cancellation through the voting session already refunds atomically,
    /// so once an event is cancelled this reports [`EconomyError::AlreadyRefunded`].
    ///
    /// # Errors
    ///
    /// - [`EconomyError::EventNotCancelled`] unless the event was cancelled
    /// - [`EconomyError::AlreadyRefunded`] if refunds were disbursed
    pub fn refund_all_tickets(&self) -> Result<Credits> {
        let mut state = self.inner.state.lock();
        if !state.cancelled {
            return Err(EconomyError::EventNotCancelled(
                self.inner.details.event_id.clone(),
            ));
        }
        self.refund_locked(&mut state)
    }

    fn refund_locked(&self, state: &mut RegistryState) -> Result<Credits> {
        let event_id = &self.inner.details.event_id;
        if state.refunded {
            return Err(EconomyError::AlreadyRefunded(event_id.clone()));
        }
        let (legs, total) = state.refund_legs(self.inner.treasury, self.inner.details.ticket_price)?;
        self.inner.ledger.settle(&legs)?;

        for record in state.tickets.values_mut().filter(|r| r.is_sold) {
            record.refunded = true;
        }
        state.refunded = true;
        for leg in &legs {
            tracing::debug!(%event_id, customer = %leg.to, amount = %leg.amount, "Customer refunded");
        }
        self.inner.log.record(Observation::Refund {
            event_id: event_id.clone(),
            total,
        });
        tracing::info!(%event_id, customers = legs.len(), %total, "Refunds disbursed");
        Ok(total)
    }

    // ========== Roles ==========

    /// Grants `capability` to `identity`. Admin-only.
    ///
    /// # Errors
    ///
    /// [`EconomyError::Forbidden`] if `caller` lacks [`Capability::Admin`].
    pub fn grant_role(&self, caller: Address, identity: Address, capability: Capability) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_role(caller, Capability::Admin)?;
        state.roles.entry(identity).or_default().insert(capability);
        tracing::info!(event_id = %self.inner.details.event_id, %identity, %capability, "Role granted");
        Ok(())
    }

    /// Revokes `capability` from `identity`. Admin-only.
    ///
    /// # Errors
    ///
    /// [`EconomyError::Forbidden`] if `caller` lacks [`Capability::Admin`].
    pub fn revoke_role(&self, caller: Address, identity: Address, capability: Capability) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_role(caller, Capability::Admin)?;
        if let Some(caps) = state.roles.get_mut(&identity) {
            caps.remove(&capability);
        }
        tracing::info!(event_id = %self.inner.details.event_id, %identity, %capability, "Role revoked");
        Ok(())
    }

    /// Whether `identity` holds `capability`
    #[must_use]
    pub fn has_role(&self, identity: Address, capability: Capability) -> bool {
        self.inner.state.lock().has_role(&identity, capability)
    }

    /// Appoints the marketplace allowed to move tickets. Admin-only.
    ///
    /// Replaces (and revokes) any previously appointed marketplace.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Forbidden`] if `caller` lacks [`Capability::Admin`]
    /// - [`EconomyError::InvalidRecipient`] if `marketplace` is the null identity
    pub fn set_marketplace(&self, caller: Address, marketplace: Address) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_role(caller, Capability::Admin)?;
        if marketplace.is_null() {
            return Err(EconomyError::InvalidRecipient);
        }
        if let Some(previous) = state.marketplace.replace(marketplace) {
            if let Some(caps) = state.roles.get_mut(&previous) {
                caps.remove(&Capability::Marketplace);
            }
        }
        state
            .roles
            .entry(marketplace)
            .or_default()
            .insert(Capability::Marketplace);
        tracing::info!(event_id = %self.inner.details.event_id, %marketplace, "Marketplace appointed");
        Ok(())
    }

    /// Currently appointed marketplace
    #[must_use]
    pub fn marketplace(&self) -> Option<Address> {
        self.inner.state.lock().marketplace
    }

    // ========== Transfer authorization ==========

    /// Lets `operator` move `ticket` on the owner's behalf until it changes hands.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::TicketNotFound`] if the ticket was never minted
    /// - [`EconomyError::NotOwner`] if `owner` does not hold it
    pub fn approve(&self, owner: Address, ticket: TicketId, operator: Address) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.record(ticket)?.owner != owner {
            return Err(EconomyError::NotOwner {
                holder: owner,
                ticket,
            });
        }
        state.approvals.insert(ticket, operator);
        tracing::debug!(%owner, %ticket, %operator, "Ticket approval granted");
        Ok(())
    }

    /// Lets (or stops) `operator` move every ticket `owner` holds.
    pub fn set_approval_for_all(&self, owner: Address, operator: Address, approved: bool) {
        let mut state = self.inner.state.lock();
        let ops = state.operators.entry(owner).or_default();
        if approved {
            ops.insert(operator);
        } else {
            ops.remove(&operator);
        }
        tracing::debug!(%owner, %operator, approved, "Operator approval updated");
    }

    /// Whether `operator` may move `ticket` (owner, per-ticket or blanket approval).
    #[must_use]
    pub fn is_authorized(&self, operator: Address, ticket: TicketId) -> bool {
        self.inner.state.lock().is_authorized(&operator, ticket)
    }

    // ========== Marketplace interface ==========

    /// Adds `new_holder` to the customer set and drops `old_holder` if they
    /// hold no tickets any more. Marketplace-only.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Forbidden`] if `caller` lacks [`Capability::Marketplace`]
    /// - [`EconomyError::InvalidRecipient`] if `new_holder` is the null identity
    pub fn update_customer_set(
        &self,
        caller: Address,
        old_holder: Address,
        new_holder: Address,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_role(caller, Capability::Marketplace)?;
        if new_holder.is_null() {
            return Err(EconomyError::InvalidRecipient);
        }
        state.update_customers(old_holder, new_holder);
        Ok(())
    }

    /// Checks that `market` could move `ticket` from `seller` at `price` right now.
    pub(crate) fn check_resale(
        &self,
        market: Address,
        seller: Address,
        ticket: TicketId,
        price: Credits,
    ) -> Result<()> {
        let state = self.inner.state.lock();
        self.validate_resale(&state, market, seller, ticket)?;
        self.resale_legs(&state, seller, Address::NULL, ticket, price, Credits::ZERO)
            .map(|_| ())
    }

    /// Settles a purchase at `price` and hands `ticket` from `seller` to
    /// `buyer` as one unit.
    ///
    /// A ticket still in the organiser's unsold pool is a primary sale: face
    /// value goes to the treasury, the markup to the organiser, and the
    /// ticket becomes refundable. Otherwise the seller receives `price - fee`
    /// and the organiser `fee`.
    pub(crate) fn resell(
        &self,
        market: Address,
        seller: Address,
        buyer: Address,
        ticket: TicketId,
        price: Credits,
        fee: Credits,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        self.validate_resale(&state, market, seller, ticket)?;
        if buyer.is_null() {
            return Err(EconomyError::InvalidRecipient);
        }
        let (legs, primary) = self.resale_legs(&state, seller, buyer, ticket, price, fee)?;
        self.inner.ledger.settle(&legs)?;

        if primary {
            if let Some(record) = state.tickets.get_mut(&ticket) {
                record.is_sold = true;
            }
            metrics::record_tickets_sold(1);
        }
        state.move_ticket(ticket, buyer);
        state.update_customers(seller, buyer);
        tracing::debug!(event_id = %self.inner.details.event_id, %ticket, %seller, %buyer, primary, "Ticket handed over");
        Ok(())
    }

    fn resale_legs(
        &self,
        state: &RegistryState,
        seller: Address,
        buyer: Address,
        ticket: TicketId,
        price: Credits,
        fee: Credits,
    ) -> Result<(Vec<Leg>, bool)> {
        let details = &self.inner.details;
        let record = state.record(ticket)?;
        if seller == details.organiser && !record.is_sold {
            let markup = price.checked_sub(details.ticket_price).ok_or_else(|| {
                EconomyError::InvalidInput(format!(
                    "unsold tickets cannot go below face value {}",
                    details.ticket_price
                ))
            })?;
            let legs = vec![
                Leg::new(buyer, self.inner.treasury, details.ticket_price),
                Leg::new(buyer, details.organiser, markup),
            ];
            return Ok((legs, true));
        }
        let proceeds = price.checked_sub(fee).unwrap_or(Credits::ZERO);
        let legs = vec![
            Leg::new(buyer, seller, proceeds),
            Leg::new(buyer, details.organiser, fee),
        ];
        Ok((legs, false))
    }

    fn validate_resale(
        &self,
        state: &RegistryState,
        market: Address,
        seller: Address,
        ticket: TicketId,
    ) -> Result<()> {
        state.ensure_role(market, Capability::Marketplace)?;
        if state.cancelled {
            return Err(EconomyError::EventCancelled(
                self.inner.details.event_id.clone(),
            ));
        }
        let record = state.record(ticket)?;
        if record.owner != seller {
            return Err(EconomyError::NotOwner {
                holder: seller,
                ticket,
            });
        }
        if record.is_used {
            return Err(EconomyError::AlreadyUsed(ticket));
        }
        if !state.is_authorized(&market, ticket) {
            return Err(EconomyError::NotApproved {
                operator: market,
                ticket,
            });
        }
        Ok(())
    }

    // ========== Governance ==========

    /// Hands the registry's governance interface to the voting session
    /// whose window ends at `voting_ends_at`.
    pub(crate) fn bind_governance(&self, voting_ends_at: DateTime<Utc>) -> Result<Governance> {
        let mut state = self.inner.state.lock();
        if state.governance.is_some() {
            return Err(EconomyError::GovernanceAlreadyBound(
                self.inner.details.event_id.clone(),
            ));
        }
        state.governance = Some(GovernanceLink { voting_ends_at });
        Ok(Governance {
            registry: self.clone(),
        })
    }

    // ========== Queries ==========

    /// Event this registry issues tickets for
    #[must_use]
    pub fn event(&self) -> &EventDetails {
        &self.inner.details
    }

    /// Event id
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        &self.inner.details.event_id
    }

    /// Face value of one ticket
    #[must_use]
    pub fn ticket_price(&self) -> Credits {
        self.inner.details.ticket_price
    }

    /// Organiser identity
    #[must_use]
    pub fn organiser(&self) -> Address {
        self.inner.details.organiser
    }

    /// Treasury sub-account holding collected proceeds
    #[must_use]
    pub fn treasury(&self) -> Address {
        self.inner.treasury
    }

    /// Credits currently held in the treasury
    #[must_use]
    pub fn treasury_balance(&self) -> Credits {
        self.inner.ledger.check_credit(self.inner.treasury)
    }

    /// Number of tickets minted so far
    #[must_use]
    pub fn ticket_count(&self) -> u64 {
        self.inner.state.lock().minted
    }

    /// Number of tickets paid for through a primary sale
    #[must_use]
    pub fn sold_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .tickets
            .values()
            .filter(|r| r.is_sold)
            .count()
    }

    /// Snapshot of one ticket.
    ///
    /// # Errors
    ///
    /// [`EconomyError::TicketNotFound`] if the ticket was never minted.
    pub fn ticket(&self, ticket: TicketId) -> Result<TicketDetails> {
        let state = self.inner.state.lock();
        let record = state.record(ticket)?;
        Ok(TicketDetails {
            id: ticket,
            owner: record.owner,
            is_used: record.is_used,
            is_sold: record.is_sold,
            refunded: record.refunded,
        })
    }

    /// Current holder of `ticket`.
    ///
    /// # Errors
    ///
    /// [`EconomyError::TicketNotFound`] if the ticket was never minted.
    pub fn owner_of(&self, ticket: TicketId) -> Result<Address> {
        self.inner.state.lock().record(ticket).map(|r| r.owner)
    }

    /// Tickets held by `holder`, ascending
    #[must_use]
    pub fn tickets_of(&self, holder: Address) -> Vec<TicketId> {
        self.inner
            .state
            .lock()
            .holdings
            .get(&holder)
            .map(|held| held.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of tickets held by `holder`
    #[must_use]
    pub fn balance_of(&self, holder: Address) -> usize {
        self.inner.state.lock().balance_of(&holder)
    }

    /// Number of distinct customers
    #[must_use]
    pub fn number_of_customers(&self) -> usize {
        self.inner.state.lock().customers.len()
    }

    /// Whether `identity` is in the customer set
    #[must_use]
    pub fn is_customer(&self, identity: Address) -> bool {
        self.inner.state.lock().customers.contains(&identity)
    }

    /// Whether the event was cancelled by vote
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }
}

impl std::fmt::Debug for TicketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketRegistry")
            .field("event_id", &self.inner.details.event_id)
            .field("treasury", &self.inner.treasury)
            .finish_non_exhaustive()
    }
}

fn validate_details(details: &EventDetails) -> Result<()> {
    if details.ticket_price.is_zero() {
        return Err(EconomyError::InvalidInput(
            "ticket price must be greater than zero".to_string(),
        ));
    }
    if details.max_supply == 0 {
        return Err(EconomyError::InvalidInput(
            "max supply must be greater than zero".to_string(),
        ));
    }
    if details.organiser.is_null() {
        return Err(EconomyError::InvalidRecipient);
    }
    Ok(())
}

// ============================================================================
// Governance
// ============================================================================

/// Restricted registry interface held by the registry's voting session.
///
/// Obtained once per registry; it is the only way to cancel the event.
#[derive(Debug)]
pub struct Governance {
    registry: TicketRegistry,
}

impl Governance {
    /// Governed registry
    #[must_use]
    pub fn registry(&self) -> &TicketRegistry {
        &self.registry
    }

    /// Whether `identity` holds at least one ticket
    #[must_use]
    pub fn holds_ticket(&self, identity: Address) -> bool {
        self.registry.balance_of(identity) > 0
    }

    /// Number of distinct customers
    #[must_use]
    pub fn number_of_customers(&self) -> usize {
        self.registry.number_of_customers()
    }

    /// Cancels the event and refunds every paid ticket in one unit.
    ///
    /// Nothing changes if the refund cannot be settled.
    pub(crate) fn cancel_and_refund(&self) -> Result<Credits> {
        let registry = &self.registry;
        let mut state = registry.inner.state.lock();
        if state.cancelled {
            return Err(EconomyError::EventCancelled(registry.event_id().clone()));
        }
        state.cancelled = true;
        match registry.refund_locked(&mut state) {
            Ok(total) => Ok(total),
            Err(error) => {
                state.cancelled = false;
                tracing::warn!(event_id = %registry.event_id(), %error, "Cancellation refund failed");
                Err(error)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
