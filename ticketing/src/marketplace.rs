//! Resale marketplace for one event.
//!
//! Holders list tickets at up to the resale cap (110% of face value by
//! default). The marketplace never takes custody: a listing only records the
//! asking price, and a purchase settles credit and hands the ticket over in
//! one registry call. The buyer pays the listed price, the organiser receives
//! `floor(price × fee / 10 000)` and the seller the rest. Unsold tickets the
//! organiser lists from the pool are primary sales: face value goes to the
//! event treasury and the markup to the organiser.
//!
//! The marketplace acts under its own identity ([`Marketplace::address`]),
//! which the organiser appoints on the registry and each seller approves for
//! the tickets they list.

use crate::config::MarketplaceConfig;
use crate::metrics;
use crate::registry::TicketRegistry;
use festival_core::observation::{Observation, ObservationLog};
use festival_core::types::{Address, BasisPoints, Capability, Credits, TicketId};
use festival_core::{EconomyError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An open resale offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Asking price
    pub price: Credits,
    /// Holder offering the ticket
    pub seller: Address,
    /// Whether the offer is open
    pub active: bool,
}

#[derive(Debug)]
struct MarketState {
    fee: BasisPoints,
    listings: BTreeMap<TicketId, Listing>,
}

struct MarketInner {
    address: Address,
    admin: Address,
    fee_ceiling: BasisPoints,
    resale_cap: BasisPoints,
    registry: TicketRegistry,
    state: Mutex<MarketState>,
    log: ObservationLog,
}

/// Resale marketplace bound to one registry. Cloning yields another handle.
#[derive(Clone)]
pub struct Marketplace {
    inner: Arc<MarketInner>,
}

impl Marketplace {
    /// Creates a marketplace for `registry` administered by `admin`.
    ///
    /// The marketplace cannot move tickets until an admin of the registry
    /// appoints [`Marketplace::address`] with
    /// [`TicketRegistry::set_marketplace`].
    #[must_use]
    pub fn new(
        admin: Address,
        registry: TicketRegistry,
        config: &MarketplaceConfig,
        log: ObservationLog,
    ) -> Self {
        let address = Address::new();
        tracing::info!(
            event_id = %registry.event_id(),
            %address,
            fee = %config.default_fee(),
            "Marketplace opened"
        );
        Self {
            inner: Arc::new(MarketInner {
                address,
                admin,
                fee_ceiling: config.fee_ceiling(),
                resale_cap: config.resale_cap(),
                registry,
                state: Mutex::new(MarketState {
                    fee: config.default_fee(),
                    listings: BTreeMap::new(),
                }),
                log,
            }),
        }
    }

    /// Offers `ticket` for resale at `price`. Listing again updates the price.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidInput`] if `price` is zero, or below face value
    ///   for an unsold ticket from the organiser's pool
    /// - [`EconomyError::Forbidden`] if the marketplace was not appointed on the registry
    /// - [`EconomyError::EventCancelled`] once the event is cancelled
    /// - [`EconomyError::TicketNotFound`] if the ticket was never minted
    /// - [`EconomyError::NotOwner`] unless `seller` holds the ticket
    /// - [`EconomyError::AlreadyUsed`] if the ticket was scanned
    /// - [`EconomyError::NotApproved`] unless `seller` authorised the marketplace
    /// - [`EconomyError::PriceTooHigh`] above the resale cap
    pub fn list_ticket(&self, seller: Address, ticket: TicketId, price: Credits) -> Result<()> {
        let inner = &self.inner;
        let event_id = inner.registry.event_id();
        if price.is_zero() {
            return Err(EconomyError::InvalidInput(
                "listing price must be greater than zero".to_string(),
            ));
        }

        let mut state = inner.state.lock();
        inner.registry.check_resale(inner.address, seller, ticket, price)?;
        let face_value = inner.registry.ticket_price();
        if !inner.resale_cap.admits(price, face_value) {
            tracing::warn!(%event_id, %ticket, %price, "Listing above resale cap rejected");
            return Err(EconomyError::PriceTooHigh {
                price,
                cap: inner.resale_cap.of(face_value),
            });
        }

        let previous = state.listings.insert(
            ticket,
            Listing {
                price,
                seller,
                active: true,
            },
        );
        if previous.is_none() {
            metrics::record_listing_change(1.0);
        }

        inner.log.record(Observation::TicketListed {
            event_id: event_id.clone(),
            ticket,
            seller,
            price,
        });
        tracing::info!(%event_id, %ticket, %seller, %price, "Ticket listed");
        Ok(())
    }

    /// Withdraws the caller's listing.
    ///
    /// # Errors
    ///
    /// [`EconomyError::NotListed`] if there is no listing or `caller` is not its seller.
    pub fn unlist_ticket(&self, caller: Address, ticket: TicketId) -> Result<()> {
        let event_id = self.inner.registry.event_id();
        let mut state = self.inner.state.lock();
        match state.listings.get(&ticket) {
            Some(listing) if listing.seller == caller => {}
            _ => return Err(EconomyError::NotListed(ticket)),
        }
        state.listings.remove(&ticket);
        metrics::record_listing_change(-1.0);

        self.inner.log.record(Observation::TicketUnlisted {
            event_id: event_id.clone(),
            ticket,
        });
        tracing::info!(%event_id, %ticket, "Ticket unlisted");
        Ok(())
    }

    /// Buys a listed ticket: the buyer pays the listed price, the organiser
    /// receives the fee, the seller the remainder, and the ticket changes hands.
    ///
    /// Returns the fee paid to the organiser. A listing whose ticket can no
    /// longer change hands (moved, scanned or the event cancelled) is dropped.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::NotListed`] if there is no listing
    /// - [`EconomyError::InvalidInput`] if `buyer` is the seller
    /// - [`EconomyError::InsufficientBalance`] if `buyer` cannot pay
    /// - [`EconomyError::NotOwner`], [`EconomyError::AlreadyUsed`],
    ///   [`EconomyError::NotApproved`] or [`EconomyError::EventCancelled`] if the
    ///   listing went stale
    pub fn buy_ticket(&self, buyer: Address, ticket: TicketId) -> Result<Credits> {
        let inner = &self.inner;
        let event_id = inner.registry.event_id();
        let mut state = inner.state.lock();
        let listing = *state
            .listings
            .get(&ticket)
            .ok_or(EconomyError::NotListed(ticket))?;
        if buyer == listing.seller {
            return Err(EconomyError::InvalidInput(
                "sellers cannot buy their own listing".to_string(),
            ));
        }

        let fee = state.fee.of(listing.price);
        if let Err(error) = inner.registry.resell(
            inner.address,
            listing.seller,
            buyer,
            ticket,
            listing.price,
            fee,
        ) {
            tracing::warn!(%event_id, %ticket, %buyer, %error, "Resale rejected");
            if matches!(
                error,
                EconomyError::NotOwner { .. }
                    | EconomyError::AlreadyUsed(_)
                    | EconomyError::EventCancelled(_)
            ) {
                state.listings.remove(&ticket);
                metrics::record_listing_change(-1.0);
                inner.log.record(Observation::TicketUnlisted {
                    event_id: event_id.clone(),
                    ticket,
                });
                tracing::info!(%event_id, %ticket, "Stale listing dropped");
            }
            return Err(error);
        }
        state.listings.remove(&ticket);
        metrics::record_listing_change(-1.0);

        inner.log.record(Observation::TicketResold {
            event_id: event_id.clone(),
            ticket,
            seller: listing.seller,
            buyer,
            price: listing.price,
            fee,
        });
        metrics::record_resale(listing.price, fee);
        tracing::info!(%event_id, %ticket, seller = %listing.seller, %buyer, price = %listing.price, %fee, "Ticket resold");
        Ok(fee)
    }

    /// Changes the fee. Requires the registry's admin capability.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Forbidden`] if `caller` is not a registry admin
    /// - [`EconomyError::FeeTooHigh`] above the configured ceiling
    pub fn set_marketplace_fee(&self, caller: Address, fee_bps: u32) -> Result<()> {
        let inner = &self.inner;
        if !inner.registry.has_role(caller, Capability::Admin) {
            return Err(EconomyError::Forbidden {
                caller,
                capability: Capability::Admin,
            });
        }
        if fee_bps > inner.fee_ceiling.get() {
            return Err(EconomyError::FeeTooHigh {
                fee: fee_bps,
                ceiling: inner.fee_ceiling.get(),
            });
        }
        let fee = BasisPoints::new(fee_bps);
        inner.state.lock().fee = fee;
        tracing::info!(event_id = %inner.registry.event_id(), %fee, "Marketplace fee changed");
        Ok(())
    }

    /// Listing for `ticket`.
    ///
    /// # Errors
    ///
    /// [`EconomyError::NotListed`] if the ticket is not listed.
    pub fn get_listing_details(&self, ticket: TicketId) -> Result<Listing> {
        self.inner
            .state
            .lock()
            .listings
            .get(&ticket)
            .copied()
            .ok_or(EconomyError::NotListed(ticket))
    }

    /// Open listings, by ticket id
    #[must_use]
    pub fn active_listings(&self) -> Vec<(TicketId, Listing)> {
        self.inner
            .state
            .lock()
            .listings
            .iter()
            .map(|(id, listing)| (*id, *listing))
            .collect()
    }

    /// Current fee
    #[must_use]
    pub fn fee(&self) -> BasisPoints {
        self.inner.state.lock().fee
    }

    /// Identity that created the marketplace
    #[must_use]
    pub fn admin(&self) -> Address {
        self.inner.admin
    }

    /// Identity the marketplace acts under
    #[must_use]
    pub fn address(&self) -> Address {
        self.inner.address
    }

    /// Registry whose tickets are traded here
    #[must_use]
    pub fn registry(&self) -> &TicketRegistry {
        &self.inner.registry
    }
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("address", &self.inner.address)
            .field("event_id", self.inner.registry.event_id())
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}
