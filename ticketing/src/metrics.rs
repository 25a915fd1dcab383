//! Business metrics for the ticket economy.
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! which exporter (if any) to install.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `festival_credit_acquired_total` - Credits issued against external value
//! - `festival_credit_withdrawn_total` - Credits burned for external value
//! - `festival_credit_transfers_total` - Ledger transfers applied
//! - `festival_tickets_minted_total` - Tickets pre-allocated without charge
//! - `festival_tickets_sold_total` - Tickets sold at face value
//! - `festival_tickets_scanned_total` - Tickets scanned at the gate
//! - `festival_votes_total{choice}` - Votes cast by choice (cancel, keep)
//! - `festival_events_cancelled_total` - Events cancelled by vote
//! - `festival_refunded_credit_total` - Credits refunded after cancellation
//! - `festival_resales_total` - Marketplace resales
//! - `festival_resale_volume_total` - Credits paid for resales
//! - `festival_resale_fees_total` - Credits paid to organisers as resale fees
//! - `festival_events_created_total` - Events created through the directory
//!
//! ## Gauges
//! - `festival_active_listings` - Listings currently open across marketplaces

use festival_core::types::Credits;
use metrics::{describe_counter, describe_gauge};

/// Register all metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_economy_metrics() {
    describe_counter!(
        "festival_credit_acquired_total",
        "Credits issued against external value"
    );
    describe_counter!(
        "festival_credit_withdrawn_total",
        "Credits burned in exchange for external value"
    );
    describe_counter!(
        "festival_credit_transfers_total",
        "Number of ledger transfers applied"
    );
    describe_counter!(
        "festival_tickets_minted_total",
        "Tickets pre-allocated without charge"
    );
    describe_counter!("festival_tickets_sold_total", "Tickets sold at face value");
    describe_counter!(
        "festival_tickets_scanned_total",
        "Tickets scanned at the gate"
    );
    describe_counter!(
        "festival_votes_total",
        "Cancellation votes cast, by choice (cancel, keep)"
    );
    describe_counter!(
        "festival_events_cancelled_total",
        "Events cancelled by vote"
    );
    describe_counter!(
        "festival_refunded_credit_total",
        "Credits refunded to customers after cancellation"
    );
    describe_counter!("festival_resales_total", "Marketplace resales");
    describe_counter!(
        "festival_resale_volume_total",
        "Credits paid by buyers for resold tickets"
    );
    describe_counter!(
        "festival_resale_fees_total",
        "Credits paid to organisers as resale fees"
    );
    describe_counter!(
        "festival_events_created_total",
        "Events created through the directory"
    );
    describe_gauge!(
        "festival_active_listings",
        "Listings currently open across marketplaces"
    );

    tracing::info!("Economy metrics registered");
}

/// Record credits issued against external value.
pub fn record_credit_acquired(amount: Credits) {
    metrics::counter!("festival_credit_acquired_total").increment(amount.units());
}

/// Record credits burned for external value.
pub fn record_credit_withdrawn(amount: Credits) {
    metrics::counter!("festival_credit_withdrawn_total").increment(amount.units());
}

/// Record applied ledger transfers.
pub fn record_transfers(count: usize) {
    metrics::counter!("festival_credit_transfers_total").increment(count as u64);
}

/// Record tickets pre-allocated without charge.
pub fn record_tickets_minted(count: u64) {
    metrics::counter!("festival_tickets_minted_total").increment(count);
}

/// Record tickets sold at face value.
pub fn record_tickets_sold(count: u64) {
    metrics::counter!("festival_tickets_sold_total").increment(count);
}

/// Record a scanned ticket.
pub fn record_ticket_scanned() {
    metrics::counter!("festival_tickets_scanned_total").increment(1);
}

/// Record a vote.
pub fn record_vote(support_cancellation: bool) {
    let choice = if support_cancellation { "cancel" } else { "keep" };
    metrics::counter!("festival_votes_total", "choice" => choice).increment(1);
}

/// Record a cancellation and the credits it refunded.
pub fn record_cancellation(refunded: Credits) {
    metrics::counter!("festival_events_cancelled_total").increment(1);
    metrics::counter!("festival_refunded_credit_total").increment(refunded.units());
}

/// Record a marketplace resale.
pub fn record_resale(price: Credits, fee: Credits) {
    metrics::counter!("festival_resales_total").increment(1);
    metrics::counter!("festival_resale_volume_total").increment(price.units());
    metrics::counter!("festival_resale_fees_total").increment(fee.units());
}

/// Record a listing opened (`delta = 1.0`) or closed (`delta = -1.0`).
pub fn record_listing_change(delta: f64) {
    metrics::gauge!("festival_active_listings").increment(delta);
}

/// Record an event created through the directory.
pub fn record_event_created() {
    metrics::counter!("festival_events_created_total").increment(1);
}
