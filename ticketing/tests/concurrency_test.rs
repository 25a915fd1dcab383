//! Concurrency tests.
//!
//! Races purchases, votes and resales across worker threads against one
//! shared economy and checks that the outcome matches some serial order:
//! no oversold supply, one cancellation with one refund, and conserved
//! credit.
//!
//! Run with: `cargo test --test concurrency_test`

#![allow(clippy::unwrap_used)]

mod common;

use common::{PRICE, World};
use festival_core::observation::Observation;
use festival_core::types::{Address, Credits, TicketId};
use festival_core::EconomyError;
use festival_testing::cr;
use festival_ticketing::VoteOutcome;
use std::collections::BTreeSet;

fn total(world: &World, identities: &[Address]) -> u64 {
    identities.iter().map(|who| world.balance(*who).units()).sum()
}

/// 100 buyers race for 50 tickets; exactly 50 purchases succeed.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_purchases_never_oversell() {
    let world = World::with_supply(50).await;
    let registry = world.registry();
    let buyers: Vec<Address> = (0..100)
        .map(|_| {
            let buyer = Address::new();
            world.fund(buyer, PRICE);
            buyer
        })
        .collect();

    let handles: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let registry = registry.clone();
            let buyer = *buyer;
            tokio::spawn(async move { registry.buy_tickets(buyer, 1) })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let sold: Vec<TicketId> = results
        .iter()
        .filter_map(|result| result.as_ref().ok())
        .flatten()
        .copied()
        .collect();
    assert_eq!(sold.len(), 50);
    assert_eq!(sold.iter().collect::<BTreeSet<_>>().len(), 50);
    assert!(
        results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|error| matches!(error, EconomyError::SupplyExceeded { remaining: 0, .. }))
    );

    assert_eq!(registry.sold_count(), 50);
    assert_eq!(registry.ticket_count(), 50);
    assert_eq!(registry.number_of_customers(), 50);
    assert_eq!(registry.treasury_balance(), cr(50 * PRICE));
    let mut everyone = buyers.clone();
    everyone.push(registry.treasury());
    assert_eq!(total(&world, &everyone), 100 * PRICE);
    assert_eq!(world.ledger().total_supply(), cr(100 * PRICE));
}

/// Every holder votes to cancel at once; one vote trips the threshold and
/// the refund is paid exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_cancellation_votes_refund_once() {
    let world = World::new().await;
    let registry = world.registry();
    let event_id = world.event.event_id.clone();
    let holders = world.sell_to(30, PRICE);
    world.open_voting();
    let threshold = world.directory.voting().threshold(&event_id).unwrap();
    assert_eq!(threshold, 20);

    let handles: Vec<_> = holders
        .iter()
        .map(|holder| {
            let voting = world.directory.voting().clone();
            let event_id = event_id.clone();
            let holder = *holder;
            tokio::spawn(async move { voting.vote(holder, &event_id, true) })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let cancelled = results
        .iter()
        .filter(|result| matches!(result, Ok(VoteOutcome::Cancelled { .. })))
        .count();
    let recorded = results
        .iter()
        .filter(|result| matches!(result, Ok(VoteOutcome::Recorded)))
        .count();
    let closed = results
        .iter()
        .filter(|result| matches!(result, Err(EconomyError::VotingClosed(_))))
        .count();
    assert_eq!(cancelled, 1);
    assert_eq!(recorded as u64, threshold - 1);
    assert_eq!(closed, holders.len() - threshold as usize);

    assert!(registry.is_cancelled());
    assert_eq!(registry.treasury_balance(), Credits::ZERO);
    for holder in &holders {
        assert_eq!(world.balance(*holder), cr(PRICE));
    }
    let refunds = world
        .log
        .matching(|o| matches!(o, Observation::Refund { .. }));
    assert_eq!(refunds.len(), 1);
    assert_eq!(
        registry.refund_all_tickets(),
        Err(EconomyError::AlreadyRefunded(event_id))
    );
}

/// Many buyers race for one listing; one pays, the rest keep their credit.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_resale_buyers_settle_once() {
    let world = World::new().await;
    let registry = world.registry();
    let market = world.marketplace();
    let seller = world.sell_to(1, PRICE)[0];
    let ticket = registry.tickets_of(seller)[0];
    registry.approve(seller, ticket, market.address()).unwrap();
    market.list_ticket(seller, ticket, cr(110)).unwrap();
    let buyers: Vec<Address> = (0..20)
        .map(|_| {
            let buyer = Address::new();
            world.fund(buyer, 110);
            buyer
        })
        .collect();

    let handles: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let market = market.clone();
            let buyer = *buyer;
            tokio::spawn(async move { (buyer, market.buy_ticket(buyer, ticket)) })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<Address> = results
        .iter()
        .filter(|(_, result)| result.is_ok())
        .map(|(buyer, _)| *buyer)
        .collect();
    assert_eq!(winners.len(), 1);
    assert!(
        results
            .iter()
            .filter_map(|(_, result)| result.as_ref().err())
            .all(|error| *error == EconomyError::NotListed(ticket))
    );
    assert_eq!(registry.owner_of(ticket).unwrap(), winners[0]);
    assert_eq!(world.balance(winners[0]), Credits::ZERO);
    assert_eq!(world.balance(seller), cr(109));
    assert_eq!(world.balance(world.organiser), cr(1));

    let mut everyone = buyers.clone();
    everyone.extend([seller, world.organiser, registry.treasury()]);
    assert_eq!(total(&world, &everyone), 20 * 110 + PRICE);
}
