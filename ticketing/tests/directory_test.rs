//! Directory and cross-component tests.
//!
//! Event creation against the oracle, observation delivery to live
//! subscribers, and credit conservation across a full event lifecycle.
//!
//! Run with: `cargo test --test directory_test`

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{PRICE, World, metadata};
use festival_core::observation::Observation;
use festival_core::types::{Address, Credits, EventId};
use festival_core::EconomyError;
use festival_testing::cr;
use festival_ticketing::CreateEventRequest;

fn request(id: &str) -> CreateEventRequest {
    CreateEventRequest {
        event_id: EventId::parse(id).unwrap(),
        symbol: "WF25".to_string(),
        ticket_price: cr(50),
        max_supply: 10,
    }
}

#[tokio::test]
async fn organiser_runs_several_events() {
    let world = World::new().await;
    let second = EventId::parse("WF001").unwrap();
    world.oracle.insert_event(
        second.clone(),
        metadata(world.organiser, world.event.date_time + Duration::days(30)),
    );

    let summary = world
        .directory
        .create_event(world.organiser, request("WF001"))
        .await
        .unwrap();

    assert_ne!(summary.registry, world.event.registry);
    assert_ne!(summary.marketplace, world.event.marketplace);
    let ids: Vec<EventId> = world
        .directory
        .organiser_events(world.organiser)
        .into_iter()
        .map(|s| s.event_id)
        .collect();
    assert_eq!(ids, vec![world.event.event_id.clone(), second.clone()]);
    assert_eq!(
        world.log.matching(|o| matches!(o, Observation::EventCreated { .. })).len(),
        2
    );
    assert_eq!(
        world.directory.event_details(&second).unwrap().ticket_price,
        cr(50)
    );
}

#[tokio::test]
async fn creation_failures_leave_directory_unchanged() {
    let world = World::new().await;
    let stranger = Address::new();
    let late = EventId::parse("LATE").unwrap();
    world
        .oracle
        .insert_event(late.clone(), metadata(stranger, world.clock_now() - Duration::hours(1)));

    assert_eq!(
        world.directory.create_event(stranger, request("NOPE")).await,
        Err(EconomyError::EventNotFound(EventId::parse("NOPE").unwrap()))
    );
    assert!(matches!(
        world.directory.create_event(stranger, request("LATE")).await,
        Err(EconomyError::InvalidWindow(_))
    ));
    assert_eq!(
        world.directory.create_event(world.organiser, request("LATE")).await,
        Err(EconomyError::NotVerified(world.organiser))
    );
    assert!(matches!(
        world.directory.create_event(world.organiser, request("SF001")).await,
        Err(EconomyError::EventAlreadyExists(_))
    ));

    world.oracle.set_unavailable(true);
    let error = world
        .directory
        .create_event(stranger, request("LATE"))
        .await
        .unwrap_err();
    assert!(error.is_retryable());

    assert_eq!(world.directory.all_events().len(), 1);
    assert!(matches!(
        world.directory.registry(&late),
        Err(EconomyError::EventNotFound(_))
    ));
    assert!(world.directory.voting().get_voting_detail(&late).is_err());
}

#[tokio::test]
async fn subscribers_see_sales_as_they_happen() {
    let world = World::new().await;
    let mut live = world.log.subscribe();

    let buyer = world.sell_to(1, PRICE)[0];

    let mut seen = Vec::new();
    while let Ok(recorded) = live.try_recv() {
        seen.push(recorded.observation.event_type());
    }
    assert_eq!(seen, vec![
            "CreditReceived.v1",
            "CreditTransferred.v1",
            "TicketsPurchased.v1"
        ]);
    let purchases = world
        .log
        .matching(|o| matches!(o, Observation::TicketsPurchased { buyer: b, .. } if *b == buyer));
    assert_eq!(purchases.len(), 1);
}

#[tokio::test]
async fn credits_are_conserved_through_a_lifecycle() {
    let world = World::with_supply(5).await;
    let registry = world.registry();
    let market = world.marketplace();
    let buyers = world.sell_to(3, 150);
    let reseller = buyers[0];
    let ticket = registry.tickets_of(reseller)[0];
    registry.approve(reseller, ticket, market.address()).unwrap();
    market.list_ticket(reseller, ticket, cr(110)).unwrap();
    world.fund(buyers[1], 60);
    market.buy_ticket(buyers[1], ticket).unwrap();

    assert_eq!(
        registry.buy_tickets(buyers[2], 3),
        Err(EconomyError::SupplyExceeded {
            requested: 3,
            remaining: 2,
        })
    );

    let treasury = registry.treasury();
    let holders = [buyers[0], buyers[1], buyers[2], world.organiser, treasury];
    let total = holders
        .iter()
        .map(|h| world.balance(*h).units())
        .sum::<u64>();
    assert_eq!(Credits::new(total), world.ledger().total_supply());
    assert_eq!(world.balance(treasury), cr(300));

    world.close_voting();
    registry.withdraw_funds(world.organiser).unwrap();
    let total_after = holders
        .iter()
        .map(|h| world.balance(*h).units())
        .sum::<u64>();
    assert_eq!(total_after, total);
    assert_eq!(world.balance(world.organiser), cr(301));
}
