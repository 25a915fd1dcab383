//! Cancellation vote lifecycle tests.
//!
//! Walks an event from sale through its voting window: cancellation with
//! refunds, window boundaries, and organiser withdrawal when the event stands.
//!
//! Run with: `cargo test --test cancellation_test`

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{PRICE, World};
use festival_core::observation::Observation;
use festival_core::types::Address;
use festival_core::EconomyError;
use festival_testing::cr;
use festival_ticketing::{VoteOutcome, VotingPhase};

#[tokio::test]
async fn two_thirds_vote_cancels_and_refunds() {
    let world = World::new().await;
    let registry = world.registry();
    let voting = world.directory.voting();
    let event_id = world.event.event_id.clone();

    registry.bulk_mint_tickets(world.organiser, 10, world.organiser).unwrap();
    let buyers = world.sell_to(3, PRICE);
    assert_eq!(registry.treasury_balance(), cr(300));
    assert_eq!(registry.number_of_customers(), 3);
    for buyer in &buyers {
        assert_eq!(world.balance(*buyer), cr(0));
    }

    world.open_voting();
    assert_eq!(voting.threshold(&event_id).unwrap(), 2);
    assert_eq!(
        voting.vote(buyers[0], &event_id, true).unwrap(),
        VoteOutcome::Recorded
    );
    assert_eq!(
        voting.vote(buyers[1], &event_id, true).unwrap(),
        VoteOutcome::Cancelled { refunded: cr(300) }
    );

    assert!(registry.is_cancelled());
    assert_eq!(voting.status(&event_id).unwrap(), VotingPhase::Cancelled);
    assert_eq!(registry.treasury_balance(), cr(0));
    for buyer in &buyers {
        assert_eq!(world.balance(*buyer), cr(PRICE));
    }
    let refunds = world
        .log
        .matching(|o| matches!(o, Observation::Refund { .. }));
    assert_eq!(
        refunds,
        vec![Observation::Refund {
            event_id: event_id.clone(),
            total: cr(300),
        }]
    );
    assert!(!world.directory.event_details(&event_id).unwrap().is_active);

    // The session is over and nothing can be paid out twice.
    assert_eq!(
        voting.vote(buyers[2], &event_id, true),
        Err(EconomyError::VotingClosed(event_id.clone()))
    );
    assert_eq!(
        registry.refund_all_tickets(),
        Err(EconomyError::AlreadyRefunded(event_id.clone()))
    );
    assert_eq!(
        registry.buy_tickets(buyers[2], 1),
        Err(EconomyError::EventCancelled(event_id.clone()))
    );
    world.close_voting();
    assert_eq!(
        registry.withdraw_funds(world.organiser),
        Err(EconomyError::EventCancelled(event_id))
    );
}

#[tokio::test]
async fn keep_votes_do_not_count_towards_cancellation() {
    let world = World::new().await;
    let voting = world.directory.voting();
    let event_id = world.event.event_id.clone();
    let buyers = world.sell_to(3, PRICE);

    world.open_voting();
    voting.vote(buyers[0], &event_id, false).unwrap();
    voting.vote(buyers[1], &event_id, false).unwrap();
    assert_eq!(
        voting.vote(buyers[2], &event_id, true).unwrap(),
        VoteOutcome::Recorded
    );

    let detail = voting.get_voting_detail(&event_id).unwrap();
    assert_eq!((detail.yes_votes, detail.no_votes), (2, 1));
    assert!(!detail.cancelled);
    assert_eq!(detail.registry, world.event.registry);
}

#[tokio::test]
async fn votes_outside_the_window_are_rejected() {
    let world = World::new().await;
    let voting = world.directory.voting();
    let event_id = world.event.event_id.clone();
    let buyers = world.sell_to(1, PRICE);

    assert_eq!(voting.status(&event_id).unwrap(), VotingPhase::Scheduled);
    assert_eq!(
        voting.vote(buyers[0], &event_id, true),
        Err(EconomyError::VotingNotStarted {
            starts_at: world.event.date_time,
        })
    );

    world.close_voting();
    assert_eq!(voting.status(&event_id).unwrap(), VotingPhase::Closed);
    assert_eq!(
        voting.vote(buyers[0], &event_id, true),
        Err(EconomyError::VotingClosed(event_id.clone()))
    );
    assert!(!voting.has_voted(&event_id, buyers[0]).unwrap());
}

#[tokio::test]
async fn organiser_withdraws_once_the_window_closes() {
    let world = World::new().await;
    let registry = world.registry();
    let buyers = world.sell_to(4, PRICE);
    let voting_end = world.event.date_time + Duration::days(3);

    world.open_voting();
    world
        .directory
        .voting()
        .vote(buyers[0], &world.event.event_id, true)
        .unwrap();
    assert_eq!(
        registry.withdraw_funds(world.organiser),
        Err(EconomyError::VotingNotEnded {
            ends_at: voting_end,
        })
    );

    world.close_voting();
    let outsider = Address::new();
    assert!(matches!(
        registry.withdraw_funds(outsider),
        Err(EconomyError::Forbidden { .. })
    ));
    assert_eq!(registry.withdraw_funds(world.organiser).unwrap(), cr(400));
    assert_eq!(world.balance(world.organiser), cr(400));
    assert_eq!(
        registry.withdraw_funds(world.organiser),
        Err(EconomyError::NothingToWithdraw)
    );
    assert_eq!(
        registry.refund_all_tickets(),
        Err(EconomyError::EventNotCancelled(world.event.event_id.clone()))
    );
}

#[tokio::test]
async fn scanned_tickets_still_vote_and_refund() {
    let world = World::new().await;
    let registry = world.registry();
    let voting = world.directory.voting();
    let event_id = world.event.event_id.clone();
    let buyers = world.sell_to(2, PRICE);
    let ticket = registry.tickets_of(buyers[0])[0];

    world.open_voting();
    registry.scan_ticket(world.organiser, buyers[0], ticket).unwrap();
    assert_eq!(
        registry.scan_ticket(world.organiser, buyers[0], ticket),
        Err(EconomyError::AlreadyUsed(ticket))
    );

    voting.vote(buyers[0], &event_id, true).unwrap();
    assert!(matches!(
        voting.vote(buyers[1], &event_id, true).unwrap(),
        VoteOutcome::Cancelled { .. }
    ));
    assert_eq!(world.balance(buyers[0]), cr(PRICE));
    assert!(registry.ticket(ticket).unwrap().refunded);
}

#[tokio::test]
async fn treasury_cannot_be_drained_before_cancellation() {
    let world = World::new().await;
    let registry = world.registry();
    let voting = world.directory.voting();
    let event_id = world.event.event_id.clone();
    let buyers = world.sell_to(1, PRICE);
    let thief = Address::new();

    assert!(matches!(
        world.ledger().transfer(registry.treasury(), thief, cr(PRICE)),
        Err(EconomyError::Unauthorized { caller, .. }) if caller == registry.treasury()
    ));
    assert!(matches!(
        world
            .ledger()
            .transfer_delegated(registry.treasury(), registry.treasury(), thief, cr(PRICE)),
        Err(EconomyError::Unauthorized { .. })
    ));
    assert_eq!(world.balance(thief), cr(0));
    assert_eq!(registry.treasury_balance(), cr(PRICE));

    world.open_voting();
    assert_eq!(
        voting.vote(buyers[0], &event_id, true).unwrap(),
        VoteOutcome::Cancelled { refunded: cr(PRICE) }
    );
    assert_eq!(world.balance(buyers[0]), cr(PRICE));
}

#[tokio::test]
async fn pool_ticket_bought_on_the_marketplace_is_refunded() {
    let world = World::new().await;
    let registry = world.registry();
    let market = world.marketplace();
    let voting = world.directory.voting();
    let event_id = world.event.event_id.clone();

    let ticket = registry
        .bulk_mint_tickets(world.organiser, 1, world.organiser)
        .unwrap()[0];
    registry.approve(world.organiser, ticket, market.address()).unwrap();
    market.list_ticket(world.organiser, ticket, cr(110)).unwrap();
    let buyer = Address::new();
    world.fund(buyer, 110);
    market.buy_ticket(buyer, ticket).unwrap();

    assert!(registry.is_customer(buyer));
    assert!(registry.ticket(ticket).unwrap().is_sold);
    assert_eq!(registry.treasury_balance(), cr(PRICE));
    assert_eq!(world.balance(world.organiser), cr(10));

    world.open_voting();
    assert_eq!(
        voting.vote(buyer, &event_id, true).unwrap(),
        VoteOutcome::Cancelled { refunded: cr(PRICE) }
    );
    assert_eq!(world.balance(buyer), cr(PRICE));
    assert_eq!(registry.treasury_balance(), cr(0));
}
