mod helpers;

use gavel_backend::collaborators::NotificationTemplate;
use gavel_backend::error::AppError;
use gavel_backend::models::*;
use gavel_backend::repositories::{AuctionStore, BidStore};
use gavel_backend::services::{AuctionCloser, AuctionUpdate, CreateAuction};
use helpers::*;
use std::time::Duration;
use uuid::Uuid;

/// Full flow: bids land, the auction closes, everyone hears about it
#[tokio::test]
async fn test_close_with_winner_and_fanout() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let alice = h.users.register().await;
    let bob = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    let losing = h
        .bidding
        .place_bid(auction.id, alice, dec(120), None)
        .await
        .expect("first bid should be accepted");
    let winning = h
        .bidding
        .place_bid(auction.id, bob, dec(150), None)
        .await
        .expect("second bid should be accepted");

    let result = h
        .closing
        .close_expired_auction(auction.id)
        .await
        .expect("close should succeed");

    assert!(result.has_winner);
    assert_eq!(result.winner_id, Some(bob));
    assert_eq!(result.final_price, Some(dec(150)));
    assert_eq!(result.winning_bid.as_ref().map(|b| b.id), Some(winning.bid.id));

    let stored = h.auction(auction.id).await;
    assert_eq!(stored.status, AuctionStatus::Closed);
    assert_eq!(stored.winner_id, Some(bob));

    assert_eq!(h.bid(winning.bid.id).await.status, BidStatus::Won);
    assert_eq!(h.bid(losing.bid.id).await.status, BidStatus::Lost);

    // Fan-out runs on a spawned task
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.notifier.received(bob, NotificationTemplate::AuctionWon).await);
    assert!(h.notifier.received(seller, NotificationTemplate::AuctionEnded).await);
    assert!(h.notifier.received(alice, NotificationTemplate::AuctionLost).await);
    assert!(!h.notifier.received(bob, NotificationTemplate::AuctionLost).await);
    assert_eq!(h.webhooks.count("auction.ended").await, 1);
}

/// Duplicate triggers observe a non-active auction and no-op
#[tokio::test]
async fn test_close_is_idempotent() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let bidder = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    h.bidding
        .place_bid(auction.id, bidder, dec(120), None)
        .await
        .expect("bid should be accepted");

    let first = h.closing.close_expired_auction(auction.id).await.unwrap();
    assert!(first.has_winner);

    let after_first = h.auction(auction.id).await;

    let second = h.closing.close_expired_auction(auction.id).await.unwrap();
    assert!(!second.has_winner);
    assert!(second.winning_bid.is_none());

    let after_second = h.auction(auction.id).await;
    assert_eq!(after_second.version, after_first.version);
    assert_eq!(after_second.winner_id, Some(bidder));

    tokio::time::sleep(Duration::from_millis(100)).await;
    // Only the first close fans out
    assert_eq!(h.webhooks.count("auction.ended").await, 1);
    assert_eq!(h.notifier.count(NotificationTemplate::AuctionWon).await, 1);
}

/// A bid whose auction-side commit never landed must not be crowned: the
/// winner comes from `highest_bid_id`, which only the acceptance path writes
#[tokio::test]
async fn test_close_ignores_uncommitted_bids() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let alice = h.users.register().await;
    let bob = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    let committed = h
        .bidding
        .place_bid(auction.id, alice, dec(120), None)
        .await
        .expect("bid should be accepted");

    // A higher bid caught between its ledger insert and the auction-side
    // commit when the close lands (its owner rolls it back afterwards)
    let in_flight = h
        .bids
        .insert(&Bid::new(auction.id, bob, dec(150), None))
        .await
        .expect("insert should succeed");

    let result = h.closing.close_expired_auction(auction.id).await.unwrap();

    assert_eq!(result.winner_id, Some(alice));
    assert_eq!(result.final_price, Some(dec(120)));
    assert_eq!(
        result.winning_bid.as_ref().map(|b| b.id),
        Some(committed.bid.id)
    );

    let stored = h.auction(auction.id).await;
    assert_eq!(stored.winner_id, Some(alice));
    assert_eq!(h.bid(committed.bid.id).await.status, BidStatus::Won);
    assert_ne!(h.bid(in_flight.id).await.status, BidStatus::Won);
}

#[tokio::test]
async fn test_close_below_reserve_has_no_winner() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let bidder = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), Some(dec(200)), None).await;

    let bid = h
        .bidding
        .place_bid(auction.id, bidder, dec(150), None)
        .await
        .expect("bid should be accepted");

    let result = h.closing.close_expired_auction(auction.id).await.unwrap();

    assert!(!result.has_winner);
    assert!(result.winner_id.is_none());
    assert!(result.final_price.is_none());
    // The highest bid is still reported for the audit trail
    let reported = result.winning_bid.expect("highest bid reported");
    assert_eq!(reported.id, bid.bid.id);
    assert_eq!(reported.status, BidStatus::Lost);

    let stored = h.auction(auction.id).await;
    assert_eq!(stored.status, AuctionStatus::Closed);
    assert!(stored.winner_id.is_none());
    assert_eq!(h.bid(bid.bid.id).await.status, BidStatus::Lost);
}

#[tokio::test]
async fn test_close_with_no_bids() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    let result = h.closing.close_expired_auction(auction.id).await.unwrap();

    assert!(!result.has_winner);
    assert!(result.winning_bid.is_none());
    assert_eq!(h.auction(auction.id).await.status, AuctionStatus::Closed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.notifier.received(seller, NotificationTemplate::AuctionEnded).await);
    assert_eq!(h.notifier.count(NotificationTemplate::AuctionWon).await, 0);
}

#[tokio::test]
async fn test_determine_winner_requires_closed_auction() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    let err = h.closing.determine_winner(auction.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = h.closing.determine_winner(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

/// Re-running winner determination on a closed auction is the recovery path
#[tokio::test]
async fn test_determine_winner_is_idempotent() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let bidder = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    h.bidding
        .place_bid(auction.id, bidder, dec(120), None)
        .await
        .expect("bid should be accepted");

    let closed = h.closing.close_expired_auction(auction.id).await.unwrap();
    let redone = h.closing.determine_winner(auction.id).await.unwrap();

    assert_eq!(redone.winner_id, closed.winner_id);
    assert_eq!(redone.final_price, closed.final_price);
    assert_eq!(h.auction(auction.id).await.winner_id, Some(bidder));
}

/// Scheduler: a past end time closes synchronously
#[tokio::test]
async fn test_schedule_past_due_closes_immediately() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let auction = insert_auction_with_times(
        &h,
        seller,
        dec(100),
        None,
        None,
        hours_ago(2),
        hours_ago(1),
        AuctionStatus::Active,
    )
    .await;

    h.scheduler
        .schedule_expiration(auction.id, auction.end_time)
        .await
        .expect("scheduling should succeed");

    assert_eq!(h.auction(auction.id).await.status, AuctionStatus::Closed);
    assert_eq!(h.scheduler.pending_triggers().await, 0);
}

/// Scheduler: the trigger fires at the end time
#[tokio::test]
async fn test_trigger_fires_at_end_time() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let end_time = millis_from_now(150);
    let auction = insert_auction_with_times(
        &h,
        seller,
        dec(100),
        None,
        None,
        hours_ago(1),
        end_time,
        AuctionStatus::Active,
    )
    .await;

    h.scheduler
        .schedule_expiration(auction.id, end_time)
        .await
        .expect("scheduling should succeed");
    assert_eq!(h.scheduler.pending_triggers().await, 1);
    assert_eq!(h.auction(auction.id).await.status, AuctionStatus::Active);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.auction(auction.id).await.status, AuctionStatus::Closed);
    assert_eq!(h.scheduler.pending_triggers().await, 0);
}

#[tokio::test]
async fn test_cancel_prevents_trigger_from_firing() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let end_time = millis_from_now(150);
    let auction = insert_auction_with_times(
        &h,
        seller,
        dec(100),
        None,
        None,
        hours_ago(1),
        end_time,
        AuctionStatus::Active,
    )
    .await;

    h.scheduler
        .schedule_expiration(auction.id, end_time)
        .await
        .expect("scheduling should succeed");
    h.scheduler.cancel_expiration(auction.id).await;
    assert_eq!(h.scheduler.pending_triggers().await, 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.auction(auction.id).await.status, AuctionStatus::Active);
}

/// Rescheduling replaces the pending trigger instead of stacking another
#[tokio::test]
async fn test_reschedule_replaces_pending_trigger() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    h.scheduler
        .schedule_expiration(auction.id, hours_from_now(1))
        .await
        .unwrap();
    h.scheduler
        .schedule_expiration(auction.id, hours_from_now(2))
        .await
        .unwrap();

    assert_eq!(h.scheduler.pending_triggers().await, 1);
}

/// The sweep rescues expired auctions whose trigger was lost
#[tokio::test]
async fn test_sweep_closes_expired_auctions() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let expired = insert_auction_with_times(
        &h,
        seller,
        dec(100),
        None,
        None,
        hours_ago(2),
        hours_ago(1),
        AuctionStatus::Active,
    )
    .await;
    let running = insert_active_auction(&h, seller, dec(100), None, None).await;

    let picked_up = h.scheduler.sweep_once().await.expect("sweep should succeed");

    assert_eq!(picked_up, 1);
    assert_eq!(h.auction(expired.id).await.status, AuctionStatus::Closed);
    assert_eq!(h.auction(running.id).await.status, AuctionStatus::Active);

    // Nothing left for a second pass
    assert_eq!(h.scheduler.sweep_once().await.unwrap(), 0);
}

/// Startup re-arming: one trigger per active auction
#[tokio::test]
async fn test_rearm_active_auctions() {
    let h = Harness::new();
    let seller = h.users.register().await;
    insert_active_auction(&h, seller, dec(100), None, None).await;
    insert_active_auction(&h, seller, dec(100), None, None).await;
    insert_auction_with_times(
        &h,
        seller,
        dec(100),
        None,
        None,
        hours_ago(1),
        hours_from_now(1),
        AuctionStatus::Draft,
    )
    .await;

    let rearmed = h.scheduler.rearm_active_auctions().await.unwrap();

    assert_eq!(rearmed, 2);
    assert_eq!(h.scheduler.pending_triggers().await, 2);
}

/// Lifecycle: create, publish, edit, cancel, delete
fn create_params(seller_id: Uuid, publish: bool) -> CreateAuction {
    CreateAuction {
        seller_id,
        title: "Boxed record player".to_string(),
        description: None,
        starting_price: dec(100),
        reserve_price: Some(dec(150)),
        buy_now_price: Some(dec(300)),
        start_time: hours_ago(1),
        end_time: hours_from_now(1),
        publish,
    }
}

#[tokio::test]
async fn test_create_published_auction_arms_trigger() {
    let h = Harness::new();
    let seller = h.users.register().await;

    let auction = h
        .lifecycle
        .create_auction(create_params(seller, true))
        .await
        .expect("creation should succeed");

    assert_eq!(auction.status, AuctionStatus::Active);
    assert_eq!(auction.current_price, dec(100));
    assert_eq!(h.scheduler.pending_triggers().await, 1);
}

#[tokio::test]
async fn test_create_draft_then_activate() {
    let h = Harness::new();
    let seller = h.users.register().await;

    let draft = h
        .lifecycle
        .create_auction(create_params(seller, false))
        .await
        .expect("creation should succeed");
    assert_eq!(draft.status, AuctionStatus::Draft);
    assert_eq!(h.scheduler.pending_triggers().await, 0);

    let active = h.lifecycle.activate_auction(draft.id).await.unwrap();
    assert_eq!(active.status, AuctionStatus::Active);
    assert_eq!(h.scheduler.pending_triggers().await, 1);

    // A second activation finds the auction out of draft
    let err = h.lifecycle.activate_auction(draft.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_create_published_past_end_closes_at_once() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let mut params = create_params(seller, true);
    params.start_time = hours_ago(2);
    params.end_time = hours_ago(1);

    let auction = h
        .lifecycle
        .create_auction(params)
        .await
        .expect("creation should succeed");

    assert_eq!(h.auction(auction.id).await.status, AuctionStatus::Closed);
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let h = Harness::new();
    let seller = h.users.register().await;

    let mut inverted = create_params(seller, false);
    inverted.end_time = inverted.start_time;
    let err = h.lifecycle.create_auction(inverted).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut low_reserve = create_params(seller, false);
    low_reserve.reserve_price = Some(dec(50));
    let err = h.lifecycle.create_auction(low_reserve).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h
        .lifecycle
        .create_auction(create_params(Uuid::new_v4(), false))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_update_uncontested_auction() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    let updated = h
        .lifecycle
        .update_auction(
            auction.id,
            AuctionUpdate {
                title: Some("Restored record player".to_string()),
                starting_price: Some(dec(80)),
                ..Default::default()
            },
        )
        .await
        .expect("update should succeed");

    assert_eq!(updated.title, "Restored record player");
    assert_eq!(updated.starting_price, dec(80));
    // No bids yet, so the current price follows the floor
    assert_eq!(updated.current_price, dec(80));
}

#[tokio::test]
async fn test_update_rejected_once_bids_exist() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let bidder = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    h.bidding
        .place_bid(auction.id, bidder, dec(120), None)
        .await
        .expect("bid should be accepted");

    let err = h
        .lifecycle
        .update_auction(
            auction.id,
            AuctionUpdate {
                title: Some("New title".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(h.auction(auction.id).await.title, "Vintage synthesizer");
}

#[tokio::test]
async fn test_cancel_uncontested_auction() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;
    h.scheduler
        .schedule_expiration(auction.id, auction.end_time)
        .await
        .unwrap();

    let cancelled = h.lifecycle.cancel_auction(auction.id).await.unwrap();

    assert_eq!(cancelled.status, AuctionStatus::Cancelled);
    assert_eq!(h.scheduler.pending_triggers().await, 0);

    // Terminal: cancelling again is an invalid state, not a no-op
    let err = h.lifecycle.cancel_auction(auction.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert!(err.to_string().contains("already"));
}

#[tokio::test]
async fn test_cancel_rejected_once_bids_exist() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let bidder = h.users.register().await;
    let auction = insert_active_auction(&h, seller, dec(100), None, None).await;

    h.bidding
        .place_bid(auction.id, bidder, dec(120), None)
        .await
        .expect("bid should be accepted");

    let err = h.lifecycle.cancel_auction(auction.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(h.auction(auction.id).await.status, AuctionStatus::Active);
}

#[tokio::test]
async fn test_delete_guards() {
    let h = Harness::new();
    let seller = h.users.register().await;
    let bidder = h.users.register().await;

    // Uncontested: delete succeeds and the record is gone
    let empty = insert_active_auction(&h, seller, dec(100), None, None).await;
    h.lifecycle.delete_auction(empty.id).await.unwrap();
    assert!(h.auctions.find_by_id(empty.id).await.unwrap().is_none());

    // With bids: rejected
    let contested = insert_active_auction(&h, seller, dec(100), None, None).await;
    h.bidding
        .place_bid(contested.id, bidder, dec(120), None)
        .await
        .expect("bid should be accepted");
    let err = h.lifecycle.delete_auction(contested.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    // Closed: the record is the audit trail, never deleted
    h.closing.close_expired_auction(contested.id).await.unwrap();
    let err = h.lifecycle.delete_auction(contested.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}
