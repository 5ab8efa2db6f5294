use crate::collaborators::{
    CacheInvalidator, NotificationDispatcher, NotificationTemplate, RealtimeBroadcaster,
    UserDirectory, WebhookDispatcher,
};
use crate::error::{AppError, AppResult};
use crate::models::{Auction, AuctionStatus, Bid};
use crate::repositories::{AuctionStore, BidStore};
use crate::services::closing_service::{AuctionCloser, ClosureResult};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempts at the version CAS before surfacing a conflict to the caller
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Per-auction mutual exclusion for the acceptance critical section.
/// Never a global lock: each auction id gets its own mutex, the guard is
/// dropped before any collaborator I/O runs, and an entry is pruned once
/// the last acquirer releases it.
struct AuctionLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AuctionLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, auction_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(auction_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the map entry once nobody holds or awaits the lock
    async fn release(&self, auction_id: Uuid) {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(&auction_id) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&auction_id);
            }
        }
    }
}

#[derive(Debug)]
pub struct BidResult {
    pub bid: Bid,
    pub auction: Auction,
}

/// Bid Acceptance Engine.
///
/// Validates a bid against the live auction state and commits it as the new
/// highest bid. Acceptance on a given auction is serialized by a per-auction
/// mutex; the auction-side write is additionally guarded by a version
/// compare-and-swap so an out-of-band writer can never be overwritten.
pub struct BiddingService {
    auction_store: Arc<dyn AuctionStore>,
    bid_store: Arc<dyn BidStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn NotificationDispatcher>,
    broadcaster: Arc<dyn RealtimeBroadcaster>,
    cache: Arc<dyn CacheInvalidator>,
    webhooks: Arc<dyn WebhookDispatcher>,
    closer: Arc<dyn AuctionCloser>,
    locks: AuctionLocks,
}

impl BiddingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auction_store: Arc<dyn AuctionStore>,
        bid_store: Arc<dyn BidStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationDispatcher>,
        broadcaster: Arc<dyn RealtimeBroadcaster>,
        cache: Arc<dyn CacheInvalidator>,
        webhooks: Arc<dyn WebhookDispatcher>,
        closer: Arc<dyn AuctionCloser>,
    ) -> Self {
        Self {
            auction_store,
            bid_store,
            users,
            notifier,
            broadcaster,
            cache,
            webhooks,
            closer,
            locks: AuctionLocks::new(),
        }
    }

    /// Place a bid.
    ///
    /// Precondition failures are expected traffic and logged at debug only.
    /// The check order (existence, state, timing, bidder, amount, price
    /// guards) is part of the contract.
    pub async fn place_bid(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: Decimal,
        metadata: Option<Value>,
    ) -> AppResult<BidResult> {
        info!(
            "Placing bid: auction={}, bidder={}, amount={}",
            auction_id, bidder_id, amount
        );

        let now = chrono::Utc::now().naive_utc();
        let auction = self
            .auction_store
            .find_by_id(auction_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("Auction {} not found", auction_id)))?;
        self.check_open(&auction, now)?;

        // The bidder must resolve in the identity service. Looked up before
        // the lock is taken: directory latency must never stall the other
        // bidders on this auction.
        self.users
            .get_user(bidder_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bidder {} not found", bidder_id)))?;

        let guard = self.locks.acquire(auction_id).await;
        let outcome = self.accept(auction_id, bidder_id, amount, metadata).await;

        // Release the critical section before any collaborator I/O
        drop(guard);
        self.locks.release(auction_id).await;

        let (bid, auction, previous_leader) = outcome?;
        info!(
            "Bid {} accepted on auction {}: price {} -> {}",
            bid.id, auction_id, auction.starting_price, auction.current_price
        );
        self.dispatch_bid_side_effects(bid.clone(), auction.clone(), previous_leader);

        Ok(BidResult { bid, auction })
    }

    /// State and timing preconditions, re-checked on every commit attempt
    fn check_open(&self, auction: &Auction, now: NaiveDateTime) -> AppResult<()> {
        if auction.status != AuctionStatus::Active {
            return Err(self.rejected(AppError::InvalidState(format!(
                "Auction {} is not active",
                auction.id
            ))));
        }
        if !auction.has_started(now) {
            return Err(self.rejected(AppError::InvalidState(format!(
                "Auction {} has not started yet",
                auction.id
            ))));
        }
        if auction.has_ended(now) {
            return Err(self.rejected(AppError::InvalidState(format!(
                "Auction {} has already ended",
                auction.id
            ))));
        }
        Ok(())
    }

    /// The critical section. The caller holds this auction's lock, so the
    /// state read here stays authoritative until the commit.
    async fn accept(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: Decimal,
        metadata: Option<Value>,
    ) -> AppResult<(Bid, Auction, Option<Bid>)> {
        let mut attempts = 0;
        loop {
            let now = chrono::Utc::now().naive_utc();

            let auction = self
                .auction_store
                .find_by_id(auction_id)
                .await
                .map_err(AppError::from)?
                .ok_or_else(|| AppError::NotFound(format!("Auction {} not found", auction_id)))?;
            self.check_open(&auction, now)?;

            if bidder_id == auction.seller_id {
                return Err(self.rejected(AppError::BusinessRule(
                    "Sellers cannot bid on their own auctions".to_string(),
                )));
            }
            if amount <= Decimal::ZERO {
                return Err(self.rejected(AppError::Validation(
                    "Bid amount must be positive".to_string(),
                )));
            }
            if amount <= auction.current_price {
                return Err(self.rejected(AppError::BusinessRule(format!(
                    "Bid must exceed the current price of {}",
                    auction.current_price
                ))));
            }
            // current_price normally tracks the leading bid, but both guards
            // are kept so the two can never drift apart unnoticed
            let previous_leader = self.bid_store.find_leader(auction_id).await?;
            if let Some(leader) = &previous_leader {
                if amount <= leader.amount {
                    return Err(self.rejected(AppError::BusinessRule(format!(
                        "Bid must exceed the current highest bid of {}",
                        leader.amount
                    ))));
                }
            }

            let bid = self
                .bid_store
                .insert(&Bid::new(auction_id, bidder_id, amount, metadata.clone()))
                .await?;

            match self
                .auction_store
                .commit_bid_acceptance(auction_id, auction.version, amount, bid.id)
                .await?
            {
                Some(updated) => {
                    self.bid_store.mark_outbid_except(auction_id, bid.id).await?;
                    return Ok((bid, updated, previous_leader));
                }
                None => {
                    // Lost the version race; roll the insert back and
                    // re-validate against the fresh state.
                    self.bid_store.remove(bid.id).await?;
                    attempts += 1;
                    if attempts >= MAX_COMMIT_ATTEMPTS {
                        return Err(AppError::Conflict(format!(
                            "Auction {} is receiving concurrent bids, please retry",
                            auction_id
                        )));
                    }
                    debug!(
                        "Bid commit on auction {} lost a version race, retrying ({}/{})",
                        auction_id, attempts, MAX_COMMIT_ATTEMPTS
                    );
                }
            }
        }
    }

    /// Instant purchase at the auction's buy-now price: the amount goes
    /// through the normal acceptance path, then the auction closes
    /// immediately.
    pub async fn buy_now(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        metadata: Option<Value>,
    ) -> AppResult<ClosureResult> {
        let auction = self
            .auction_store
            .find_by_id(auction_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("Auction {} not found", auction_id)))?;

        let price = auction.buy_now_price.ok_or_else(|| {
            AppError::InvalidState(format!("Auction {} has no buy-now price", auction_id))
        })?;

        self.place_bid(auction_id, bidder_id, price, metadata).await?;
        self.closer.close_expired_auction(auction_id).await
    }

    /// Best-effort post-commit work. Failures are logged and never affect
    /// the already-committed bid.
    fn dispatch_bid_side_effects(&self, bid: Bid, auction: Auction, previous_leader: Option<Bid>) {
        let users = self.users.clone();
        let notifier = self.notifier.clone();
        let broadcaster = self.broadcaster.clone();
        let cache = self.cache.clone();
        let webhooks = self.webhooks.clone();

        tokio::spawn(async move {
            if let Err(e) = users.increment_user_stat(bid.bidder_id, "total_bids", 1).await {
                warn!("Failed to update bidder stats for {}: {}", bid.bidder_id, e);
            }

            if let Err(e) = cache.invalidate_auction_cache(auction.id).await {
                warn!("Auction cache invalidation failed: {}", e);
            }
            if let Err(e) = cache.invalidate_search_cache().await {
                warn!("Search cache invalidation failed: {}", e);
            }

            let event = serde_json::json!({
                "bid_id": bid.id,
                "bidder_id": bid.bidder_id,
                "amount": bid.amount,
                "current_price": auction.current_price,
                "total_bids": auction.total_bids,
            });
            broadcaster
                .emit_to_auction_room(auction.id, "new_bid", event.clone())
                .await;

            if let Some(previous) = previous_leader {
                if previous.bidder_id != bid.bidder_id {
                    let context = serde_json::json!({
                        "auction_id": auction.id,
                        "auction_title": auction.title,
                        "outbid_amount": previous.amount,
                        "new_amount": bid.amount,
                    });
                    if let Err(e) = notifier
                        .notify(previous.bidder_id, NotificationTemplate::Outbid, context.clone())
                        .await
                    {
                        warn!("Outbid notification failed: {}", e);
                    }
                    broadcaster
                        .emit_to_user(previous.bidder_id, "outbid", context)
                        .await;
                }
            }

            let seller_context = serde_json::json!({
                "auction_id": auction.id,
                "auction_title": auction.title,
                "amount": bid.amount,
                "total_bids": auction.total_bids,
            });
            if let Err(e) = notifier
                .notify(auction.seller_id, NotificationTemplate::BidReceived, seller_context)
                .await
            {
                warn!("Seller notification failed: {}", e);
            }

            // Fraud-analysis dispatch for the AI collaborator
            if let Err(e) = webhooks.enqueue_webhook("bid.placed", event).await {
                warn!("Webhook enqueue failed: {}", e);
            }
        });
    }

    fn rejected(&self, reason: AppError) -> AppError {
        debug!("Bid rejected: {}", reason);
        reason
    }
}
