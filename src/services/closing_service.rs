use crate::collaborators::{
    CacheInvalidator, NotificationDispatcher, NotificationTemplate, RealtimeBroadcaster,
    WebhookDispatcher,
};
use crate::error::{AppError, AppResult};
use crate::models::{Auction, AuctionStatus, Bid, BidStatus};
use crate::repositories::{AuctionStore, BidStore};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Attempts at the bid-status resolution pass before surfacing the failure
const RESOLVE_ATTEMPTS: u32 = 3;

/// Outcome of closing an auction
#[derive(Debug, Clone, Default)]
pub struct ClosureResult {
    pub has_winner: bool,
    pub winner_id: Option<Uuid>,
    /// Highest bid, reported even when the reserve was not met (audit/UI)
    pub winning_bid: Option<Bid>,
    pub final_price: Option<Decimal>,
}

/// Closer capability consumed by the scheduler and the buy-now path.
/// Keeps the dependency direction clean: components schedule against the
/// trait, the concrete service is injected.
#[async_trait]
pub trait AuctionCloser: Send + Sync {
    async fn close_expired_auction(&self, auction_id: Uuid) -> AppResult<ClosureResult>;
}

/// Auction Closer.
///
/// Transitions an auction `active -> closed` exactly once and resolves the
/// winner. The status flip is the linearization point: duplicate triggers
/// (timer, sweep, manual) observe a non-active auction and no-op.
pub struct ClosingService {
    auction_store: Arc<dyn AuctionStore>,
    bid_store: Arc<dyn BidStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    broadcaster: Arc<dyn RealtimeBroadcaster>,
    cache: Arc<dyn CacheInvalidator>,
    webhooks: Arc<dyn WebhookDispatcher>,
}

impl ClosingService {
    pub fn new(
        auction_store: Arc<dyn AuctionStore>,
        bid_store: Arc<dyn BidStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        broadcaster: Arc<dyn RealtimeBroadcaster>,
        cache: Arc<dyn CacheInvalidator>,
        webhooks: Arc<dyn WebhookDispatcher>,
    ) -> Self {
        Self {
            auction_store,
            bid_store,
            notifier,
            broadcaster,
            cache,
            webhooks,
        }
    }

    /// Re-run winner determination for an already-closed auction.
    /// Idempotent; the recovery path when a previous closure failed partway
    /// through bid-status resolution.
    pub async fn determine_winner(&self, auction_id: Uuid) -> AppResult<ClosureResult> {
        let auction = self
            .auction_store
            .find_by_id(auction_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("Auction {} not found", auction_id)))?;

        if auction.status != AuctionStatus::Closed {
            return Err(AppError::InvalidState(format!(
                "Winner can only be determined for a closed auction, auction {} is {}",
                auction_id,
                auction.status.as_str()
            )));
        }

        self.resolve_with_retry(&auction).await
    }

    async fn resolve_with_retry(&self, auction: &Auction) -> AppResult<ClosureResult> {
        let mut attempt = 1;
        loop {
            match self.resolve(auction).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < RESOLVE_ATTEMPTS => {
                    warn!(
                        "Bid resolution for auction {} failed (attempt {}/{}): {}",
                        auction.id, attempt, RESOLVE_ATTEMPTS, e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    // The auction stays closed; recover by re-invoking
                    // determine_winner once the store is healthy again.
                    error!("Bid resolution for auction {} failed: {}", auction.id, e);
                    return Err(e);
                }
            }
        }
    }

    /// Winner selection under reserve-price rules. Only the committed
    /// leader counts: `highest_bid_id` is written by the acceptance CAS, so
    /// a bid whose ledger insert is still in flight when the close lands can
    /// never be crowned (its owner rolls it back on the failed commit).
    /// Ties are impossible by construction: acceptance requires strictly
    /// greater amounts.
    async fn resolve(&self, auction: &Auction) -> AppResult<ClosureResult> {
        let top_id = match auction.highest_bid_id {
            Some(id) => id,
            None => {
                info!("Auction {} closed with no bids", auction.id);
                return Ok(ClosureResult::default());
            }
        };
        let top = self
            .bid_store
            .find_by_id(top_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bid {} not found", top_id)))?;

        if let Some(reserve) = auction.reserve_price {
            if top.amount < reserve {
                info!(
                    "Auction {} closed below reserve ({} < {}), no winner",
                    auction.id, top.amount, reserve
                );
                self.bid_store.resolve_closed(auction.id, None).await?;
                let mut top = top;
                top.status = BidStatus::Lost;
                return Ok(ClosureResult {
                    has_winner: false,
                    winner_id: None,
                    winning_bid: Some(top),
                    final_price: None,
                });
            }
        }

        self.bid_store.resolve_closed(auction.id, Some(top.id)).await?;
        self.auction_store.set_winner(auction.id, top.bidder_id).await?;

        info!(
            "Auction {} won by bidder {} at {}",
            auction.id, top.bidder_id, top.amount
        );

        let mut top = top;
        top.status = BidStatus::Won;
        Ok(ClosureResult {
            has_winner: true,
            winner_id: Some(top.bidder_id),
            winning_bid: Some(top.clone()),
            final_price: Some(top.amount),
        })
    }

    /// Best-effort closure fan-out: winner/seller/bidder notifications,
    /// room broadcast, cache invalidation and the analytics webhook.
    fn dispatch_closure_side_effects(&self, auction: Auction, result: ClosureResult) {
        let bid_store = self.bid_store.clone();
        let notifier = self.notifier.clone();
        let broadcaster = self.broadcaster.clone();
        let cache = self.cache.clone();
        let webhooks = self.webhooks.clone();

        tokio::spawn(async move {
            let context = serde_json::json!({
                "auction_id": auction.id,
                "auction_title": auction.title,
                "has_winner": result.has_winner,
                "final_price": result.final_price,
                "winner_id": result.winner_id,
            });

            if let Some(winner_id) = result.winner_id {
                if let Err(e) = notifier
                    .notify(winner_id, NotificationTemplate::AuctionWon, context.clone())
                    .await
                {
                    warn!("Winner notification failed: {}", e);
                }
            }

            if let Err(e) = notifier
                .notify(auction.seller_id, NotificationTemplate::AuctionEnded, context.clone())
                .await
            {
                warn!("Seller notification failed: {}", e);
            }

            match bid_store.distinct_bidders(auction.id).await {
                Ok(bidders) => {
                    for bidder in bidders {
                        if Some(bidder) == result.winner_id {
                            continue;
                        }
                        if let Err(e) = notifier
                            .notify(bidder, NotificationTemplate::AuctionLost, context.clone())
                            .await
                        {
                            warn!("Bidder notification failed for {}: {}", bidder, e);
                        }
                    }
                }
                Err(e) => warn!("Could not list bidders for auction {}: {}", auction.id, e),
            }

            broadcaster
                .emit_to_auction_room(auction.id, "auction_closed", context.clone())
                .await;

            if let Err(e) = cache.invalidate_auction_cache(auction.id).await {
                warn!("Auction cache invalidation failed: {}", e);
            }
            if let Err(e) = cache.invalidate_search_cache().await {
                warn!("Search cache invalidation failed: {}", e);
            }

            if let Err(e) = webhooks.enqueue_webhook("auction.ended", context).await {
                warn!("Webhook enqueue failed: {}", e);
            }
        });
    }
}

#[async_trait]
impl AuctionCloser for ClosingService {
    async fn close_expired_auction(&self, auction_id: Uuid) -> AppResult<ClosureResult> {
        // Conditional flip: only one of any concurrent triggers gets Some
        let auction = match self.auction_store.try_close(auction_id).await? {
            Some(auction) => auction,
            None => {
                info!(
                    "Close of auction {} skipped: not found or not active",
                    auction_id
                );
                return Ok(ClosureResult::default());
            }
        };

        info!("Auction {} closed, resolving winner", auction_id);
        let result = self.resolve_with_retry(&auction).await?;

        self.dispatch_closure_side_effects(auction, result.clone());

        Ok(result)
    }
}
