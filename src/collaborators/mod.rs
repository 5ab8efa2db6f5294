//! External collaborators consumed by the core.
//!
//! Identity, notification delivery, real-time fan-out, cache storage and the
//! fraud/analytics webhook sink all live outside this service; the core
//! talks to them through these traits. None of them may fail a committed
//! bid or closure.

pub mod broadcast;
pub mod users;
pub mod webhook;

use crate::error::AppResult;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

pub use broadcast::{ChannelBroadcaster, RealtimeEvent};
pub use users::HttpUserDirectory;
pub use webhook::HttpWebhookDispatcher;

use crate::models::User;

/// Notification templates rendered by the external dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    /// Seller: a new bid landed on their auction
    BidReceived,
    /// Bidder: their leading bid was superseded
    Outbid,
    /// Bidder: they won the auction
    AuctionWon,
    /// Bidder: the auction closed and they did not win
    AuctionLost,
    /// Seller: their auction closed (with or without a winner)
    AuctionEnded,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTemplate::BidReceived => "bid_received",
            NotificationTemplate::Outbid => "outbid",
            NotificationTemplate::AuctionWon => "auction_won",
            NotificationTemplate::AuctionLost => "auction_lost",
            NotificationTemplate::AuctionEnded => "auction_ended",
        }
    }
}

/// Identity/user service
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Bump a lifetime counter on the user record (e.g. total bids placed)
    async fn increment_user_stat(&self, id: Uuid, field: &str, delta: i64) -> AppResult<()>;
}

/// Notification dispatcher; fire-and-forget
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        template: NotificationTemplate,
        context: Value,
    ) -> AppResult<()>;
}

/// Real-time broadcaster; best-effort
#[async_trait]
pub trait RealtimeBroadcaster: Send + Sync {
    async fn emit_to_auction_room(&self, auction_id: Uuid, event_type: &str, payload: Value);

    async fn emit_to_user(&self, user_id: Uuid, event_type: &str, payload: Value);
}

/// Cache invalidator; may be skipped on failure without affecting correctness
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_auction_cache(&self, auction_id: Uuid) -> AppResult<()>;

    async fn invalidate_search_cache(&self) -> AppResult<()>;
}

/// Webhook sink for the fraud/AI and analytics collaborators. The core only
/// enqueues; delivery (at-least-once) is the sink's concern.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn enqueue_webhook(&self, event_type: &str, payload: Value) -> AppResult<()>;
}

/// Notification dispatcher that only records deliveries in the log.
/// Stands in for the real delivery pipeline in the worker binary.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        template: NotificationTemplate,
        context: Value,
    ) -> AppResult<()> {
        tracing::info!(
            "notify user={} template={} context={}",
            user_id,
            template.as_str(),
            context
        );
        Ok(())
    }
}

/// Cache invalidator for deployments without a cache tier
#[derive(Default)]
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate_auction_cache(&self, auction_id: Uuid) -> AppResult<()> {
        tracing::debug!("cache invalidation skipped for auction {}", auction_id);
        Ok(())
    }

    async fn invalidate_search_cache(&self) -> AppResult<()> {
        tracing::debug!("search cache invalidation skipped");
        Ok(())
    }
}
