//! Gavel Backend Library
//!
//! Bid-acceptance and auction-closing core of the Gavel auction
//! marketplace. This module exposes the backend components for use by the
//! worker binary, tests and other consumers.

pub mod collaborators;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use collaborators::{
    CacheInvalidator, ChannelBroadcaster, HttpUserDirectory, HttpWebhookDispatcher, LogNotifier,
    NoopCacheInvalidator, NotificationDispatcher, RealtimeBroadcaster, UserDirectory,
    WebhookDispatcher,
};
use repositories::{AuctionRepository, AuctionStore, BidRepository, BidStore};
use services::{AuctionCloser, AuctionService, BiddingService, ClosingService, ExpirationScheduler};
use std::sync::Arc;

/// Application state containing the stores, collaborators and services
pub struct AppState {
    pub auction_store: Arc<dyn AuctionStore>,
    pub bid_store: Arc<dyn BidStore>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub auction_service: Arc<AuctionService>,
    pub bidding_service: Arc<BiddingService>,
    pub closing_service: Arc<ClosingService>,
    pub scheduler: Arc<ExpirationScheduler>,
}

impl AppState {
    /// Wire the Postgres-backed stores and default collaborators.
    /// Must be called from within a Tokio runtime (the webhook dispatcher
    /// spawns its delivery worker).
    pub fn new(pool: sqlx::PgPool, config: &AppConfig) -> Self {
        let auction_store: Arc<dyn AuctionStore> = Arc::new(AuctionRepository::new(pool.clone()));
        let bid_store: Arc<dyn BidStore> = Arc::new(BidRepository::new(pool));

        let users: Arc<dyn UserDirectory> =
            Arc::new(HttpUserDirectory::new(config.user_service_url.clone()));
        let notifier: Arc<dyn NotificationDispatcher> = Arc::new(LogNotifier);
        let broadcaster = Arc::new(ChannelBroadcaster::default());
        let realtime: Arc<dyn RealtimeBroadcaster> = broadcaster.clone();
        let cache: Arc<dyn CacheInvalidator> = Arc::new(NoopCacheInvalidator);
        let webhooks: Arc<dyn WebhookDispatcher> =
            Arc::new(HttpWebhookDispatcher::spawn(config.webhook_url.clone()));

        let closing_service = Arc::new(ClosingService::new(
            auction_store.clone(),
            bid_store.clone(),
            notifier.clone(),
            realtime.clone(),
            cache.clone(),
            webhooks.clone(),
        ));
        let closer: Arc<dyn AuctionCloser> = closing_service.clone();

        let scheduler = Arc::new(
            ExpirationScheduler::new(closer.clone(), auction_store.clone())
                .with_sweep_interval(config.sweep_interval()),
        );

        let bidding_service = Arc::new(BiddingService::new(
            auction_store.clone(),
            bid_store.clone(),
            users.clone(),
            notifier,
            realtime,
            cache,
            webhooks,
            closer,
        ));

        let auction_service = Arc::new(AuctionService::new(
            auction_store.clone(),
            users,
            scheduler.clone(),
        ));

        Self {
            auction_store,
            bid_store,
            broadcaster,
            auction_service,
            bidding_service,
            closing_service,
            scheduler,
        }
    }
}
