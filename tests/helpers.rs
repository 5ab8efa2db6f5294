#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use gavel_backend::collaborators::{
    CacheInvalidator, ChannelBroadcaster, NoopCacheInvalidator, NotificationDispatcher,
    NotificationTemplate, RealtimeBroadcaster, UserDirectory, WebhookDispatcher,
};
use gavel_backend::error::AppResult;
use gavel_backend::models::*;
use gavel_backend::repositories::*;
use gavel_backend::services::*;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// User directory fixture: only ids registered through `register` resolve
pub struct StaticUserDirectory {
    users: Mutex<HashMap<Uuid, User>>,
    stats: Mutex<Vec<(Uuid, String, i64)>>,
    lookups: std::sync::atomic::AtomicUsize,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            stats: Mutex::new(Vec::new()),
            lookups: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of `get_user` calls the directory has served
    pub fn lookups(&self) -> usize {
        self.lookups.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Register a fresh user and return its id
    pub async fn register(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.users.lock().await.insert(
            id,
            User {
                id,
                role: "user".to_string(),
            },
        );
        id
    }

    /// Sum of recorded increments for a user's counter
    pub async fn stat_total(&self, id: Uuid, field: &str) -> i64 {
        self.stats
            .lock()
            .await
            .iter()
            .filter(|(user, f, _)| *user == id && f == field)
            .map(|(_, _, delta)| delta)
            .sum()
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        self.lookups
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn increment_user_stat(&self, id: Uuid, field: &str, delta: i64) -> AppResult<()> {
        self.stats.lock().await.push((id, field.to_string(), delta));
        Ok(())
    }
}

/// Notification dispatcher fixture that records every delivery
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, NotificationTemplate, Value)>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<(Uuid, NotificationTemplate, Value)> {
        self.sent.lock().await.clone()
    }

    pub async fn count(&self, template: NotificationTemplate) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(_, t, _)| *t == template)
            .count()
    }

    pub async fn received(&self, user_id: Uuid, template: NotificationTemplate) -> bool {
        self.sent
            .lock()
            .await
            .iter()
            .any(|(u, t, _)| *u == user_id && *t == template)
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        template: NotificationTemplate,
        context: Value,
    ) -> AppResult<()> {
        self.sent.lock().await.push((user_id, template, context));
        Ok(())
    }
}

/// Webhook sink fixture that records enqueued events
#[derive(Default)]
pub struct RecordingWebhooks {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingWebhooks {
    pub async fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }
}

#[async_trait]
impl WebhookDispatcher for RecordingWebhooks {
    async fn enqueue_webhook(&self, event_type: &str, payload: Value) -> AppResult<()> {
        self.events
            .lock()
            .await
            .push((event_type.to_string(), payload));
        Ok(())
    }
}

/// Fully wired service stack over the in-memory stores
pub struct Harness {
    pub auctions: Arc<InMemoryAuctionStore>,
    pub bids: Arc<InMemoryBidStore>,
    pub users: Arc<StaticUserDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub webhooks: Arc<RecordingWebhooks>,
    pub bidding: Arc<BiddingService>,
    pub closing: Arc<ClosingService>,
    pub scheduler: Arc<ExpirationScheduler>,
    pub lifecycle: Arc<AuctionService>,
}

impl Harness {
    pub fn new() -> Self {
        let auctions = Arc::new(InMemoryAuctionStore::new());
        let bids = Arc::new(InMemoryBidStore::new());
        let users = Arc::new(StaticUserDirectory::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let webhooks = Arc::new(RecordingWebhooks::default());

        let auction_store: Arc<dyn AuctionStore> = auctions.clone();
        let bid_store: Arc<dyn BidStore> = bids.clone();
        let user_dir: Arc<dyn UserDirectory> = users.clone();
        let notify: Arc<dyn NotificationDispatcher> = notifier.clone();
        let hooks: Arc<dyn WebhookDispatcher> = webhooks.clone();
        let realtime: Arc<dyn RealtimeBroadcaster> = Arc::new(ChannelBroadcaster::default());
        let cache: Arc<dyn CacheInvalidator> = Arc::new(NoopCacheInvalidator);

        let closing = Arc::new(ClosingService::new(
            auction_store.clone(),
            bid_store.clone(),
            notify.clone(),
            realtime.clone(),
            cache.clone(),
            hooks.clone(),
        ));
        let closer: Arc<dyn AuctionCloser> = closing.clone();

        let scheduler = Arc::new(ExpirationScheduler::new(
            closer.clone(),
            auction_store.clone(),
        ));

        let bidding = Arc::new(BiddingService::new(
            auction_store.clone(),
            bid_store.clone(),
            user_dir.clone(),
            notify,
            realtime,
            cache,
            hooks,
            closer,
        ));

        let lifecycle = Arc::new(AuctionService::new(
            auction_store,
            user_dir,
            scheduler.clone(),
        ));

        Self {
            auctions,
            bids,
            users,
            notifier,
            webhooks,
            bidding,
            closing,
            scheduler,
            lifecycle,
        }
    }

    pub async fn auction(&self, id: Uuid) -> Auction {
        self.auctions
            .find_by_id(id)
            .await
            .expect("store read failed")
            .expect("auction not found")
    }

    pub async fn bid(&self, id: Uuid) -> Bid {
        self.bids
            .find_by_id(id)
            .await
            .expect("store read failed")
            .expect("bid not found")
    }
}

/// Whole-number Decimal
pub fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

pub fn hours_ago(h: i64) -> NaiveDateTime {
    (Utc::now() - Duration::hours(h)).naive_utc()
}

pub fn hours_from_now(h: i64) -> NaiveDateTime {
    (Utc::now() + Duration::hours(h)).naive_utc()
}

pub fn millis_from_now(ms: i64) -> NaiveDateTime {
    (Utc::now() + Duration::milliseconds(ms)).naive_utc()
}

/// Insert an active auction that started an hour ago and runs another hour
pub async fn insert_active_auction(
    harness: &Harness,
    seller_id: Uuid,
    starting_price: Decimal,
    reserve_price: Option<Decimal>,
    buy_now_price: Option<Decimal>,
) -> Auction {
    insert_auction_with_times(
        harness,
        seller_id,
        starting_price,
        reserve_price,
        buy_now_price,
        hours_ago(1),
        hours_from_now(1),
        AuctionStatus::Active,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_auction_with_times(
    harness: &Harness,
    seller_id: Uuid,
    starting_price: Decimal,
    reserve_price: Option<Decimal>,
    buy_now_price: Option<Decimal>,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    status: AuctionStatus,
) -> Auction {
    let auction = Auction::new(
        seller_id,
        "Vintage synthesizer".to_string(),
        Some("One careful owner".to_string()),
        starting_price,
        reserve_price,
        buy_now_price,
        start_time,
        end_time,
        status,
    );
    harness
        .auctions
        .insert(&auction)
        .await
        .expect("failed to insert auction fixture")
}
