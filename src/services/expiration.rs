use crate::error::AppResult;
use crate::repositories::AuctionStore;
use crate::services::closing_service::AuctionCloser;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Expiration Scheduler.
///
/// Holds at most one pending trigger per auction id. A trigger fires the
/// injected closer at the auction's end time; a past end time fires it
/// synchronously. A fired trigger removes its own map entry; each entry
/// carries a generation token so that cleanup can never evict a trigger a
/// concurrent reschedule just armed. Stale firings are harmless because
/// closing is idempotent, so cancellation only needs to be best-effort.
pub struct ExpirationScheduler {
    closer: Arc<dyn AuctionCloser>,
    auction_store: Arc<dyn AuctionStore>,
    pending: Arc<Mutex<HashMap<Uuid, (u64, JoinHandle<()>)>>>,
    next_token: AtomicU64,
    sweep_interval: Duration,
}

impl ExpirationScheduler {
    pub fn new(closer: Arc<dyn AuctionCloser>, auction_store: Arc<dyn AuctionStore>) -> Self {
        Self {
            closer,
            auction_store,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(0),
            sweep_interval: Duration::from_secs(120),
        }
    }

    /// Set the sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Arm (or re-arm) the expiration trigger for an auction. Any prior
    /// pending trigger for the same id is aborted first.
    pub async fn schedule_expiration(
        &self,
        auction_id: Uuid,
        end_time: NaiveDateTime,
    ) -> AppResult<()> {
        let now = chrono::Utc::now().naive_utc();
        if end_time <= now {
            self.cancel_expiration(auction_id).await;
            info!("Auction {} end time already passed, closing now", auction_id);
            self.closer.close_expired_auction(auction_id).await?;
            return Ok(());
        }

        let delay = (end_time - now).to_std().unwrap_or(Duration::ZERO);
        debug!(
            "Expiration trigger armed for auction {} in {:?}",
            auction_id, delay
        );

        // Swap the trigger under the map lock: a concurrent reschedule can
        // never leave two timers armed, and the new task's own cleanup
        // cannot run before its handle is stored.
        let mut pending = self.pending.lock().await;
        if let Some((_, old)) = pending.remove(&auction_id) {
            old.abort();
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let closer = self.closer.clone();
        let triggers = self.pending.clone();
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            if let Err(e) = closer.close_expired_auction(auction_id).await {
                error!("Scheduled close of auction {} failed: {}", auction_id, e);
            }
            // Fired: drop our own entry unless a reschedule replaced it
            let mut pending = triggers.lock().await;
            if pending.get(&auction_id).map(|(t, _)| *t) == Some(token) {
                pending.remove(&auction_id);
            }
        });
        pending.insert(auction_id, (token, handle));
        Ok(())
    }

    /// Best-effort cancellation of the pending trigger for an auction
    pub async fn cancel_expiration(&self, auction_id: Uuid) {
        if let Some((_, handle)) = self.pending.lock().await.remove(&auction_id) {
            handle.abort();
            debug!("Cancelled pending expiration trigger for auction {}", auction_id);
        }
    }

    /// Number of triggers still waiting to fire
    pub async fn pending_triggers(&self) -> usize {
        self.pending
            .lock()
            .await
            .values()
            .filter(|(_, h)| !h.is_finished())
            .count()
    }

    /// Re-arm triggers for every active auction. Run at startup: in-memory
    /// timers do not survive a process restart.
    pub async fn rearm_active_auctions(&self) -> AppResult<usize> {
        let active = self.auction_store.find_active().await?;
        let count = active.len();
        for auction in active {
            self.schedule_expiration(auction.id, auction.end_time).await?;
        }
        Ok(count)
    }

    /// Run the periodic sweep that rescues auctions whose individual
    /// trigger was missed or lost.
    pub async fn start_sweep(self: Arc<Self>) {
        let mut interval = time::interval(self.sweep_interval);
        info!(
            "Expiration sweep started, scanning every {:?}",
            self.sweep_interval
        );

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("Expiration sweep error: {}", e);
            }
        }
    }

    /// Single sweep pass: close every active auction already past its end
    /// time. Returns the number of auctions picked up.
    pub async fn sweep_once(&self) -> AppResult<usize> {
        let now = chrono::Utc::now().naive_utc();
        let expired = self.auction_store.find_expired_active(now).await?;
        let count = expired.len();

        if count > 0 {
            info!("Sweep found {} expired active auctions", count);
        }

        for auction in expired {
            if let Err(e) = self.closer.close_expired_auction(auction.id).await {
                error!("Sweep close of auction {} failed: {}", auction.id, e);
            }
            // Drop whatever stale trigger might still be pending
            self.cancel_expiration(auction.id).await;
        }

        Ok(count)
    }
}
