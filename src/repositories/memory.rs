//! In-memory store implementations.
//!
//! Back the test harness and local runs without Postgres. The conditional
//! updates mirror the SQL implementations exactly: version CAS for bid
//! acceptance, single-winner status flips for closure.

use crate::error::RepositoryError;
use crate::models::{Auction, AuctionStatus, Bid, BidStatus};
use crate::repositories::{AuctionStore, BidStore, RepoResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory auction store keyed by auction id
#[derive(Default)]
pub struct InMemoryAuctionStore {
    auctions: RwLock<HashMap<Uuid, Auction>>,
}

impl InMemoryAuctionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuctionStore for InMemoryAuctionStore {
    async fn insert(&self, auction: &Auction) -> RepoResult<Auction> {
        let mut auctions = self.auctions.write().await;
        if auctions.contains_key(&auction.id) {
            return Err(RepositoryError::Duplicate(format!("auction {}", auction.id)));
        }
        auctions.insert(auction.id, auction.clone());
        Ok(auction.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Auction>> {
        Ok(self.auctions.read().await.get(&id).cloned())
    }

    async fn update_details(&self, auction: &Auction) -> RepoResult<Option<Auction>> {
        let mut auctions = self.auctions.write().await;
        match auctions.get_mut(&auction.id) {
            Some(stored) if stored.total_bids == 0 => {
                stored.title = auction.title.clone();
                stored.description = auction.description.clone();
                stored.starting_price = auction.starting_price;
                stored.current_price = auction.current_price;
                stored.reserve_price = auction.reserve_price;
                stored.buy_now_price = auction.buy_now_price;
                stored.start_time = auction.start_time;
                stored.end_time = auction.end_time;
                stored.version += 1;
                stored.updated_at = chrono::Utc::now().naive_utc();
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: AuctionStatus,
        to: AuctionStatus,
    ) -> RepoResult<Option<Auction>> {
        if !from.can_transition_to(to) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Illegal auction transition {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }
        let mut auctions = self.auctions.write().await;
        match auctions.get_mut(&id) {
            Some(stored) if stored.status == from => {
                stored.status = to;
                stored.version += 1;
                stored.updated_at = chrono::Utc::now().naive_utc();
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn commit_bid_acceptance(
        &self,
        id: Uuid,
        expected_version: i64,
        new_price: Decimal,
        highest_bid_id: Uuid,
    ) -> RepoResult<Option<Auction>> {
        let mut auctions = self.auctions.write().await;
        match auctions.get_mut(&id) {
            Some(stored)
                if stored.version == expected_version
                    && stored.status == AuctionStatus::Active =>
            {
                stored.current_price = new_price;
                stored.highest_bid_id = Some(highest_bid_id);
                stored.total_bids += 1;
                stored.version += 1;
                stored.updated_at = chrono::Utc::now().naive_utc();
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn try_close(&self, id: Uuid) -> RepoResult<Option<Auction>> {
        let mut auctions = self.auctions.write().await;
        match auctions.get_mut(&id) {
            Some(stored) if stored.status == AuctionStatus::Active => {
                stored.status = AuctionStatus::Closed;
                stored.version += 1;
                stored.updated_at = chrono::Utc::now().naive_utc();
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_winner(&self, id: Uuid, winner_id: Uuid) -> RepoResult<()> {
        let mut auctions = self.auctions.write().await;
        if let Some(stored) = auctions.get_mut(&id) {
            stored.winner_id = Some(winner_id);
            stored.updated_at = chrono::Utc::now().naive_utc();
        }
        Ok(())
    }

    async fn find_expired_active(&self, now: NaiveDateTime) -> RepoResult<Vec<Auction>> {
        let auctions = self.auctions.read().await;
        let mut expired: Vec<Auction> = auctions
            .values()
            .filter(|a| a.status == AuctionStatus::Active && a.end_time <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|a| a.end_time);
        Ok(expired)
    }

    async fn find_active(&self) -> RepoResult<Vec<Auction>> {
        let auctions = self.auctions.read().await;
        let mut active: Vec<Auction> = auctions
            .values()
            .filter(|a| a.status == AuctionStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|a| a.end_time);
        Ok(active)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut auctions = self.auctions.write().await;
        match auctions.get(&id) {
            Some(stored) if stored.total_bids == 0 => {
                auctions.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory bid ledger keyed by bid id
#[derive(Default)]
pub struct InMemoryBidStore {
    bids: RwLock<HashMap<Uuid, Bid>>,
}

impl InMemoryBidStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn higher(a: &Bid, b: &Bid) -> std::cmp::Ordering {
    // Amount first; earlier placement wins a tie (ties cannot occur through
    // the acceptance path, which requires strictly greater amounts).
    a.amount.cmp(&b.amount).then(b.placed_at.cmp(&a.placed_at))
}

#[async_trait]
impl BidStore for InMemoryBidStore {
    async fn insert(&self, bid: &Bid) -> RepoResult<Bid> {
        let mut bids = self.bids.write().await;
        if bids.contains_key(&bid.id) {
            return Err(RepositoryError::Duplicate(format!("bid {}", bid.id)));
        }
        bids.insert(bid.id, bid.clone());
        Ok(bid.clone())
    }

    async fn remove(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.bids.write().await.remove(&id).is_some())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Bid>> {
        Ok(self.bids.read().await.get(&id).cloned())
    }

    async fn find_by_auction(&self, auction_id: Uuid) -> RepoResult<Vec<Bid>> {
        let bids = self.bids.read().await;
        let mut result: Vec<Bid> = bids
            .values()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| higher(b, a));
        Ok(result)
    }

    async fn find_leader(&self, auction_id: Uuid) -> RepoResult<Option<Bid>> {
        let bids = self.bids.read().await;
        Ok(bids
            .values()
            .filter(|b| b.auction_id == auction_id && b.status == BidStatus::Active)
            .max_by(|a, b| higher(a, b))
            .cloned())
    }

    async fn update_status(&self, id: Uuid, to: BidStatus) -> RepoResult<Bid> {
        let mut bids = self.bids.write().await;
        let stored = bids
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Bid {} not found", id)))?;
        if !stored.status.can_transition_to(to) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Illegal bid transition {} -> {}",
                stored.status.as_str(),
                to.as_str()
            )));
        }
        stored.status = to;
        Ok(stored.clone())
    }

    async fn mark_outbid_except(&self, auction_id: Uuid, keep: Uuid) -> RepoResult<u64> {
        let mut bids = self.bids.write().await;
        let mut affected = 0u64;
        for bid in bids.values_mut() {
            if bid.auction_id == auction_id && bid.id != keep && bid.status == BidStatus::Active {
                bid.status = BidStatus::Outbid;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn resolve_closed(
        &self,
        auction_id: Uuid,
        winning_bid_id: Option<Uuid>,
    ) -> RepoResult<u64> {
        let mut bids = self.bids.write().await;
        let mut affected = 0u64;
        for bid in bids.values_mut() {
            if bid.auction_id != auction_id || bid.status.is_terminal() {
                continue;
            }
            bid.status = if winning_bid_id == Some(bid.id) {
                BidStatus::Won
            } else {
                BidStatus::Lost
            };
            affected += 1;
        }
        Ok(affected)
    }

    async fn distinct_bidders(&self, auction_id: Uuid) -> RepoResult<Vec<Uuid>> {
        let bids = self.bids.read().await;
        let mut bidders: Vec<Uuid> = bids
            .values()
            .filter(|b| b.auction_id == auction_id)
            .map(|b| b.bidder_id)
            .collect();
        bidders.sort();
        bidders.dedup();
        Ok(bidders)
    }

    async fn count_by_auction(&self, auction_id: Uuid) -> RepoResult<i64> {
        let bids = self.bids.read().await;
        Ok(bids.values().filter(|b| b.auction_id == auction_id).count() as i64)
    }
}
