//! Data-access layer for auctions and bids.
//!
//! The stores are trait-shaped so the services can run against Postgres in
//! production and against the in-memory implementation in tests. Both
//! implementations provide the same conditional-update semantics: a version
//! compare-and-swap for bid acceptance and a single-winner `active -> closed`
//! flip for closure.

pub mod auction_repository;
pub mod bid_repository;
pub mod memory;

use crate::error::RepositoryError;
use crate::models::{Auction, AuctionStatus, Bid, BidStatus};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

pub use auction_repository::AuctionRepository;
pub use bid_repository::BidRepository;
pub use memory::{InMemoryAuctionStore, InMemoryBidStore};

/// Result type alias for store operations
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Durable record of an auction's identity, pricing, timing and lifecycle.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn insert(&self, auction: &Auction) -> RepoResult<Auction>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Auction>>;

    /// Update the editable fields of an uncontested auction. Returns `None`
    /// when the auction is missing or already has bids.
    async fn update_details(&self, auction: &Auction) -> RepoResult<Option<Auction>>;

    /// Conditional status transition. Returns `None` when the auction is
    /// missing or no longer in `from`. Invalid transitions are rejected.
    async fn update_status(
        &self,
        id: Uuid,
        from: AuctionStatus,
        to: AuctionStatus,
    ) -> RepoResult<Option<Auction>>;

    /// Atomically promote a bid to highest: sets `current_price` and
    /// `highest_bid_id`, increments `total_bids`, bumps `version`. Succeeds
    /// only if the stored version still equals `expected_version` and the
    /// auction is active; returns `None` on a lost race.
    async fn commit_bid_acceptance(
        &self,
        id: Uuid,
        expected_version: i64,
        new_price: Decimal,
        highest_bid_id: Uuid,
    ) -> RepoResult<Option<Auction>>;

    /// Conditional `active -> closed` flip; the closure linearization point.
    /// Exactly one caller observes `Some` for a given auction.
    async fn try_close(&self, id: Uuid) -> RepoResult<Option<Auction>>;

    async fn set_winner(&self, id: Uuid, winner_id: Uuid) -> RepoResult<()>;

    /// Active auctions whose end time has passed (sweep input)
    async fn find_expired_active(&self, now: NaiveDateTime) -> RepoResult<Vec<Auction>>;

    /// All currently active auctions (trigger re-arming at startup)
    async fn find_active(&self) -> RepoResult<Vec<Auction>>;

    /// Delete an uncontested auction. Returns `false` when the guard fails.
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;
}

/// Append-mostly ledger of bids per auction.
#[async_trait]
pub trait BidStore: Send + Sync {
    async fn insert(&self, bid: &Bid) -> RepoResult<Bid>;

    /// Remove a bid. Only used to roll back an insert whose auction-side
    /// commit lost its version race; bids are never deleted in normal flow.
    async fn remove(&self, id: Uuid) -> RepoResult<bool>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Bid>>;

    /// All bids for an auction, highest amount first
    async fn find_by_auction(&self, auction_id: Uuid) -> RepoResult<Vec<Bid>>;

    /// The current leading (`active`) bid, if any
    async fn find_leader(&self, auction_id: Uuid) -> RepoResult<Option<Bid>>;

    /// Single-bid status transition, validated against the transition table
    async fn update_status(&self, id: Uuid, to: BidStatus) -> RepoResult<Bid>;

    /// Demote every other `active` bid on the auction to `outbid`
    async fn mark_outbid_except(&self, auction_id: Uuid, keep: Uuid) -> RepoResult<u64>;

    /// Resolve bid statuses at close: the winning bid (if any) becomes
    /// `won`, every other unresolved bid becomes `lost`.
    async fn resolve_closed(
        &self,
        auction_id: Uuid,
        winning_bid_id: Option<Uuid>,
    ) -> RepoResult<u64>;

    /// Distinct bidder ids for an auction (closure notifications)
    async fn distinct_bidders(&self, auction_id: Uuid) -> RepoResult<Vec<Uuid>>;

    async fn count_by_auction(&self, auction_id: Uuid) -> RepoResult<i64>;
}
