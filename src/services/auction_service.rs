use crate::collaborators::UserDirectory;
use crate::error::{AppError, AppResult};
use crate::models::{Auction, AuctionStatus};
use crate::repositories::AuctionStore;
use crate::services::ExpirationScheduler;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Parameters for creating an auction
#[derive(Debug, Clone)]
pub struct CreateAuction {
    pub seller_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub starting_price: Decimal,
    pub reserve_price: Option<Decimal>,
    pub buy_now_price: Option<Decimal>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Create directly in `active` (arms the expiration trigger) or in `draft`
    pub publish: bool,
}

/// Editable fields of an uncontested auction
#[derive(Debug, Clone, Default)]
pub struct AuctionUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starting_price: Option<Decimal>,
    pub reserve_price: Option<Option<Decimal>>,
    pub buy_now_price: Option<Option<Decimal>>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

/// Auction lifecycle service: creation, activation, edits, cancellation and
/// deletion. Edits are only allowed while the auction is uncontested
/// (`total_bids == 0`) and not in a terminal status.
pub struct AuctionService {
    auction_store: Arc<dyn AuctionStore>,
    users: Arc<dyn UserDirectory>,
    scheduler: Arc<ExpirationScheduler>,
}

impl AuctionService {
    pub fn new(
        auction_store: Arc<dyn AuctionStore>,
        users: Arc<dyn UserDirectory>,
        scheduler: Arc<ExpirationScheduler>,
    ) -> Self {
        Self {
            auction_store,
            users,
            scheduler,
        }
    }

    pub async fn get_auction(&self, id: Uuid) -> AppResult<Auction> {
        self.auction_store
            .find_by_id(id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("Auction {} not found", id)))
    }

    /// Create an auction. Publishing arms the expiration trigger; a past
    /// end time closes the auction synchronously through the scheduler.
    pub async fn create_auction(&self, params: CreateAuction) -> AppResult<Auction> {
        self.users
            .get_user(params.seller_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Seller {} not found", params.seller_id)))?;

        let status = if params.publish {
            AuctionStatus::Active
        } else {
            AuctionStatus::Draft
        };
        let auction = Auction::new(
            params.seller_id,
            params.title,
            params.description,
            params.starting_price,
            params.reserve_price,
            params.buy_now_price,
            params.start_time,
            params.end_time,
            status,
        );
        auction.validate().map_err(AppError::Validation)?;

        let auction = self.auction_store.insert(&auction).await?;
        info!(
            "Auction {} created by seller {} ({})",
            auction.id,
            auction.seller_id,
            auction.status.as_str()
        );

        if auction.is_active() {
            self.scheduler
                .schedule_expiration(auction.id, auction.end_time)
                .await?;
        }

        Ok(auction)
    }

    /// Transition a draft auction to active and arm its expiration trigger
    pub async fn activate_auction(&self, id: Uuid) -> AppResult<Auction> {
        let auction = self.get_auction(id).await?;

        let activated = self
            .auction_store
            .update_status(id, AuctionStatus::Draft, AuctionStatus::Active)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| {
                AppError::InvalidState(format!(
                    "Auction {} cannot be activated from {}",
                    id,
                    auction.status.as_str()
                ))
            })?;

        info!("Auction {} activated", id);
        self.scheduler
            .schedule_expiration(activated.id, activated.end_time)
            .await?;

        Ok(activated)
    }

    /// Edit an uncontested auction. Re-arms the expiration trigger when the
    /// end time changes on an active auction.
    pub async fn update_auction(&self, id: Uuid, update: AuctionUpdate) -> AppResult<Auction> {
        let mut auction = self.get_auction(id).await?;

        if !auction.is_mutable() {
            return Err(AppError::InvalidState(format!(
                "Auction {} cannot be modified: {}",
                id,
                if auction.total_bids > 0 {
                    "bids have been placed"
                } else {
                    "auction is finished"
                }
            )));
        }

        let end_time_changed = update
            .end_time
            .map(|t| t != auction.end_time)
            .unwrap_or(false);

        if let Some(title) = update.title {
            auction.title = title;
        }
        if let Some(description) = update.description {
            auction.description = Some(description);
        }
        if let Some(starting_price) = update.starting_price {
            auction.starting_price = starting_price;
            // no bids yet, so the current price still tracks the floor
            auction.current_price = starting_price;
        }
        if let Some(reserve_price) = update.reserve_price {
            auction.reserve_price = reserve_price;
        }
        if let Some(buy_now_price) = update.buy_now_price {
            auction.buy_now_price = buy_now_price;
        }
        if let Some(start_time) = update.start_time {
            auction.start_time = start_time;
        }
        if let Some(end_time) = update.end_time {
            auction.end_time = end_time;
        }
        auction.validate().map_err(AppError::Validation)?;

        let updated = self
            .auction_store
            .update_details(&auction)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| {
                AppError::InvalidState(format!(
                    "Auction {} cannot be modified: bids have been placed",
                    id
                ))
            })?;

        if updated.is_active() && end_time_changed {
            self.scheduler
                .schedule_expiration(updated.id, updated.end_time)
                .await?;
        }

        Ok(updated)
    }

    /// Cancel an uncontested auction and drop its pending trigger
    pub async fn cancel_auction(&self, id: Uuid) -> AppResult<Auction> {
        let auction = self.get_auction(id).await?;

        if auction.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Auction {} is already {}",
                id,
                auction.status.as_str()
            )));
        }
        if auction.total_bids > 0 {
            return Err(AppError::InvalidState(format!(
                "Auction {} cannot be cancelled: bids have been placed",
                id
            )));
        }

        let cancelled = self
            .auction_store
            .update_status(id, auction.status, AuctionStatus::Cancelled)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| {
                AppError::InvalidState(format!(
                    "Auction {} cannot be cancelled from {}",
                    id,
                    auction.status.as_str()
                ))
            })?;

        self.scheduler.cancel_expiration(id).await;
        info!("Auction {} cancelled", id);

        Ok(cancelled)
    }

    /// Delete an uncontested, non-closed auction
    pub async fn delete_auction(&self, id: Uuid) -> AppResult<()> {
        let auction = self.get_auction(id).await?;

        if auction.status == AuctionStatus::Closed {
            return Err(AppError::InvalidState(format!(
                "Auction {} is closed and cannot be deleted",
                id
            )));
        }
        if auction.total_bids > 0 {
            return Err(AppError::InvalidState(format!(
                "Auction {} cannot be deleted: bids have been placed",
                id
            )));
        }

        if !self.auction_store.delete(id).await? {
            return Err(AppError::Conflict(format!(
                "Auction {} received bids while being deleted",
                id
            )));
        }

        self.scheduler.cancel_expiration(id).await;
        info!("Auction {} deleted", id);

        Ok(())
    }
}
