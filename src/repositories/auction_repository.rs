use crate::error::RepositoryError;
use crate::models::{Auction, AuctionStatus};
use crate::repositories::{AuctionStore, RepoResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const AUCTION_COLUMNS: &str = "id, seller_id, title, description, starting_price, current_price, \
     reserve_price, buy_now_price, start_time, end_time, status, total_bids, \
     highest_bid_id, winner_id, version, created_at, updated_at";

/// Raw auction row; status is stored as TEXT and converted on the way out
#[derive(FromRow)]
struct AuctionRow {
    id: Uuid,
    seller_id: Uuid,
    title: String,
    description: Option<String>,
    starting_price: Decimal,
    current_price: Decimal,
    reserve_price: Option<Decimal>,
    buy_now_price: Option<Decimal>,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    status: String,
    total_bids: i64,
    highest_bid_id: Option<Uuid>,
    winner_id: Option<Uuid>,
    version: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = RepositoryError;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        let status =
            AuctionStatus::from_str(&row.status).map_err(RepositoryError::InvalidInput)?;
        Ok(Auction {
            id: row.id,
            seller_id: row.seller_id,
            title: row.title,
            description: row.description,
            starting_price: row.starting_price,
            current_price: row.current_price,
            reserve_price: row.reserve_price,
            buy_now_price: row.buy_now_price,
            start_time: row.start_time,
            end_time: row.end_time,
            status,
            total_bids: row.total_bids,
            highest_bid_id: row.highest_bid_id,
            winner_id: row.winner_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed auction store
pub struct AuctionRepository {
    pool: PgPool,
}

impl AuctionRepository {
    /// Create a new AuctionRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuctionStore for AuctionRepository {
    async fn insert(&self, auction: &Auction) -> RepoResult<Auction> {
        let sql = format!(
            "INSERT INTO auctions ({AUCTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             RETURNING {AUCTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuctionRow>(&sql)
            .bind(auction.id)
            .bind(auction.seller_id)
            .bind(&auction.title)
            .bind(&auction.description)
            .bind(auction.starting_price)
            .bind(auction.current_price)
            .bind(auction.reserve_price)
            .bind(auction.buy_now_price)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .bind(auction.status.as_str())
            .bind(auction.total_bids)
            .bind(auction.highest_bid_id)
            .bind(auction.winner_id)
            .bind(auction.version)
            .bind(auction.created_at)
            .bind(auction.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Auction>> {
        let sql = format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1");
        let row = sqlx::query_as::<_, AuctionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.map(Auction::try_from).transpose()
    }

    async fn update_details(&self, auction: &Auction) -> RepoResult<Option<Auction>> {
        let sql = format!(
            "UPDATE auctions SET title = $2, description = $3, starting_price = $4, \
             current_price = $5, reserve_price = $6, buy_now_price = $7, start_time = $8, \
             end_time = $9, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND total_bids = 0 \
             RETURNING {AUCTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuctionRow>(&sql)
            .bind(auction.id)
            .bind(&auction.title)
            .bind(&auction.description)
            .bind(auction.starting_price)
            .bind(auction.current_price)
            .bind(auction.reserve_price)
            .bind(auction.buy_now_price)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.map(Auction::try_from).transpose()
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
        let sql = format!(
            "UPDATE auctions SET status = $3, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING {AUCTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuctionRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.map(Auction::try_from).transpose()
    }

    async fn commit_bid_acceptance(
        &self,
        id: Uuid,
        expected_version: i64,
        new_price: Decimal,
        highest_bid_id: Uuid,
    ) -> RepoResult<Option<Auction>> {
        let sql = format!(
            "UPDATE auctions SET current_price = $3, highest_bid_id = $4, \
             total_bids = total_bids + 1, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 AND status = 'active' \
             RETURNING {AUCTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuctionRow>(&sql)
            .bind(id)
            .bind(expected_version)
            .bind(new_price)
            .bind(highest_bid_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.map(Auction::try_from).transpose()
    }

    async fn try_close(&self, id: Uuid) -> RepoResult<Option<Auction>> {
        let sql = format!(
            "UPDATE auctions SET status = 'closed', version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND status = 'active' \
             RETURNING {AUCTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuctionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.map(Auction::try_from).transpose()
    }

    async fn set_winner(&self, id: Uuid, winner_id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE auctions SET winner_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(winner_id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn find_expired_active(&self, now: NaiveDateTime) -> RepoResult<Vec<Auction>> {
        let sql = format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions \
             WHERE status = 'active' AND end_time <= $1 \
             ORDER BY end_time ASC"
        );
        let rows = sqlx::query_as::<_, AuctionRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        rows.into_iter().map(Auction::try_from).collect()
    }

    async fn find_active(&self) -> RepoResult<Vec<Auction>> {
        let sql = format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE status = 'active' ORDER BY end_time ASC"
        );
        let rows = sqlx::query_as::<_, AuctionRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        rows.into_iter().map(Auction::try_from).collect()
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM auctions WHERE id = $1 AND total_bids = 0")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
