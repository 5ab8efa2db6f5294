use crate::error::RepositoryError;
use crate::models::{Bid, BidStatus};
use crate::repositories::{BidStore, RepoResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

const BID_COLUMNS: &str = "id, auction_id, bidder_id, amount, status, placed_at, metadata";

/// Raw bid row; status is stored as TEXT and converted on the way out
#[derive(FromRow)]
struct BidRow {
    id: Uuid,
    auction_id: Uuid,
    bidder_id: Uuid,
    amount: Decimal,
    status: String,
    placed_at: NaiveDateTime,
    metadata: Option<serde_json::Value>,
}

impl TryFrom<BidRow> for Bid {
    type Error = RepositoryError;

    fn try_from(row: BidRow) -> Result<Self, Self::Error> {
        let status = BidStatus::from_str(&row.status).map_err(RepositoryError::InvalidInput)?;
        Ok(Bid {
            id: row.id,
            auction_id: row.auction_id,
            bidder_id: row.bidder_id,
            amount: row.amount,
            status,
            placed_at: row.placed_at,
            metadata: row.metadata,
        })
    }
}

/// Postgres-backed bid store
pub struct BidRepository {
    pool: PgPool,
}

impl BidRepository {
    /// Create a new BidRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BidStore for BidRepository {
    async fn insert(&self, bid: &Bid) -> RepoResult<Bid> {
        let sql = format!(
            "INSERT INTO bids ({BID_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {BID_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(bid.id)
            .bind(bid.auction_id)
            .bind(bid.bidder_id)
            .bind(bid.amount)
            .bind(bid.status.as_str())
            .bind(bid.placed_at)
            .bind(&bid.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.try_into()
    }

    async fn remove(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM bids WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Bid>> {
        let sql = format!("SELECT {BID_COLUMNS} FROM bids WHERE id = $1");
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.map(Bid::try_from).transpose()
    }

    async fn find_by_auction(&self, auction_id: Uuid) -> RepoResult<Vec<Bid>> {
        let sql = format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE auction_id = $1 \
             ORDER BY amount DESC, placed_at ASC"
        );
        let rows = sqlx::query_as::<_, BidRow>(&sql)
            .bind(auction_id)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        rows.into_iter().map(Bid::try_from).collect()
    }

    async fn find_leader(&self, auction_id: Uuid) -> RepoResult<Option<Bid>> {
        let sql = format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE auction_id = $1 AND status = 'active' \
             ORDER BY amount DESC, placed_at ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.map(Bid::try_from).transpose()
    }

    async fn update_status(&self, id: Uuid, to: BidStatus) -> RepoResult<Bid> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Bid {} not found", id)))?;
        if !current.status.can_transition_to(to) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Illegal bid transition {} -> {}",
                current.status.as_str(),
                to.as_str()
            )));
        }
        let sql = format!(
            "UPDATE bids SET status = $2 WHERE id = $1 AND status = $3 RETURNING {BID_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(id)
            .bind(to.as_str())
            .bind(current.status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?
            .ok_or_else(|| {
                RepositoryError::Conflict(format!("Bid {} changed status concurrently", id))
            })?;
        row.try_into()
    }

    async fn mark_outbid_except(&self, auction_id: Uuid, keep: Uuid) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE bids SET status = 'outbid' \
             WHERE auction_id = $1 AND id <> $2 AND status = 'active'",
        )
        .bind(auction_id)
        .bind(keep)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(result.rows_affected())
    }

    async fn resolve_closed(
        &self,
        auction_id: Uuid,
        winning_bid_id: Option<Uuid>,
    ) -> RepoResult<u64> {
        let mut affected = 0u64;
        if let Some(winner) = winning_bid_id {
            let result = sqlx::query(
                "UPDATE bids SET status = 'won' \
                 WHERE id = $1 AND auction_id = $2 AND status IN ('active', 'outbid')",
            )
            .bind(winner)
            .bind(auction_id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            affected += result.rows_affected();

            let result = sqlx::query(
                "UPDATE bids SET status = 'lost' \
                 WHERE auction_id = $1 AND id <> $2 AND status IN ('active', 'outbid')",
            )
            .bind(auction_id)
            .bind(winner)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            affected += result.rows_affected();
        } else {
            let result = sqlx::query(
                "UPDATE bids SET status = 'lost' \
                 WHERE auction_id = $1 AND status IN ('active', 'outbid')",
            )
            .bind(auction_id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    async fn distinct_bidders(&self, auction_id: Uuid) -> RepoResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT DISTINCT bidder_id FROM bids WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("bidder_id").map_err(RepositoryError::from))
            .collect()
    }

    async fn count_by_auction(&self, auction_id: Uuid) -> RepoResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM bids WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        row.try_get::<i64, _>("count").map_err(RepositoryError::from)
    }
}
