use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Auction lifecycle status.
///
/// Transitions: `draft -> active -> {closed, cancelled}` and
/// `draft -> cancelled`. `closed` and `cancelled` are terminal; once there
/// an auction is immutable except for winner/audit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Draft,
    Active,
    Closed,
    Cancelled,
}

impl AuctionStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(AuctionStatus::Draft),
            "active" => Ok(AuctionStatus::Active),
            "closed" => Ok(AuctionStatus::Closed),
            "cancelled" => Ok(AuctionStatus::Cancelled),
            _ => Err(format!("Invalid auction status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Draft => "draft",
            AuctionStatus::Active => "active",
            AuctionStatus::Closed => "closed",
            AuctionStatus::Cancelled => "cancelled",
        }
    }

    /// Transition table for the auction state machine
    pub fn can_transition_to(&self, next: AuctionStatus) -> bool {
        matches!(
            (self, next),
            (AuctionStatus::Draft, AuctionStatus::Active)
                | (AuctionStatus::Draft, AuctionStatus::Cancelled)
                | (AuctionStatus::Active, AuctionStatus::Closed)
                | (AuctionStatus::Active, AuctionStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Closed | AuctionStatus::Cancelled)
    }
}

impl From<AuctionStatus> for String {
    fn from(status: AuctionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Auction model.
///
/// `current_price` starts at `starting_price` and is non-decreasing while
/// the auction is active; `version` is the optimistic-concurrency counter
/// bumped by every conditional update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub starting_price: Decimal,
    pub current_price: Decimal,
    pub reserve_price: Option<Decimal>,
    pub buy_now_price: Option<Decimal>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: AuctionStatus,
    pub total_bids: i64,
    pub highest_bid_id: Option<Uuid>,
    pub winner_id: Option<Uuid>,
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Auction {
    /// Create a new Auction in the given initial status
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seller_id: Uuid,
        title: String,
        description: Option<String>,
        starting_price: Decimal,
        reserve_price: Option<Decimal>,
        buy_now_price: Option<Decimal>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        status: AuctionStatus,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            seller_id,
            title,
            description,
            starting_price,
            current_price: starting_price,
            reserve_price,
            buy_now_price,
            start_time,
            end_time,
            status,
            total_bids: 0,
            highest_bid_id: None,
            winner_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate pricing and timing constraints
    pub fn validate(&self) -> Result<(), String> {
        if self.starting_price < Decimal::ZERO {
            return Err("Starting price must not be negative".to_string());
        }
        if let Some(reserve) = self.reserve_price {
            if reserve < self.starting_price {
                return Err("Reserve price must be at least the starting price".to_string());
            }
        }
        if let Some(buy_now) = self.buy_now_price {
            if buy_now <= self.starting_price {
                return Err("Buy-now price must exceed the starting price".to_string());
            }
            if let Some(reserve) = self.reserve_price {
                if buy_now < reserve {
                    return Err("Buy-now price must not be below the reserve price".to_string());
                }
            }
        }
        if self.start_time >= self.end_time {
            return Err("Start time must be before end time".to_string());
        }
        Ok(())
    }

    /// Auction duration in whole hours, rounded up
    pub fn duration_hours(&self) -> i64 {
        let secs = (self.end_time - self.start_time).num_seconds();
        (secs + 3599) / 3600
    }

    /// Check if the auction is accepting bids
    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    pub fn has_started(&self, now: NaiveDateTime) -> bool {
        now >= self.start_time
    }

    pub fn has_ended(&self, now: NaiveDateTime) -> bool {
        now >= self.end_time
    }

    /// Whether the record may still be modified or deleted
    pub fn is_mutable(&self) -> bool {
        self.total_bids == 0 && !self.status.is_terminal()
    }
}
