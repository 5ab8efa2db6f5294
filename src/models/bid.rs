use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Bid lifecycle status.
///
/// A bid is created `active` (the current leader), demoted to `outbid` when
/// a higher bid lands, and resolved to `won` or `lost` at close. `won` and
/// `lost` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Active,
    Outbid,
    Won,
    Lost,
}

impl BidStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "active" => Ok(BidStatus::Active),
            "outbid" => Ok(BidStatus::Outbid),
            "won" => Ok(BidStatus::Won),
            "lost" => Ok(BidStatus::Lost),
            _ => Err(format!("Invalid bid status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Active => "active",
            BidStatus::Outbid => "outbid",
            BidStatus::Won => "won",
            BidStatus::Lost => "lost",
        }
    }

    /// Transition table for the bid state machine
    pub fn can_transition_to(&self, next: BidStatus) -> bool {
        matches!(
            (self, next),
            (BidStatus::Active, BidStatus::Outbid)
                | (BidStatus::Active, BidStatus::Won)
                | (BidStatus::Active, BidStatus::Lost)
                | (BidStatus::Outbid, BidStatus::Lost)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BidStatus::Won | BidStatus::Lost)
    }

    /// Whether this bid currently leads its auction
    pub fn is_leading(&self) -> bool {
        matches!(self, BidStatus::Active | BidStatus::Won)
    }
}

impl From<BidStatus> for String {
    fn from(status: BidStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Bid model representing a single bid placed on an auction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: Decimal,
    pub status: BidStatus,
    pub placed_at: NaiveDateTime,
    pub metadata: Option<Value>,
}

impl Bid {
    /// Create a new leading Bid
    pub fn new(auction_id: Uuid, bidder_id: Uuid, amount: Decimal, metadata: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            auction_id,
            bidder_id,
            amount,
            status: BidStatus::Active,
            placed_at: chrono::Utc::now().naive_utc(),
            metadata,
        }
    }
}
