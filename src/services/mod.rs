pub mod auction_service;
pub mod bidding_service;
pub mod closing_service;
pub mod expiration;

pub use auction_service::{AuctionService, AuctionUpdate, CreateAuction};
pub use bidding_service::{BidResult, BiddingService};
pub use closing_service::{AuctionCloser, ClosingService, ClosureResult};
pub use expiration::ExpirationScheduler;
