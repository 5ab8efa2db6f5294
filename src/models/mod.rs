//! Domain models for the Gavel backend.
//!
//! This module contains the core entities of the auction marketplace:
//! auctions, the bids placed against them, and the user reference type
//! exposed by the identity collaborator.

pub mod auction;
pub mod bid;
pub mod user;

// Re-export all models for convenient access
pub use auction::{Auction, AuctionStatus};
pub use bid::{Bid, BidStatus};
pub use user::User;
