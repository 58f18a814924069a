//! Ranked Arena - fee escrow and ELO settlement for ranked matches
//!
//! This crate reserves, commits and releases match entry fees, drives the
//! match lifecycle, and settles results exactly once with tiered ELO ratings
//! and rank promotions. Every mutation runs in a row-locked unit of work that
//! commits all of its changes or none of them.

pub mod config;
pub mod error;
pub mod ledger;
pub mod matches;
pub mod matchmaking;
pub mod metrics;
pub mod rank;
pub mod service;
pub mod settlement;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ArenaError, Result};
pub use types::*;

// Re-export key components
pub use ledger::LedgerGuard;
pub use matches::MatchRecords;
pub use matchmaking::MatchmakingOrchestrator;
pub use rank::RankPolicy;
pub use settlement::{RatingCalculator, SettlementEngine};
pub use store::{ArenaStore, InMemoryArenaStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
