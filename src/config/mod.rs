//! Configuration management for the ranked-arena service
//!
//! Loading from environment variables and TOML files, validation, and
//! defaults for the service, ledger, matchmaking, rating and rank sections.

pub mod app;
pub mod rank;
pub mod rating;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, LedgerSettings, MatchmakingSettings, ServiceSettings};
pub use rank::RankSettings;
pub use rating::{KFactorTier, RatingSettings};
