//! Rank ladder
//!
//! Pure policies over ratings: which tier a rating belongs to, what a ranked
//! match costs at that tier, how wide an opponent search may go, and when a
//! participant climbs a level.

pub mod policy;
pub mod promotion;

pub use policy::{BandWidening, RankPolicy, RankTier, RatingBand, STANDARD_TIERS};
pub use promotion::{LevelReward, PromotionPolicy};
