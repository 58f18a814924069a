//! Settlement of finished matches
//!
//! Rating math, statistics and the engine that applies them atomically.

pub mod elo;
pub mod engine;
pub mod stats;

pub use elo::{RatingCalculator, RatingUpdate, TieredEloCalculator};
pub use engine::{ResultPayload, SettlementEngine};
pub use stats::{record_result, PersonalResult};
