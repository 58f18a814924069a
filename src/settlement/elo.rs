//! Rating calculator trait and the tiered-K ELO implementation
//!
//! The ELO math itself comes from the skillratings crate; this module adds the
//! per-participant K-factor, integer rounding and the rating bounds.

use crate::config::RatingSettings;
use crate::error::Result;
use crate::types::MatchOutcome;
use skillratings::elo::{elo, EloConfig, EloRating};
use skillratings::Outcomes;

/// New ratings of both sides after a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingUpdate {
    pub white: u32,
    pub black: u32,
}

/// Trait for calculating rating changes after a two-sided match
pub trait RatingCalculator: Send + Sync {
    /// New ratings for white and black given a white-relative outcome
    fn calculate(&self, white: u32, black: u32, outcome: MatchOutcome) -> Result<RatingUpdate>;

    /// Probability that a participant rated `own` beats one rated `opponent`
    fn expected_score(&self, own: u32, opponent: u32) -> f64;

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;
}

/// ELO with a K-factor chosen by each participant's own rating
#[derive(Debug, Clone)]
pub struct TieredEloCalculator {
    settings: RatingSettings,
}

impl TieredEloCalculator {
    pub fn new(settings: RatingSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    fn clamp(&self, rating: f64) -> u32 {
        let min = f64::from(self.settings.min_rating);
        let max = f64::from(self.settings.max_rating);
        rating.round().clamp(min, max) as u32
    }

    /// Rating of one side, computed with that side's own K-factor
    fn updated(&self, own: u32, opponent: u32, outcome: Outcomes) -> u32 {
        let config = EloConfig {
            k: self.settings.k_factor(own),
        };
        let (own_after, _) = elo(
            &EloRating {
                rating: f64::from(own),
            },
            &EloRating {
                rating: f64::from(opponent),
            },
            &outcome,
            &config,
        );
        self.clamp(own_after.rating)
    }
}

impl Default for TieredEloCalculator {
    fn default() -> Self {
        Self {
            settings: RatingSettings::default(),
        }
    }
}

impl RatingCalculator for TieredEloCalculator {
    fn calculate(&self, white: u32, black: u32, outcome: MatchOutcome) -> Result<RatingUpdate> {
        let (white_outcome, black_outcome) = match outcome {
            MatchOutcome::Win => (Outcomes::WIN, Outcomes::LOSS),
            MatchOutcome::Lose => (Outcomes::LOSS, Outcomes::WIN),
            // ratings stay put on a draw
            MatchOutcome::Draw => return Ok(RatingUpdate { white, black }),
        };

        Ok(RatingUpdate {
            white: self.updated(white, black, white_outcome),
            black: self.updated(black, white, black_outcome),
        })
    }

    fn expected_score(&self, own: u32, opponent: u32) -> f64 {
        let (expected, _) = skillratings::elo::expected_score(
            &EloRating {
                rating: f64::from(own),
            },
            &EloRating {
                rating: f64::from(opponent),
            },
        );
        expected
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "tiered_elo",
            "min_rating": self.settings.min_rating,
            "max_rating": self.settings.max_rating,
            "k_factor_tiers": self.settings.k_factor_tiers,
            "default_k": self.settings.default_k,
        })
    }
}
