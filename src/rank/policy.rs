//! Rank tier table and the lookups built on it
//!
//! A [`RankPolicy`] owns an ordered, validated table of tiers. Every lookup is
//! total: ratings outside every range fall back to the lowest tier, and unknown
//! levels resolve to the nearest tier at or below them.

use crate::error::{ArenaError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One row of the rank table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTier {
    pub level: u8,
    pub min_rating: u32,
    /// Inclusive upper bound; `None` for the open-ended top tier
    pub max_rating: Option<u32>,
    /// Entry fee for ranked matches at this tier
    pub fee: u64,
}

impl RankTier {
    pub const fn new(level: u8, min_rating: u32, max_rating: Option<u32>, fee: u64) -> Self {
        Self {
            level,
            min_rating,
            max_rating,
            fee,
        }
    }

    pub fn contains(&self, rating: u32) -> bool {
        rating >= self.min_rating && self.max_rating.map_or(true, |max| rating <= max)
    }
}

/// How far the opponent band widens with wait time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandWidening {
    /// Wait after which the band spans one tier either side
    pub medium_wait_seconds: u64,
    /// Wait after which the band spans two tiers either side
    pub long_wait_seconds: u64,
}

impl Default for BandWidening {
    fn default() -> Self {
        Self {
            medium_wait_seconds: 90,
            long_wait_seconds: 300,
        }
    }
}

impl BandWidening {
    /// Number of tiers to widen by after waiting `wait`
    pub fn tiers_for_wait(&self, wait: Duration) -> u8 {
        let seconds = wait.as_secs();
        if seconds >= self.long_wait_seconds {
            2
        } else if seconds >= self.medium_wait_seconds {
            1
        } else {
            0
        }
    }
}

/// Candidate opponent rating window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingBand {
    pub min: u32,
    /// `None` when the band reaches the open-ended top tier
    pub max: Option<u32>,
}

impl RatingBand {
    pub fn contains(&self, rating: u32) -> bool {
        rating >= self.min && self.max.map_or(true, |max| rating <= max)
    }
}

/// Default tier table of the ranked ladder
pub const STANDARD_TIERS: [RankTier; 7] = [
    RankTier::new(1, 0, Some(500), 1),
    RankTier::new(2, 501, Some(1100), 2),
    RankTier::new(3, 1101, Some(1500), 4),
    RankTier::new(4, 1501, Some(2100), 8),
    RankTier::new(5, 2101, Some(2900), 16),
    RankTier::new(6, 2901, Some(4000), 32),
    RankTier::new(7, 4001, None, 64),
];

/// Maps ratings to tiers, fees and opponent bands
#[derive(Debug, Clone, PartialEq)]
pub struct RankPolicy {
    tiers: Vec<RankTier>,
    widening: BandWidening,
}

impl RankPolicy {
    /// Build a policy from a tier table, rejecting malformed tables
    pub fn new(tiers: Vec<RankTier>, widening: BandWidening) -> Result<Self> {
        validate_tiers(&tiers)?;
        if widening.long_wait_seconds < widening.medium_wait_seconds {
            return Err(ArenaError::ConfigurationError {
                message: "Long wait threshold cannot be shorter than the medium one".to_string(),
            }
            .into());
        }
        Ok(Self { tiers, widening })
    }

    /// The standard seven-tier ladder with 90 s / 5 min widening
    pub fn standard() -> Self {
        Self {
            tiers: STANDARD_TIERS.to_vec(),
            widening: BandWidening::default(),
        }
    }

    pub fn tiers(&self) -> &[RankTier] {
        &self.tiers
    }

    pub fn widening(&self) -> BandWidening {
        self.widening
    }

    pub fn lowest_level(&self) -> u8 {
        self.lowest().level
    }

    pub fn highest_level(&self) -> u8 {
        self.highest().level
    }

    /// Tier level whose range contains `rating`, else the lowest tier
    pub fn tier_for_rating(&self, rating: u32) -> u8 {
        self.tier_containing(rating).level
    }

    /// Entry fee for a participant at `rating`, else the lowest tier's fee
    pub fn fee_for_rating(&self, rating: u32) -> u64 {
        self.tier_containing(rating).fee
    }

    /// Look up a tier by level; unknown levels resolve to the highest tier at
    /// or below them, else the lowest tier
    pub fn tier(&self, level: u8) -> &RankTier {
        &self.tiers[self.index_of(level)]
    }

    /// The next level up the table, `None` at the top
    pub fn level_above(&self, level: u8) -> Option<u8> {
        self.tiers
            .iter()
            .find(|tier| tier.level > level)
            .map(|tier| tier.level)
    }

    /// Opponent rating band for a participant of `level` who has waited `wait`
    ///
    /// Widening steps through table rows, so gaps in level numbering are
    /// skipped rather than counted.
    pub fn rating_band_for_tier(&self, level: u8, wait: Duration) -> RatingBand {
        let index = self.index_of(level);
        let widen = usize::from(self.widening.tiers_for_wait(wait));

        let low = index.saturating_sub(widen);
        let high = index.saturating_add(widen).min(self.tiers.len() - 1);

        RatingBand {
            min: self.tiers[low].min_rating,
            max: self.tiers[high].max_rating,
        }
    }

    fn index_of(&self, level: u8) -> usize {
        self.tiers
            .iter()
            .rposition(|tier| tier.level <= level)
            .unwrap_or(0)
    }

    fn tier_containing(&self, rating: u32) -> &RankTier {
        self.tiers
            .iter()
            .find(|tier| tier.contains(rating))
            .unwrap_or_else(|| self.lowest())
    }

    fn lowest(&self) -> &RankTier {
        // validated non-empty at construction
        &self.tiers[0]
    }

    fn highest(&self) -> &RankTier {
        &self.tiers[self.tiers.len() - 1]
    }
}

impl Default for RankPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Check that a tier table is usable by [`RankPolicy`]
pub fn validate_tiers(tiers: &[RankTier]) -> Result<()> {
    let config_error = |message: String| -> anyhow::Error {
        ArenaError::ConfigurationError { message }.into()
    };

    if tiers.is_empty() {
        return Err(config_error("Rank table cannot be empty".to_string()));
    }

    for (index, tier) in tiers.iter().enumerate() {
        let is_last = index + 1 == tiers.len();

        match tier.max_rating {
            Some(max) if max < tier.min_rating => {
                return Err(config_error(format!(
                    "Tier {} has max rating {} below min rating {}",
                    tier.level, max, tier.min_rating
                )));
            }
            None if !is_last => {
                return Err(config_error(format!(
                    "Only the last tier may be unbounded, tier {} is not last",
                    tier.level
                )));
            }
            _ => {}
        }

        if let Some(next) = tiers.get(index + 1) {
            if next.level <= tier.level {
                return Err(config_error(format!(
                    "Tier levels must be strictly increasing ({} then {})",
                    tier.level, next.level
                )));
            }
            if next.fee < tier.fee {
                return Err(config_error(format!(
                    "Tier {} fee {} is lower than tier {} fee {}",
                    next.level, next.fee, tier.level, tier.fee
                )));
            }
            let expected_min = tier.max_rating.map(|max| max.saturating_add(1));
            if expected_min != Some(next.min_rating) {
                return Err(config_error(format!(
                    "Tier {} must start right after tier {} ends",
                    next.level, tier.level
                )));
            }
        }
    }

    Ok(())
}
