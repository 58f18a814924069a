//! Hidden promotion conditions and level-up rewards

use crate::rank::policy::RankPolicy;
use crate::types::Participant;
use serde::{Deserialize, Serialize};

/// Gems credited on reaching `level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelReward {
    pub level: u8,
    pub gem: u64,
}

/// Rules for climbing rank levels outside of rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionPolicy {
    /// Matches required for level 2; doubles for every level above
    pub base_match_requirement: u32,
    /// Minimum win rate, in percent
    pub min_win_rate: f64,
    /// Gems credited on reaching each level
    pub gem_rewards: Vec<LevelReward>,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl PromotionPolicy {
    pub fn standard() -> Self {
        Self {
            base_match_requirement: 10,
            min_win_rate: 60.0,
            gem_rewards: [(2, 10), (3, 20), (4, 80), (5, 320), (6, 1280), (7, 5120)]
                .into_iter()
                .map(|(level, gem)| LevelReward { level, gem })
                .collect(),
        }
    }

    /// Matches a participant must have played to be promoted to `level`
    pub fn required_matches(&self, level: u8) -> Option<u32> {
        if level < 2 {
            return None;
        }
        let shift = u32::from(level - 2);
        2u32.checked_pow(shift)
            .and_then(|factor| factor.checked_mul(self.base_match_requirement))
    }

    /// Whether the hidden condition for `level` holds for `participant`
    pub fn hidden_condition_met(&self, participant: &Participant, level: u8) -> bool {
        match self.required_matches(level) {
            Some(required) => {
                participant.total_matches >= required && participant.win_rate >= self.min_win_rate
            }
            None => false,
        }
    }

    pub fn reward_for(&self, level: u8) -> u64 {
        self.gem_rewards
            .iter()
            .find(|reward| reward.level == level)
            .map(|reward| reward.gem)
            .unwrap_or(0)
    }

    /// Level after a settlement, given the participant's updated rating and stats
    ///
    /// Never lower than the stored level. The rating tier can lift it any number
    /// of levels; the hidden condition lifts it at most one level above storage.
    pub fn next_level(&self, ranks: &RankPolicy, participant: &Participant) -> u8 {
        let stored = participant.rank_level;
        let mut level = stored.max(ranks.tier_for_rating(participant.rating));

        if let Some(candidate) = ranks.level_above(stored) {
            if candidate > level && self.hidden_condition_met(participant, candidate) {
                level = candidate;
            }
        }

        level
    }

    /// Total gems owed for moving from `from` to `to`, one reward per level
    pub fn rewards_between(&self, from: u8, to: u8) -> u64 {
        (from.saturating_add(1)..=to)
            .map(|level| self.reward_for(level))
            .sum()
    }
}
