//! Rank ladder configuration

use crate::error::Result;
use crate::rank::{BandWidening, PromotionPolicy, RankPolicy, RankTier, STANDARD_TIERS};
use serde::{Deserialize, Serialize};

/// Tier table, band widening and promotion rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankSettings {
    pub tiers: Vec<RankTier>,
    pub widening: BandWidening,
    pub promotion: PromotionPolicy,
}

impl Default for RankSettings {
    fn default() -> Self {
        Self {
            tiers: STANDARD_TIERS.to_vec(),
            widening: BandWidening::default(),
            promotion: PromotionPolicy::standard(),
        }
    }
}

impl RankSettings {
    /// Build the validated rank policy described by these settings
    pub fn policy(&self) -> Result<RankPolicy> {
        RankPolicy::new(self.tiers.clone(), self.widening)
    }
}
