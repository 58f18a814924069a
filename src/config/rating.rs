//! Rating system configuration

use crate::error::{ArenaError, Result};
use serde::{Deserialize, Serialize};

/// K-factor applied to participants rated below `below`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KFactorTier {
    pub below: u32,
    pub k: f64,
}

/// ELO settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSettings {
    /// Lowest rating a settlement can produce
    pub min_rating: u32,
    /// Highest rating a settlement can produce
    pub max_rating: u32,
    /// K-factor bands, ascending by `below`
    pub k_factor_tiers: Vec<KFactorTier>,
    /// K-factor for ratings above every band
    pub default_k: f64,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            min_rating: 0,
            max_rating: 3000,
            k_factor_tiers: vec![
                KFactorTier { below: 1000, k: 32.0 },
                KFactorTier { below: 2000, k: 24.0 },
            ],
            default_k: 16.0,
        }
    }
}

impl RatingSettings {
    /// K-factor for a participant with pre-match `rating`
    pub fn k_factor(&self, rating: u32) -> f64 {
        self.k_factor_tiers
            .iter()
            .find(|tier| rating < tier.below)
            .map(|tier| tier.k)
            .unwrap_or(self.default_k)
    }

    pub fn validate(&self) -> Result<()> {
        let config_error = |message: &str| -> anyhow::Error {
            ArenaError::ConfigurationError {
                message: message.to_string(),
            }
            .into()
        };

        if self.min_rating >= self.max_rating {
            return Err(config_error("Min rating must be below max rating"));
        }
        if self.default_k <= 0.0 || self.k_factor_tiers.iter().any(|tier| tier.k <= 0.0) {
            return Err(config_error("K-factors must be positive"));
        }
        if self
            .k_factor_tiers
            .windows(2)
            .any(|pair| pair[0].below >= pair[1].below)
        {
            return Err(config_error("K-factor tiers must be ascending"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_k_factor_bands() {
        let settings = RatingSettings::default();
        assert_eq!(settings.k_factor(0), 32.0);
        assert_eq!(settings.k_factor(999), 32.0);
        assert_eq!(settings.k_factor(1000), 24.0);
        assert_eq!(settings.k_factor(1999), 24.0);
        assert_eq!(settings.k_factor(2000), 16.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        let mut settings = RatingSettings::default();
        settings.min_rating = 3000;
        assert!(settings.validate().is_err());

        let mut settings = RatingSettings::default();
        settings.k_factor_tiers.reverse();
        assert!(settings.validate().is_err());

        let mut settings = RatingSettings::default();
        settings.default_k = 0.0;
        assert!(settings.validate().is_err());
    }
}
