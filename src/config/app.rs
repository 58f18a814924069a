//! Main application configuration
//!
//! Top-level settings for the ranked-arena service: environment variable and
//! TOML file loading, defaults, and validation across every section.

use crate::config::rank::RankSettings;
use crate::config::rating::RatingSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub ledger: LedgerSettings,
    pub matchmaking: MatchmakingSettings,
    pub rating: RatingSettings,
    pub rank: RankSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the health and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Fee escrow settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Refuse a second pending reservation for the same participant and match
    pub reject_duplicate_reservations: bool,
}

/// Matchmaking and reservation housekeeping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Age after which an uncommitted reservation is released
    pub reservation_ttl_seconds: u64,
    /// How often the cleanup task looks for expired reservations
    pub cleanup_interval_seconds: u64,
    /// Default number of rows returned by transaction history
    pub history_page_size: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "ranked-arena".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            reservation_ttl_seconds: 300, // 5 minutes
            cleanup_interval_seconds: 60,
            history_page_size: 20,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", key, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = parse_env("HEALTH_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_env("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Ledger settings
        if let Ok(reject) = env::var("REJECT_DUPLICATE_RESERVATIONS") {
            self.ledger.reject_duplicate_reservations =
                parse_env("REJECT_DUPLICATE_RESERVATIONS", &reject)?;
        }

        // Matchmaking settings
        if let Ok(ttl) = env::var("RESERVATION_TTL_SECONDS") {
            self.matchmaking.reservation_ttl_seconds = parse_env("RESERVATION_TTL_SECONDS", &ttl)?;
        }
        if let Ok(cleanup) = env::var("CLEANUP_INTERVAL_SECONDS") {
            self.matchmaking.cleanup_interval_seconds =
                parse_env("CLEANUP_INTERVAL_SECONDS", &cleanup)?;
        }

        // Rating bounds
        if let Ok(min) = env::var("MIN_RATING") {
            self.rating.min_rating = parse_env("MIN_RATING", &min)?;
        }
        if let Ok(max) = env::var("MAX_RATING") {
            self.rating.max_rating = parse_env("MAX_RATING", &max)?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get cleanup interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.cleanup_interval_seconds)
    }

    /// Get reservation time-to-live as Duration
    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.matchmaking.reservation_ttl_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.name.is_empty() {
        return Err(anyhow!("Service name cannot be empty"));
    }
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.matchmaking.reservation_ttl_seconds == 0 {
        return Err(anyhow!("Reservation TTL must be greater than 0"));
    }
    if config.matchmaking.cleanup_interval_seconds == 0 {
        return Err(anyhow!("Cleanup interval must be greater than 0"));
    }
    if config.matchmaking.history_page_size == 0 {
        return Err(anyhow!("History page size must be greater than 0"));
    }

    config.rating.validate()?;
    config.rank.policy()?;

    Ok(())
}
