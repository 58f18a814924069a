//! Utility functions for the ranked arena core

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Win rate as a percentage rounded to two decimals, 0 with no matches played
pub fn win_rate(wins: u32, total_matches: u32) -> f64 {
    if total_matches == 0 {
        return 0.0;
    }
    (f64::from(wins) / f64::from(total_matches) * 10_000.0).round() / 100.0
}

/// Milliseconds elapsed since `since`, for timing logs
pub fn elapsed_ms(since: std::time::Instant) -> u128 {
    since.elapsed().as_millis()
}
