//! In-memory view of in-flight reservations
//!
//! Not authoritative: the store decides what is reserved. The monitor only
//! remembers which matches this process reserved fees for and when, so that
//! operators can see them and the cleanup task knows where to look.

use crate::error::{ArenaError, Result};
use crate::types::{Currency, MatchId, ParticipantId, ReservedMatchesInfo};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// One match whose fees were reserved by this process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationEntry {
    pub match_id: MatchId,
    pub participants: Vec<ParticipantId>,
    pub fee: u64,
    pub currency: Currency,
    pub reserved_at: DateTime<Utc>,
}

impl ReservationEntry {
    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        ChronoDuration::from_std(max_age)
            .map(|max_age| now.signed_duration_since(self.reserved_at) >= max_age)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
pub struct ReservationMonitor {
    entries: RwLock<HashMap<MatchId, ReservationEntry>>,
}

impl ReservationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: ReservationEntry) -> Result<()> {
        let mut entries = self.write()?;
        entries.insert(entry.match_id, entry);
        Ok(())
    }

    pub fn remove(&self, match_id: MatchId) -> Result<Option<ReservationEntry>> {
        let mut entries = self.write()?;
        Ok(entries.remove(&match_id))
    }

    pub fn get(&self, match_id: MatchId) -> Result<Option<ReservationEntry>> {
        let entries = self.read()?;
        Ok(entries.get(&match_id).cloned())
    }

    /// Count and ids of tracked matches, oldest reservation first
    pub fn info(&self) -> Result<ReservedMatchesInfo> {
        let entries = self.read()?;
        let mut tracked: Vec<&ReservationEntry> = entries.values().collect();
        tracked.sort_by_key(|entry| entry.reserved_at);

        Ok(ReservedMatchesInfo {
            total_reserved: tracked.len(),
            reserved_matches: tracked.iter().map(|entry| entry.match_id).collect(),
        })
    }

    /// Entries reserved at least `max_age` before `now`
    pub fn expired(&self, max_age: Duration, now: DateTime<Utc>) -> Result<Vec<ReservationEntry>> {
        let entries = self.read()?;
        Ok(entries
            .values()
            .filter(|entry| entry.is_older_than(max_age, now))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<MatchId, ReservationEntry>>> {
        self.entries.read().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire reservation monitor lock".to_string(),
            }
            .into()
        })
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<MatchId, ReservationEntry>>> {
        self.entries.write().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire reservation monitor lock".to_string(),
            }
            .into()
        })
    }
}
