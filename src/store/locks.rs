//! Pessimistic row locks
//!
//! Each row has its own `tokio::sync::Mutex`. A [`LockScope`] names every row
//! one unit of work touches; acquiring it walks the rows in the scope's fixed
//! order so two overlapping scopes can never deadlock.

use crate::error::{ArenaError, Result};
use crate::types::{MatchId, ParticipantId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

/// A lockable row. Matches order before participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Match(MatchId),
    Participant(ParticipantId),
}

/// The set of rows one unit of work locks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockScope {
    rows: BTreeSet<RowKey>,
}

impl LockScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match(mut self, match_id: MatchId) -> Self {
        self.rows.insert(RowKey::Match(match_id));
        self
    }

    pub fn with_participant(mut self, participant_id: impl Into<ParticipantId>) -> Self {
        self.rows.insert(RowKey::Participant(participant_id.into()));
        self
    }

    pub fn with_participants<I, P>(mut self, participant_ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ParticipantId>,
    {
        for id in participant_ids {
            self.rows.insert(RowKey::Participant(id.into()));
        }
        self
    }

    pub fn covers_match(&self, match_id: &MatchId) -> bool {
        self.rows.contains(&RowKey::Match(*match_id))
    }

    pub fn covers_participant(&self, participant_id: &str) -> bool {
        self.rows
            .contains(&RowKey::Participant(participant_id.to_string()))
    }

    pub fn match_ids(&self) -> impl Iterator<Item = &MatchId> {
        self.rows.iter().filter_map(|key| match key {
            RowKey::Match(id) => Some(id),
            RowKey::Participant(_) => None,
        })
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.rows.iter().filter_map(|key| match key {
            RowKey::Participant(id) => Some(id),
            RowKey::Match(_) => None,
        })
    }

    /// Rows in acquisition order
    pub fn rows(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Guards for every row of a scope; dropping it unlocks them all
#[derive(Debug)]
pub struct RowGuards {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl RowGuards {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// Registry of per-row mutexes
#[derive(Debug, Default)]
pub struct RowLockTable {
    rows: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl RowLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every row of `scope`, waiting for holders to finish
    pub async fn acquire(&self, scope: &LockScope) -> Result<RowGuards> {
        let mut guards = Vec::with_capacity(scope.len());
        for key in scope.rows() {
            let row = self.row(key)?;
            trace!("Waiting for row lock {:?}", key);
            guards.push(row.lock_owned().await);
        }
        Ok(RowGuards { guards })
    }

    /// Number of row mutexes currently held in the table
    pub fn tracked_rows(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    fn row(&self, key: &RowKey) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut rows = self.rows.lock().map_err(|_| ArenaError::InternalError {
            message: "Failed to acquire row lock table".to_string(),
        })?;
        // A count of one means no guard or waiter refers to the row
        rows.retain(|_, row| Arc::strong_count(row) > 1);
        Ok(rows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}
