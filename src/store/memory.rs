//! In-memory arena store
//!
//! Tables live behind one `RwLock`, so a change set is applied under a single
//! write guard and readers never observe half of it. Row locks come from a
//! [`RowLockTable`]. Storage failures can be injected for rollback tests.

use crate::error::{ArenaError, Result};
use crate::store::{ArenaStore, ChangeSet, LockScope, RowGuards, RowLockTable, Snapshot, StoreStats};
use crate::types::{
    Match, MatchHistoryEntry, MatchId, Participant, ParticipantId, TransactionRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Tables {
    participants: HashMap<ParticipantId, Participant>,
    matches: HashMap<MatchId, Match>,
    transactions: Vec<TransactionRecord>,
    history: Vec<MatchHistoryEntry>,
}

/// In-memory [`ArenaStore`] implementation
#[derive(Debug, Default)]
pub struct InMemoryArenaStore {
    tables: RwLock<Tables>,
    locks: RowLockTable,
    fail_next_apply: AtomicBool,
    applied_change_sets: AtomicU64,
}

impl InMemoryArenaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`ArenaStore::apply`] fail without writing anything
    pub fn fail_next_commit(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }

    /// Number of change sets applied successfully
    pub fn applied_change_sets(&self) -> u64 {
        self.applied_change_sets.load(Ordering::SeqCst)
    }

    /// Every audit row, oldest first
    pub fn all_transactions(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self.read_tables()?.transactions.clone())
    }

    /// Every participant, sorted by id
    pub fn all_participants(&self) -> Result<Vec<Participant>> {
        let tables = self.read_tables()?;
        let mut participants: Vec<_> = tables.participants.values().cloned().collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(participants)
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire store read lock".to_string(),
            }
            .into()
        })
    }

    fn write_tables(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire store write lock".to_string(),
            }
            .into()
        })
    }
}

/// Reject a change set that would break a table constraint
fn check_constraints(changes: &ChangeSet) -> Result<()> {
    for participant in changes.participants.values() {
        if !participant.wallet.gem.is_consistent() || !participant.wallet.coin.is_consistent() {
            return Err(ArenaError::StorageFailure {
                message: format!(
                    "Locked balance exceeds balance for participant {}",
                    participant.id
                ),
            }
            .into());
        }
    }
    Ok(())
}

#[async_trait]
impl ArenaStore for InMemoryArenaStore {
    async fn acquire(&self, scope: &LockScope) -> Result<RowGuards> {
        self.locks.acquire(scope).await
    }

    async fn load(&self, scope: &LockScope) -> Result<Snapshot> {
        let tables = self.read_tables()?;
        let mut snapshot = Snapshot::default();

        for id in scope.participant_ids() {
            if let Some(participant) = tables.participants.get(id) {
                snapshot.participants.insert(id.clone(), participant.clone());
            }
        }
        for id in scope.match_ids() {
            if let Some(game) = tables.matches.get(id) {
                snapshot.matches.insert(*id, game.clone());
            }
        }
        snapshot.transactions = tables
            .transactions
            .iter()
            .filter(|record| {
                record
                    .match_id
                    .map_or(false, |match_id| scope.covers_match(&match_id))
            })
            .cloned()
            .collect();

        Ok(snapshot)
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            warn!("Injected storage failure, change set discarded");
            return Err(ArenaError::StorageFailure {
                message: "injected commit failure".to_string(),
            }
            .into());
        }
        check_constraints(&changes)?;

        let mut tables = self.write_tables()?;

        for (id, participant) in changes.participants {
            tables.participants.insert(id, participant);
        }
        for (id, game) in changes.matches {
            tables.matches.insert(id, game);
        }
        for id in &changes.deleted_matches {
            tables.matches.remove(id);
        }
        for updated in changes.updated_transactions {
            if let Some(row) = tables.transactions.iter_mut().find(|row| row.id == updated.id) {
                *row = updated;
            }
        }
        tables.transactions.extend(changes.new_transactions);
        tables.history.extend(changes.history);

        self.applied_change_sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_participant(&self, participant: Participant) -> Result<()> {
        let mut tables = self.write_tables()?;
        debug!("Registering participant {}", participant.id);
        tables.participants.insert(participant.id.clone(), participant);
        Ok(())
    }

    async fn participant(&self, participant_id: &str) -> Result<Option<Participant>> {
        Ok(self.read_tables()?.participants.get(participant_id).cloned())
    }

    async fn find_match(&self, match_id: MatchId) -> Result<Option<Match>> {
        Ok(self.read_tables()?.matches.get(&match_id).cloned())
    }

    async fn match_transactions(&self, match_id: MatchId) -> Result<Vec<TransactionRecord>> {
        Ok(self
            .read_tables()?
            .transactions
            .iter()
            .filter(|record| record.match_id == Some(match_id))
            .cloned()
            .collect())
    }

    async fn participant_transactions(
        &self,
        participant_id: &str,
    ) -> Result<Vec<TransactionRecord>> {
        Ok(self
            .read_tables()?
            .transactions
            .iter()
            .filter(|record| record.participant_id == participant_id)
            .cloned()
            .collect())
    }

    async fn match_history(&self, match_id: MatchId) -> Result<Vec<MatchHistoryEntry>> {
        Ok(self
            .read_tables()?
            .history
            .iter()
            .filter(|entry| entry.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let tables = self.read_tables()?;
        Ok(StoreStats {
            participants: tables.participants.len(),
            matches: tables.matches.len(),
            transactions: tables.transactions.len(),
            history_entries: tables.history.len(),
        })
    }
}
