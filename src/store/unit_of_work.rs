//! Staged, lock-holding view of the store for one atomic operation

use crate::error::{ArenaError, Result};
use crate::store::{ArenaStore, ChangeSet, LockScope, RowGuards};
use crate::types::{
    HistoryId, Match, MatchHistoryEntry, MatchId, Participant, ParticipantId, TransactionId,
    TransactionRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The staged set of row changes of one atomic operation
///
/// Holds the row locks of its scope from [`UnitOfWork::begin`] until it is
/// committed or dropped. Rows outside the scope cannot be read or written,
/// except for matches created by this unit of work.
pub struct UnitOfWork<'s> {
    store: &'s dyn ArenaStore,
    scope: LockScope,
    _guards: RowGuards,
    participants: BTreeMap<ParticipantId, Participant>,
    matches: BTreeMap<MatchId, Match>,
    transactions: Vec<TransactionRecord>,
    dirty_participants: BTreeSet<ParticipantId>,
    dirty_matches: BTreeSet<MatchId>,
    deleted_matches: BTreeSet<MatchId>,
    created_matches: BTreeSet<MatchId>,
    new_transactions: BTreeSet<TransactionId>,
    dirty_transactions: BTreeSet<TransactionId>,
    history: Vec<MatchHistoryEntry>,
}

impl<'s> UnitOfWork<'s> {
    /// Lock the rows of `scope` and load them
    pub async fn begin(store: &'s dyn ArenaStore, scope: LockScope) -> Result<UnitOfWork<'s>> {
        let guards = store.acquire(&scope).await?;
        let snapshot = store.load(&scope).await?;

        debug!(
            "Unit of work locked {} rows ({} participants, {} matches loaded)",
            guards.len(),
            snapshot.participants.len(),
            snapshot.matches.len()
        );

        Ok(Self {
            store,
            scope,
            _guards: guards,
            participants: snapshot.participants,
            matches: snapshot.matches,
            transactions: snapshot.transactions,
            dirty_participants: BTreeSet::new(),
            dirty_matches: BTreeSet::new(),
            deleted_matches: BTreeSet::new(),
            created_matches: BTreeSet::new(),
            new_transactions: BTreeSet::new(),
            dirty_transactions: BTreeSet::new(),
            history: Vec::new(),
        })
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    pub fn participant(&self, participant_id: &str) -> Result<&Participant> {
        self.ensure_participant_locked(participant_id)?;
        self.participants
            .get(participant_id)
            .ok_or_else(|| participant_not_found(participant_id))
    }

    /// Mutable access to a locked participant; the row is written on commit
    pub fn participant_mut(&mut self, participant_id: &str) -> Result<&mut Participant> {
        self.ensure_participant_locked(participant_id)?;
        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| participant_not_found(participant_id))?;
        self.dirty_participants.insert(participant_id.to_string());
        Ok(participant)
    }

    pub fn game(&self, match_id: MatchId) -> Result<&Match> {
        self.ensure_match_locked(match_id)?;
        self.matches
            .get(&match_id)
            .ok_or_else(|| ArenaError::MatchNotFound { match_id }.into())
    }

    pub fn game_mut(&mut self, match_id: MatchId) -> Result<&mut Match> {
        self.ensure_match_locked(match_id)?;
        let game = self
            .matches
            .get_mut(&match_id)
            .ok_or(ArenaError::MatchNotFound { match_id })?;
        self.dirty_matches.insert(match_id);
        Ok(game)
    }

    /// Stage a brand new match row
    pub fn insert_match(&mut self, game: Match) -> MatchId {
        let match_id = game.id;
        self.created_matches.insert(match_id);
        self.dirty_matches.insert(match_id);
        self.matches.insert(match_id, game);
        match_id
    }

    /// Stage the physical deletion of a locked match
    pub fn delete_match(&mut self, match_id: MatchId) -> Result<Match> {
        self.ensure_match_locked(match_id)?;
        let game = self
            .matches
            .remove(&match_id)
            .ok_or(ArenaError::MatchNotFound { match_id })?;
        self.dirty_matches.remove(&match_id);
        if !self.created_matches.remove(&match_id) {
            self.deleted_matches.insert(match_id);
        }
        Ok(game)
    }

    /// Audit rows of a locked match, including rows staged here
    pub fn match_transactions(
        &self,
        match_id: MatchId,
    ) -> impl Iterator<Item = &TransactionRecord> + '_ {
        self.transactions
            .iter()
            .filter(move |record| record.match_id == Some(match_id))
    }

    /// Pending reservation rows of one participant for one match
    pub fn pending_reservations(
        &self,
        participant_id: &str,
        match_id: MatchId,
    ) -> Vec<&TransactionRecord> {
        self.match_transactions(match_id)
            .filter(|record| record.is_pending_reservation(participant_id, match_id))
            .collect()
    }

    pub fn append_transaction(&mut self, record: TransactionRecord) -> TransactionId {
        let id = record.id;
        self.new_transactions.insert(id);
        self.transactions.push(record);
        id
    }

    /// Apply `update` to every staged audit row matching `predicate`
    pub fn update_transactions<P, U>(&mut self, predicate: P, mut update: U) -> usize
    where
        P: Fn(&TransactionRecord) -> bool,
        U: FnMut(&mut TransactionRecord),
    {
        let mut updated = 0;
        for record in self.transactions.iter_mut().filter(|r| predicate(r)) {
            update(record);
            record.updated_at = chrono::Utc::now();
            if !self.new_transactions.contains(&record.id) {
                self.dirty_transactions.insert(record.id);
            }
            updated += 1;
        }
        updated
    }

    pub fn append_history(&mut self, entry: MatchHistoryEntry) -> HistoryId {
        let id = entry.id;
        self.history.push(entry);
        id
    }

    /// Write every staged change and release the row locks
    pub async fn commit(self) -> Result<()> {
        let changes = self.change_set();
        if changes.is_empty() {
            return Ok(());
        }
        debug!(
            "Committing unit of work: {} participants, {} matches, {} new transactions",
            changes.participants.len(),
            changes.matches.len(),
            changes.new_transactions.len()
        );
        self.store.apply(changes).await
    }

    fn change_set(&self) -> ChangeSet {
        let participants = self
            .dirty_participants
            .iter()
            .filter_map(|id| self.participants.get(id).map(|p| (id.clone(), p.clone())))
            .collect();
        let matches = self
            .dirty_matches
            .iter()
            .filter_map(|id| self.matches.get(id).map(|m| (*id, m.clone())))
            .collect();
        let new_transactions = self
            .transactions
            .iter()
            .filter(|record| self.new_transactions.contains(&record.id))
            .cloned()
            .collect();
        let updated_transactions = self
            .transactions
            .iter()
            .filter(|record| self.dirty_transactions.contains(&record.id))
            .cloned()
            .collect();

        ChangeSet {
            participants,
            matches,
            deleted_matches: self.deleted_matches.clone(),
            new_transactions,
            updated_transactions,
            history: self.history.clone(),
        }
    }

    fn ensure_participant_locked(&self, participant_id: &str) -> Result<()> {
        if self.scope.covers_participant(participant_id) {
            Ok(())
        } else {
            Err(ArenaError::InternalError {
                message: format!("Participant row {} is not locked", participant_id),
            }
            .into())
        }
    }

    fn ensure_match_locked(&self, match_id: MatchId) -> Result<()> {
        if self.scope.covers_match(&match_id) || self.created_matches.contains(&match_id) {
            Ok(())
        } else {
            Err(ArenaError::InternalError {
                message: format!("Match row {} is not locked", match_id),
            }
            .into())
        }
    }
}

fn participant_not_found(participant_id: &str) -> anyhow::Error {
    ArenaError::ParticipantNotFound {
        participant_id: participant_id.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryArenaStore;
    use crate::types::{Currency, TransactionKind, TransactionStatus};

    async fn create_test_store() -> InMemoryArenaStore {
        let store = InMemoryArenaStore::new();
        store
            .insert_participant(Participant::new("amy", "Amy").with_balance(Currency::Gem, 50))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_changes() {
        let store = create_test_store().await;

        {
            let mut uow = UnitOfWork::begin(&store, LockScope::new().with_participant("amy"))
                .await
                .unwrap();
            uow.participant_mut("amy").unwrap().wallet.gem.lock(20);
        }

        let amy = store.participant("amy").await.unwrap().unwrap();
        assert_eq!(amy.wallet.gem.locked, 0);
    }

    #[tokio::test]
    async fn test_commit_writes_participant_and_audit_row() {
        let store = create_test_store().await;

        let mut uow = UnitOfWork::begin(&store, LockScope::new().with_participant("amy"))
            .await
            .unwrap();
        uow.participant_mut("amy").unwrap().wallet.gem.lock(20);
        uow.append_transaction(TransactionRecord::new(
            "amy".to_string(),
            None,
            TransactionKind::RankMatchFee,
            20,
            Currency::Gem,
            TransactionStatus::Pending,
            "test".to_string(),
        ));
        uow.commit().await.unwrap();

        let amy = store.participant("amy").await.unwrap().unwrap();
        assert_eq!(amy.wallet.gem.locked, 20);
        assert_eq!(store.participant_transactions("amy").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rows_outside_scope_are_rejected() {
        let store = create_test_store().await;
        let uow = UnitOfWork::begin(&store, LockScope::new()).await.unwrap();

        let err = uow.participant("amy").unwrap_err();
        assert!(matches!(
            ArenaError::classify(&err),
            Some(ArenaError::InternalError { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_participant_in_scope() {
        let store = create_test_store().await;
        let uow = UnitOfWork::begin(&store, LockScope::new().with_participant("ghost"))
            .await
            .unwrap();

        let err = uow.participant("ghost").unwrap_err();
        assert_eq!(
            ArenaError::classify(&err),
            Some(&ArenaError::ParticipantNotFound {
                participant_id: "ghost".to_string()
            })
        );
    }
}
