//! Persistence for participants, matches, audit rows and match history
//!
//! The [`ArenaStore`] trait is the seam to the relational store. Every mutating
//! operation goes through a [`UnitOfWork`]: it locks the rows it needs, works on
//! a staged copy, and hands the store a single [`ChangeSet`] to apply
//! atomically. Dropping a unit of work without committing discards its changes.

pub mod locks;
pub mod memory;
pub mod unit_of_work;

pub use locks::{LockScope, RowGuards, RowKey, RowLockTable};
pub use memory::InMemoryArenaStore;
pub use unit_of_work::UnitOfWork;

use crate::error::Result;
use crate::types::{
    MatchHistoryEntry, MatchId, Match, Participant, ParticipantId, TransactionRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rows loaded for a unit of work after its locks are held
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub participants: BTreeMap<ParticipantId, Participant>,
    pub matches: BTreeMap<MatchId, Match>,
    /// Every audit row referencing one of the locked matches
    pub transactions: Vec<TransactionRecord>,
}

/// Everything one unit of work changed
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub participants: BTreeMap<ParticipantId, Participant>,
    pub matches: BTreeMap<MatchId, Match>,
    pub deleted_matches: BTreeSet<MatchId>,
    pub new_transactions: Vec<TransactionRecord>,
    pub updated_transactions: Vec<TransactionRecord>,
    pub history: Vec<MatchHistoryEntry>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
            && self.matches.is_empty()
            && self.deleted_matches.is_empty()
            && self.new_transactions.is_empty()
            && self.updated_transactions.is_empty()
            && self.history.is_empty()
    }
}

/// Row counts, for health and stats endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub participants: usize,
    pub matches: usize,
    pub transactions: usize,
    pub history_entries: usize,
}

/// Trait for the relational store behind the arena
#[async_trait]
pub trait ArenaStore: Send + Sync {
    /// Lock every row of `scope` until the returned guards drop
    async fn acquire(&self, scope: &LockScope) -> Result<RowGuards>;

    /// Load the rows of `scope`; rows that do not exist are simply absent
    async fn load(&self, scope: &LockScope) -> Result<Snapshot>;

    /// Apply a change set all-or-nothing
    async fn apply(&self, changes: ChangeSet) -> Result<()>;

    /// Register a participant account
    async fn insert_participant(&self, participant: Participant) -> Result<()>;

    async fn participant(&self, participant_id: &str) -> Result<Option<Participant>>;

    async fn find_match(&self, match_id: MatchId) -> Result<Option<Match>>;

    /// Audit rows of one match, oldest first
    async fn match_transactions(&self, match_id: MatchId) -> Result<Vec<TransactionRecord>>;

    /// Audit rows of one participant, oldest first
    async fn participant_transactions(
        &self,
        participant_id: &str,
    ) -> Result<Vec<TransactionRecord>>;

    /// History entries of one match, oldest first
    async fn match_history(&self, match_id: MatchId) -> Result<Vec<MatchHistoryEntry>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Run `work` inside a unit of work over `scope` and commit it
///
/// Any error from `work` drops the unit of work, leaving the store untouched.
pub async fn transact<T, F>(store: &dyn ArenaStore, scope: LockScope, work: F) -> Result<T>
where
    F: FnOnce(&mut UnitOfWork<'_>) -> Result<T>,
{
    let mut uow = UnitOfWork::begin(store, scope).await?;
    let value = work(&mut uow)?;
    uow.commit().await?;
    Ok(value)
}
