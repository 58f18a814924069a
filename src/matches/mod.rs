//! Match record store
//!
//! Persists the lifecycle of a pairing: who plays, what was escrowed, where the
//! match is in its state machine and the ratings around its settlement. Each
//! operation runs in its own unit of work; the `*_in` functions in
//! [`lifecycle`] let other components fold the same steps into theirs.

pub mod lifecycle;

pub use lifecycle::{
    create_in, ensure_settleable, finalize_in, mark_fee_reserved_in, purge_abandoned_in,
    start_in, NewMatch,
};

use crate::error::{ArenaError, Result};
use crate::store::{transact, ArenaStore, LockScope};
use crate::types::{Match, MatchId, MatchStatus, ParticipantId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Lock scope covering a match row and every seated participant
pub fn scope_for(game: &Match) -> LockScope {
    LockScope::new()
        .with_match(game.id)
        .with_participants(game.participants())
}

/// Match lifecycle operations backed by an [`ArenaStore`]
#[derive(Clone)]
pub struct MatchRecords {
    store: Arc<dyn ArenaStore>,
}

impl MatchRecords {
    pub fn new(store: Arc<dyn ArenaStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, match_id: MatchId) -> Result<Match> {
        debug!("Looking up match {}", match_id);
        self.store
            .find_match(match_id)
            .await?
            .ok_or_else(|| ArenaError::MatchNotFound { match_id }.into())
    }

    pub async fn create(&self, request: NewMatch) -> Result<Match> {
        let scope = LockScope::new().with_participants(request.participants());
        let game = transact(self.store.as_ref(), scope, |uow| create_in(uow, request)).await?;
        info!(
            "Created {:?} match {} ({} vs {:?})",
            game.kind, game.id, game.white_id, game.black_id
        );
        Ok(game)
    }

    pub async fn mark_fee_reserved(&self, match_id: MatchId) -> Result<()> {
        let scope = LockScope::new().with_match(match_id);
        transact(self.store.as_ref(), scope, |uow| {
            mark_fee_reserved_in(uow, match_id)
        })
        .await
    }

    pub async fn start(&self, match_id: MatchId) -> Result<Match> {
        let scope = scope_for(&self.get(match_id).await?);
        let game = transact(self.store.as_ref(), scope, |uow| {
            start_in(uow, match_id)?;
            Ok(uow.game(match_id)?.clone())
        })
        .await?;
        info!("Match {} started", match_id);
        Ok(game)
    }

    pub async fn finalize(
        &self,
        match_id: MatchId,
        status: MatchStatus,
        winner_id: Option<ParticipantId>,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let scope = LockScope::new().with_match(match_id);
        transact(self.store.as_ref(), scope, |uow| {
            finalize_in(uow, match_id, status, winner_id, completed_at)
        })
        .await?;
        info!("Match {} finalized as {}", match_id, status);
        Ok(())
    }

    /// Physically delete a waiting match whose fee was never committed
    pub async fn purge_abandoned(&self, match_id: MatchId) -> Result<Match> {
        let scope = LockScope::new().with_match(match_id);
        let game = transact(self.store.as_ref(), scope, |uow| {
            purge_abandoned_in(uow, match_id)
        })
        .await?;
        info!("Purged abandoned match {}", match_id);
        Ok(game)
    }
}
