//! Match state machine steps
//!
//! `waiting -> ongoing -> {completed | win | lose | draw}`, one way only.

use crate::error::{ArenaError, Result};
use crate::ledger::escrow::unrefunded_fees;
use crate::store::UnitOfWork;
use crate::types::{
    Currency, Match, MatchId, MatchKind, MatchStatus, ParticipantId, RatingSnapshot,
};
use crate::utils::{current_timestamp, generate_match_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to open a new match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub white_id: ParticipantId,
    pub black_id: Option<ParticipantId>,
    pub kind: MatchKind,
    pub fee: Option<u64>,
    pub currency: Option<Currency>,
}

impl NewMatch {
    pub fn ranked(
        white_id: impl Into<ParticipantId>,
        black_id: impl Into<ParticipantId>,
        fee: u64,
        currency: Currency,
    ) -> Self {
        Self {
            white_id: white_id.into(),
            black_id: Some(black_id.into()),
            kind: MatchKind::Ranked,
            fee: Some(fee),
            currency: Some(currency),
        }
    }

    pub fn casual(white_id: impl Into<ParticipantId>, black_id: Option<ParticipantId>) -> Self {
        Self {
            white_id: white_id.into(),
            black_id,
            kind: MatchKind::Casual,
            fee: None,
            currency: None,
        }
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut ids = vec![self.white_id.clone()];
        ids.extend(self.black_id.clone());
        ids
    }
}

/// Stage a new `waiting` match after checking both seats
pub fn create_in(uow: &mut UnitOfWork<'_>, request: NewMatch) -> Result<Match> {
    uow.participant(&request.white_id)?;
    if let Some(black_id) = &request.black_id {
        uow.participant(black_id)?;
        if black_id == &request.white_id {
            return Err(ArenaError::InvalidTransition {
                reason: format!("participant {} cannot play against themselves", black_id),
            }
            .into());
        }
    }

    if request.kind == MatchKind::Ranked {
        if request.black_id.is_none() {
            return Err(ArenaError::InvalidTransition {
                reason: "a ranked match needs both participants".to_string(),
            }
            .into());
        }
        if request.fee.is_none() || request.currency.is_none() {
            return Err(ArenaError::InvalidTransition {
                reason: "a ranked match needs a fee and a currency".to_string(),
            }
            .into());
        }
    }

    let game = Match {
        id: generate_match_id(),
        white_id: request.white_id,
        black_id: request.black_id,
        kind: request.kind,
        status: MatchStatus::Waiting,
        fee: request.fee,
        currency: request.currency,
        fee_reserved: false,
        fee_committed: false,
        winner_id: None,
        ratings: RatingSnapshot::default(),
        created_at: current_timestamp(),
        started_at: None,
        completed_at: None,
    };
    uow.insert_match(game.clone());
    Ok(game)
}

pub fn mark_fee_reserved_in(uow: &mut UnitOfWork<'_>, match_id: MatchId) -> Result<()> {
    let game = uow.game_mut(match_id)?;
    game.fee_reserved = true;
    Ok(())
}

/// Move a waiting match to `ongoing` and snapshot both ratings
///
/// Both participant rows must be in the unit of work's scope.
pub fn start_in(uow: &mut UnitOfWork<'_>, match_id: MatchId) -> Result<()> {
    let game = uow.game(match_id)?;
    if game.status != MatchStatus::Waiting {
        return Err(ArenaError::InvalidTransition {
            reason: format!("match {} is {}, only waiting matches start", match_id, game.status),
        }
        .into());
    }
    let black_id = game.black_id.clone().ok_or_else(|| ArenaError::InvalidTransition {
        reason: format!("match {} has an empty seat", match_id),
    })?;
    let white_id = game.white_id.clone();

    let white_rating = uow.participant(&white_id)?.rating;
    let black_rating = uow.participant(&black_id)?.rating;

    let game = uow.game_mut(match_id)?;
    game.status = MatchStatus::Ongoing;
    game.started_at = Some(current_timestamp());
    game.ratings.white_before = Some(white_rating);
    game.ratings.black_before = Some(black_rating);
    Ok(())
}

/// Move an ongoing match to a terminal status
pub fn finalize_in(
    uow: &mut UnitOfWork<'_>,
    match_id: MatchId,
    status: MatchStatus,
    winner_id: Option<ParticipantId>,
    completed_at: DateTime<Utc>,
) -> Result<()> {
    if !status.is_terminal() {
        return Err(ArenaError::InvalidStatus {
            status: status.to_string(),
        }
        .into());
    }
    ensure_settleable(uow.game(match_id)?)?;

    let game = uow.game_mut(match_id)?;
    game.status = status;
    game.winner_id = winner_id;
    game.completed_at = Some(completed_at);
    Ok(())
}

/// Fail unless `game` can still be settled
pub fn ensure_settleable(game: &Match) -> Result<()> {
    if game.status.is_terminal() {
        return Err(ArenaError::AlreadySettled { match_id: game.id }.into());
    }
    if game.status != MatchStatus::Ongoing {
        return Err(ArenaError::InvalidTransition {
            reason: format!(
                "match {} is {}, only ongoing matches can be settled",
                game.id, game.status
            ),
        }
        .into());
    }
    Ok(())
}

/// Delete a match that never got going
///
/// Refuses while any participant still has a fee debited for the match; those
/// fees must be refunded in the same unit of work first.
pub fn purge_abandoned_in(uow: &mut UnitOfWork<'_>, match_id: MatchId) -> Result<Match> {
    let game = uow.game(match_id)?;
    if game.status != MatchStatus::Waiting || game.fee_committed {
        return Err(ArenaError::InvalidTransition {
            reason: format!(
                "match {} is {} and cannot be purged",
                match_id, game.status
            ),
        }
        .into());
    }
    if let Some(participant_id) = game
        .participants()
        .into_iter()
        .find(|participant_id| unrefunded_fees(uow, participant_id, match_id) > 0)
    {
        return Err(ArenaError::InvalidTransition {
            reason: format!(
                "match {} holds a committed fee of {} and cannot be purged",
                match_id, participant_id
            ),
        }
        .into());
    }
    uow.delete_match(match_id)
}
