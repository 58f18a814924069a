//! Settlement engine
//!
//! Applies a declared outcome to a match exactly once. Ratings, statistics,
//! promotions, the terminal status and the history entry are all staged in one
//! unit of work holding the match row and both participant rows, so either the
//! whole settlement lands or none of it does.

use crate::error::{ArenaError, Result};
use crate::matches::{ensure_settleable, finalize_in, scope_for};
use crate::rank::{PromotionPolicy, RankPolicy};
use crate::settlement::elo::RatingCalculator;
use crate::settlement::stats::{record_result, PersonalResult};
use crate::store::{transact, ArenaStore, UnitOfWork};
use crate::types::{
    Currency, MatchHistoryEntry, MatchId, MatchKind, MatchOutcome, ParticipantId, Promotion,
    RatingChange, SettlementReport, TransactionKind, TransactionRecord, TransactionStatus,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the game client reported at the end of a match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub moves: serde_json::Value,
    pub game_data: serde_json::Value,
}

impl ResultPayload {
    pub fn new(moves: serde_json::Value, game_data: serde_json::Value) -> Self {
        Self { moves, game_data }
    }

    fn history_content(
        &self,
        outcome: MatchOutcome,
        winner_id: Option<&ParticipantId>,
        completed_at: DateTime<Utc>,
    ) -> serde_json::Value {
        serde_json::json!({
            "outcome": outcome,
            "winner": winner_id,
            "moves": self.moves,
            "game_data": self.game_data,
            "completed_at": completed_at,
        })
    }
}

/// Settles finished matches
pub struct SettlementEngine {
    store: Arc<dyn ArenaStore>,
    ranks: Arc<RankPolicy>,
    promotion: PromotionPolicy,
    calculator: Arc<dyn RatingCalculator>,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn ArenaStore>,
        ranks: Arc<RankPolicy>,
        promotion: PromotionPolicy,
        calculator: Arc<dyn RatingCalculator>,
    ) -> Self {
        Self {
            store,
            ranks,
            promotion,
            calculator,
        }
    }

    pub fn calculator(&self) -> &Arc<dyn RatingCalculator> {
        &self.calculator
    }

    /// Settle `match_id` with an outcome relative to the white participant
    pub async fn settle(
        &self,
        match_id: MatchId,
        outcome: MatchOutcome,
        payload: ResultPayload,
    ) -> Result<SettlementReport> {
        let start = Instant::now();
        let game = self
            .store
            .find_match(match_id)
            .await?
            .ok_or(ArenaError::MatchNotFound { match_id })?;
        let scope = scope_for(&game);

        let result = transact(self.store.as_ref(), scope, |uow| {
            self.settle_in(uow, match_id, outcome, &payload)
        })
        .await;

        match &result {
            Ok(report) => info!(
                "Settled match {} as {} ({} rating changes, {} promotions) in {}ms",
                match_id,
                report.status,
                report.rating_changes.len(),
                report.promotions.len(),
                start.elapsed().as_millis()
            ),
            Err(e) => warn!("Settlement of match {} failed: {}", match_id, e),
        }
        result
    }

    /// Parse a declared outcome string and settle
    pub async fn settle_declared(
        &self,
        match_id: MatchId,
        declared: &str,
        payload: ResultPayload,
    ) -> Result<SettlementReport> {
        let outcome: MatchOutcome = declared.parse()?;
        self.settle(match_id, outcome, payload).await
    }

    /// Stage a full settlement inside `uow`
    pub fn settle_in(
        &self,
        uow: &mut UnitOfWork<'_>,
        match_id: MatchId,
        outcome: MatchOutcome,
        payload: &ResultPayload,
    ) -> Result<SettlementReport> {
        let game = uow.game(match_id)?.clone();
        ensure_settleable(&game)?;

        let completed_at = current_timestamp();
        let winner_id = match outcome {
            MatchOutcome::Win => Some(game.white_id.clone()),
            MatchOutcome::Lose => game.black_id.clone(),
            MatchOutcome::Draw => None,
        };

        let mut rating_changes = Vec::new();
        let mut promotions = Vec::new();

        if game.kind == MatchKind::Ranked {
            let black_id = game.black_id.clone().ok_or_else(|| ArenaError::InvalidTransition {
                reason: format!("ranked match {} has no black participant", match_id),
            })?;

            let white_before = uow.participant(&game.white_id)?.rating;
            let black_before = uow.participant(&black_id)?.rating;
            let update = self
                .calculator
                .calculate(white_before, black_before, outcome)?;

            let (white_result, black_result) = match outcome {
                MatchOutcome::Win => (PersonalResult::Won, PersonalResult::Lost),
                MatchOutcome::Lose => (PersonalResult::Lost, PersonalResult::Won),
                MatchOutcome::Draw => (PersonalResult::Drew, PersonalResult::Drew),
            };

            for (participant_id, rating, result) in [
                (&game.white_id, update.white, white_result),
                (&black_id, update.black, black_result),
            ] {
                let participant = uow.participant_mut(participant_id)?;
                participant.rating = rating;
                record_result(participant, result);
                if let Some(promotion) = self.apply_promotion(uow, participant_id, match_id)? {
                    promotions.push(promotion);
                }
            }

            rating_changes.push(RatingChange::new(
                game.white_id.clone(),
                white_before,
                update.white,
            ));
            rating_changes.push(RatingChange::new(black_id, black_before, update.black));

            let stored = uow.game_mut(match_id)?;
            stored.ratings.white_before = stored.ratings.white_before.or(Some(white_before));
            stored.ratings.black_before = stored.ratings.black_before.or(Some(black_before));
            stored.ratings.white_after = Some(update.white);
            stored.ratings.black_after = Some(update.black);

            debug!(
                "Match {} ratings: white {} -> {}, black {} -> {}",
                match_id, white_before, update.white, black_before, update.black
            );
        }

        finalize_in(
            uow,
            match_id,
            outcome.status(),
            winner_id.clone(),
            completed_at,
        )?;

        let history_id = uow.append_history(MatchHistoryEntry::new(
            match_id,
            payload.history_content(outcome, winner_id.as_ref(), completed_at),
        ));

        Ok(SettlementReport {
            match_id,
            status: outcome.status(),
            winner_id,
            rating_changes,
            promotions,
            history_id,
            completed_at,
        })
    }

    /// Raise the participant's level if earned and pay one reward per level
    fn apply_promotion(
        &self,
        uow: &mut UnitOfWork<'_>,
        participant_id: &str,
        match_id: MatchId,
    ) -> Result<Option<Promotion>> {
        let participant = uow.participant(participant_id)?;
        let from_level = participant.rank_level;
        let to_level = self.promotion.next_level(&self.ranks, participant);
        if to_level <= from_level {
            return Ok(None);
        }

        let mut reward_gem = 0;
        for level in (from_level + 1)..=to_level {
            let reward = self.promotion.reward_for(level);
            if reward == 0 {
                continue;
            }
            reward_gem += reward;
            uow.append_transaction(TransactionRecord::new(
                participant_id.to_string(),
                Some(match_id),
                TransactionKind::PromotionReward,
                reward,
                Currency::Gem,
                TransactionStatus::Completed,
                format!("Promotion reward for reaching rank level {}", level),
            ));
        }

        let participant = uow.participant_mut(participant_id)?;
        participant.rank_level = to_level;
        participant.wallet.gem.credit(reward_gem);

        info!(
            "Participant {} promoted from level {} to {} (+{} gem)",
            participant_id, from_level, to_level, reward_gem
        );

        Ok(Some(Promotion {
            participant_id: participant_id.to_string(),
            from_level,
            to_level,
            reward_gem,
        }))
    }
}
