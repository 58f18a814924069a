//! Ledger guard
//!
//! Moves currency between available, locked and spent. Every operation locks
//! the participant row (and the match row it refers to), stages the balance
//! change together with its audit row, and commits both or neither.

pub mod escrow;

use crate::config::LedgerSettings;
use crate::error::{ArenaError, Result};
use crate::matches::scope_for;
use crate::rank::RankPolicy;
use crate::store::{transact, ArenaStore, LockScope};
use crate::types::{
    AvailableBalances, Currency, Eligibility, FeeCommit, FeeRelease, MatchId, Participant,
    Reservation,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Eligibility of `participant` for a ranked match at their current tier
pub fn eligibility_for(ranks: &RankPolicy, participant: &Participant) -> Eligibility {
    let required_fee = ranks.fee_for_rating(participant.rating);
    let tier = ranks.tier_for_rating(participant.rating);
    let available = AvailableBalances {
        gem: participant.available(Currency::Gem),
        coin: participant.available(Currency::Coin),
    };

    let gem_short = available.gem < required_fee;
    let coin_short = available.coin < required_fee;
    let can_play = !(gem_short && coin_short);

    let message = if can_play {
        format!("Can play ranked level {}", tier)
    } else {
        // cite whichever currency comes closest
        let (currency, closest) = if available.coin > available.gem {
            (Currency::Coin, available.coin)
        } else {
            (Currency::Gem, available.gem)
        };
        format!(
            "Not enough {} for ranked level {}: required {}, available {}",
            currency, tier, required_fee, closest
        )
    };

    Eligibility {
        participant_id: participant.id.clone(),
        can_play,
        required_fee,
        available,
        tier,
        rating: participant.rating,
        message,
    }
}

/// Describe how `currency` falls short of `fee`, for logs and errors
pub fn shortfall_message(eligibility: &Eligibility, currency: Currency, fee: u64) -> String {
    format!(
        "Not enough {} for ranked level {}: required {}, available {}",
        currency,
        eligibility.tier,
        fee,
        eligibility.available.get(currency)
    )
}

/// Reserve, commit and release of match fees
#[derive(Clone)]
pub struct LedgerGuard {
    store: Arc<dyn ArenaStore>,
    ranks: Arc<RankPolicy>,
    settings: LedgerSettings,
}

impl LedgerGuard {
    pub fn new(store: Arc<dyn ArenaStore>, ranks: Arc<RankPolicy>, settings: LedgerSettings) -> Self {
        Self {
            store,
            ranks,
            settings,
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Whether a participant can afford a ranked match at their tier
    pub async fn check_eligibility(&self, participant_id: &str) -> Result<Eligibility> {
        let participant = self
            .store
            .participant(participant_id)
            .await?
            .ok_or_else(|| ArenaError::ParticipantNotFound {
                participant_id: participant_id.to_string(),
            })?;

        let eligibility = eligibility_for(&self.ranks, &participant);
        debug!(
            "Eligibility for {}: can_play={} fee={} tier={}",
            participant_id, eligibility.can_play, eligibility.required_fee, eligibility.tier
        );
        Ok(eligibility)
    }

    /// Earmark `fee` for a match; fails with `InsufficientFunds` when short
    pub async fn reserve(
        &self,
        participant_id: &str,
        match_id: MatchId,
        fee: u64,
        currency: Currency,
    ) -> Result<Reservation> {
        let start = Instant::now();
        let scope = LockScope::new()
            .with_match(match_id)
            .with_participant(participant_id);
        let reject_duplicates = self.settings.reject_duplicate_reservations;

        let result = transact(self.store.as_ref(), scope, |uow| {
            escrow::reserve(uow, participant_id, match_id, fee, currency, reject_duplicates)
        })
        .await;

        match &result {
            Ok(reservation) => info!(
                "Reserved {} {} for {} in match {} (locked now {}) in {}ms",
                fee,
                currency,
                participant_id,
                match_id,
                reservation.locked_after,
                start.elapsed().as_millis()
            ),
            Err(e) => warn!(
                "Reservation of {} {} for {} in match {} failed: {}",
                fee, currency, participant_id, match_id, e
            ),
        }
        result
    }

    /// Debit a reserved fee; starts the match once every side has paid
    pub async fn commit(&self, participant_id: &str, match_id: MatchId) -> Result<FeeCommit> {
        let start = Instant::now();
        let game = self
            .store
            .find_match(match_id)
            .await?
            .ok_or(ArenaError::MatchNotFound { match_id })?;

        let scope = scope_for(&game).with_participant(participant_id);
        let result = transact(self.store.as_ref(), scope, |uow| {
            escrow::commit(uow, participant_id, match_id)
        })
        .await;

        match &result {
            Ok(commit) => info!(
                "Committed {} {} from {} for match {} (balance now {}, match committed: {}) in {}ms",
                commit.fee,
                commit.currency,
                participant_id,
                match_id,
                commit.remaining_balance,
                commit.match_fee_committed,
                start.elapsed().as_millis()
            ),
            Err(e) => warn!(
                "Commit for {} in match {} failed: {}",
                participant_id, match_id, e
            ),
        }
        result
    }

    /// Return a reserved fee to available; fails with `NothingReserved`
    pub async fn release(&self, participant_id: &str, match_id: MatchId) -> Result<FeeRelease> {
        let start = Instant::now();
        let scope = LockScope::new()
            .with_match(match_id)
            .with_participant(participant_id);

        let result = transact(self.store.as_ref(), scope, |uow| {
            escrow::release(uow, participant_id, match_id)
        })
        .await;

        match &result {
            Ok(release) => info!(
                "Released {} {} for {} in match {} (locked now {}) in {}ms",
                release.fee,
                release.currency,
                participant_id,
                match_id,
                release.remaining_locked,
                start.elapsed().as_millis()
            ),
            Err(e) => warn!(
                "Release for {} in match {} failed: {}",
                participant_id, match_id, e
            ),
        }
        result
    }
}
