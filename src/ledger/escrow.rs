//! Fee escrow steps that run inside a unit of work
//!
//! These functions only stage changes; the caller owns the unit of work and
//! decides when it commits. They are shared by [`super::LedgerGuard`] and by
//! orchestration steps that need escrow and match changes in one commit.

use crate::error::{ArenaError, Result};
use crate::matches;
use crate::store::UnitOfWork;
use crate::types::{
    Currency, FeeCommit, FeeRelease, MatchId, Reservation, TransactionId, TransactionKind,
    TransactionRecord, TransactionStatus,
};
use tracing::debug;

/// Earmark `fee` of `currency` for `participant_id` in `match_id`
pub fn reserve(
    uow: &mut UnitOfWork<'_>,
    participant_id: &str,
    match_id: MatchId,
    fee: u64,
    currency: Currency,
    reject_duplicates: bool,
) -> Result<Reservation> {
    uow.game(match_id)?;

    if reject_duplicates && !uow.pending_reservations(participant_id, match_id).is_empty() {
        return Err(ArenaError::DuplicateReservation {
            participant_id: participant_id.to_string(),
            match_id,
        }
        .into());
    }

    let participant = uow.participant_mut(participant_id)?;
    let balance = participant.wallet.get_mut(currency);
    let available = balance.available();
    if !balance.lock(fee) {
        return Err(ArenaError::InsufficientFunds {
            participant_id: participant_id.to_string(),
            currency,
            required: fee,
            available,
        }
        .into());
    }
    let locked_after = balance.locked;
    participant.touch();

    let transaction_id = uow.append_transaction(TransactionRecord::new(
        participant_id.to_string(),
        Some(match_id),
        TransactionKind::RankMatchFee,
        fee,
        currency,
        TransactionStatus::Pending,
        format!("Reserve {} {} for match {}", fee, currency, match_id),
    ));

    debug!(
        "Staged reservation of {} {} for {} in match {}",
        fee, currency, participant_id, match_id
    );

    Ok(Reservation {
        participant_id: participant_id.to_string(),
        match_id,
        currency,
        fee,
        locked_after,
        transaction_id,
    })
}

/// Debit a reserved fee and, once every side has paid, start the match
pub fn commit(
    uow: &mut UnitOfWork<'_>,
    participant_id: &str,
    match_id: MatchId,
) -> Result<FeeCommit> {
    let game = uow.game(match_id)?;
    let not_reserved = || -> anyhow::Error {
        ArenaError::NotReserved {
            participant_id: participant_id.to_string(),
            match_id,
        }
        .into()
    };

    if !game.fee_reserved {
        return Err(not_reserved());
    }
    let (fee, currency) = game.escrow().ok_or_else(not_reserved)?;
    let row_id = oldest_pending(uow, participant_id, match_id).ok_or_else(not_reserved)?;

    let participant = uow.participant_mut(participant_id)?;
    let balance = participant.wallet.get_mut(currency);
    let locked = balance.locked;
    if !balance.spend_locked(fee) {
        return Err(ArenaError::InsufficientFunds {
            participant_id: participant_id.to_string(),
            currency,
            required: fee,
            available: locked,
        }
        .into());
    }
    let remaining_balance = balance.balance;
    participant.touch();

    uow.update_transactions(
        |record| record.id == row_id,
        |record| {
            record.status = TransactionStatus::Completed;
            record.description = format!("Committed {} {} for match {}", fee, currency, match_id);
        },
    );

    let match_fee_committed = all_sides_committed(uow, match_id)?;
    if match_fee_committed {
        let game = uow.game_mut(match_id)?;
        game.fee_committed = true;
        if game.status == crate::types::MatchStatus::Waiting {
            matches::start_in(uow, match_id)?;
        }
    }

    Ok(FeeCommit {
        participant_id: participant_id.to_string(),
        match_id,
        currency,
        fee,
        remaining_balance,
        match_fee_committed,
    })
}

/// Return a reserved fee to available without debiting it
pub fn release(
    uow: &mut UnitOfWork<'_>,
    participant_id: &str,
    match_id: MatchId,
) -> Result<FeeRelease> {
    let game = uow.game(match_id)?;
    let nothing_reserved = || -> anyhow::Error {
        ArenaError::NothingReserved {
            participant_id: participant_id.to_string(),
            match_id,
        }
        .into()
    };

    let (fee, currency) = game.escrow().ok_or_else(nothing_reserved)?;
    let row_id = oldest_pending(uow, participant_id, match_id).ok_or_else(nothing_reserved)?;

    let participant = uow.participant_mut(participant_id)?;
    let balance = participant.wallet.get_mut(currency);
    if !balance.unlock(fee) {
        return Err(nothing_reserved());
    }
    let remaining_locked = balance.locked;
    participant.touch();

    uow.update_transactions(
        |record| record.id == row_id,
        |record| {
            record.status = TransactionStatus::Cancelled;
            record.description = format!("Released {} {} for match {}", fee, currency, match_id);
        },
    );

    Ok(FeeRelease {
        participant_id: participant_id.to_string(),
        match_id,
        currency,
        fee,
        remaining_locked,
    })
}

/// Credit back every committed fee of `participant_id` not yet refunded
///
/// Returns the amount refunded, zero when there was nothing to return. The
/// refund is recorded as a completed `RankMatchRefund` row.
pub fn refund(
    uow: &mut UnitOfWork<'_>,
    participant_id: &str,
    match_id: MatchId,
) -> Result<u64> {
    let game = uow.game(match_id)?;
    let Some((_, currency)) = game.escrow() else {
        return Ok(0);
    };

    let owed = unrefunded_fees(uow, participant_id, match_id);
    if owed == 0 {
        return Ok(0);
    }

    let participant = uow.participant_mut(participant_id)?;
    participant.wallet.get_mut(currency).credit(owed);
    participant.touch();

    uow.append_transaction(TransactionRecord::new(
        participant_id.to_string(),
        Some(match_id),
        TransactionKind::RankMatchRefund,
        owed,
        currency,
        TransactionStatus::Completed,
        format!("Refunded {} {} for abandoned match {}", owed, currency, match_id),
    ));

    debug!(
        "Staged refund of {} {} to {} for match {}",
        owed, currency, participant_id, match_id
    );
    Ok(owed)
}

/// Fees `participant_id` paid into `match_id` minus what was refunded
pub fn unrefunded_fees(uow: &UnitOfWork<'_>, participant_id: &str, match_id: MatchId) -> u64 {
    let (paid, refunded) = uow
        .match_transactions(match_id)
        .filter(|record| record.participant_id == participant_id)
        .fold((0u64, 0u64), |(paid, refunded), record| {
            match (record.kind, record.status) {
                (TransactionKind::RankMatchFee, TransactionStatus::Completed) => {
                    (paid.saturating_add(record.amount), refunded)
                }
                (TransactionKind::RankMatchRefund, _) => {
                    (paid, refunded.saturating_add(record.amount))
                }
                _ => (paid, refunded),
            }
        });
    paid.saturating_sub(refunded)
}

/// Oldest pending reservation row of the pair; each commit or release settles one
fn oldest_pending(
    uow: &UnitOfWork<'_>,
    participant_id: &str,
    match_id: MatchId,
) -> Option<TransactionId> {
    uow.pending_reservations(participant_id, match_id)
        .into_iter()
        .min_by_key(|record| record.created_at)
        .map(|record| record.id)
}

/// True when no reservation is pending and every side holds a completed one
fn all_sides_committed(uow: &UnitOfWork<'_>, match_id: MatchId) -> Result<bool> {
    let game = uow.game(match_id)?;
    let reservations: Vec<_> = uow
        .match_transactions(match_id)
        .filter(|record| record.kind == TransactionKind::RankMatchFee)
        .collect();

    if reservations
        .iter()
        .any(|record| record.status == TransactionStatus::Pending)
    {
        return Ok(false);
    }

    Ok(game.participants().iter().all(|participant_id| {
        reservations.iter().any(|record| {
            &record.participant_id == participant_id
                && record.status == TransactionStatus::Completed
        })
    }))
}
