//! Integration tests for the ranked-arena core
//!
//! These tests drive the public API end to end:
//! - The full ranked match lifecycle from eligibility to settlement
//! - Escrow arithmetic for reserve, commit and release
//! - Concurrent reservations and settlements
//! - Rollback on storage failure
//! - Promotions and expired reservation cleanup

mod fixtures;

use fixtures::{assert_balance_invariant, TestArena};
use futures::future::join_all;
use proptest::prelude::*;
use ranked_arena::config::{AppConfig, LedgerSettings};
use ranked_arena::error::{error_code, ArenaError};
use ranked_arena::matches::{MatchRecords, NewMatch};
use ranked_arena::rank::RankPolicy;
use ranked_arena::store::ArenaStore;
use ranked_arena::types::{
    Currency, MatchId, MatchStatus, TransactionKind, TransactionStatus,
};
use ranked_arena::LedgerGuard;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn create_ongoing_match(arena: &TestArena, white: &str, black: &str, fee: u64) -> MatchId {
    let game = arena
        .orchestrator
        .create_match(white, black, fee, Currency::Gem)
        .await
        .unwrap();
    arena.orchestrator.commit_match_fee(white, game.id).await.unwrap();
    arena.orchestrator.commit_match_fee(black, game.id).await.unwrap();
    game.id
}

#[tokio::test]
async fn test_complete_ranked_match_workflow() {
    let arena = TestArena::new().await;
    arena.add_participant("white", 1200, 100, 0).await;
    arena.add_participant("black", 1200, 100, 0).await;

    // Step 1: both sides can afford their tier
    for id in ["white", "black"] {
        let eligibility = arena.orchestrator.check_rank_eligibility(id).await.unwrap();
        assert!(eligibility.can_play);
        assert_eq!(eligibility.required_fee, 4);
        assert_eq!(eligibility.message, "Can play ranked level 3");
    }

    // Step 2: create the match, reserving from both
    let game = arena
        .orchestrator
        .create_match("white", "black", 4, Currency::Gem)
        .await
        .unwrap();
    let status = arena.orchestrator.fee_status(game.id).await.unwrap();
    assert!(status.fee_reserved);
    assert_eq!(status.status, MatchStatus::Waiting);
    assert_eq!(arena.participant("white").await.wallet.gem.locked, 4);

    // Step 3: both commit, the match starts
    arena.orchestrator.commit_match_fee("white", game.id).await.unwrap();
    let commit = arena.orchestrator.commit_match_fee("black", game.id).await.unwrap();
    assert!(commit.match_fee_committed);

    let white = arena.participant("white").await;
    assert_eq!(white.wallet.gem.balance, 96);
    assert_eq!(white.wallet.gem.locked, 0);

    // Step 4: the client reports the winner
    let report = arena
        .orchestrator
        .process_match_result(game.id, "white", json!(["d4", "d5"]), json!({"clock": 300}))
        .await
        .unwrap();
    assert_eq!(report.status, MatchStatus::Win);
    assert_eq!(report.rating_changes.len(), 2);
    assert_eq!(report.rating_changes[0].delta, 12);
    assert_eq!(report.rating_changes[1].delta, -12);

    let history = arena.orchestrator.match_history(game.id).await.unwrap();
    assert_eq!(history.game.ratings.white_before, Some(1200));
    assert_eq!(history.game.ratings.white_after, Some(1212));
    assert_eq!(history.game.ratings.black_after, Some(1188));
    assert!(history.game.completed_at.is_some());
    assert_eq!(history.entries.len(), 1);
    assert_eq!(history.entries[0].content["moves"], json!(["d4", "d5"]));

    let profile = arena.orchestrator.profile("white").await.unwrap();
    assert_eq!(profile.wins, 1);
    assert_eq!(profile.total_matches, 1);
    assert_eq!(profile.win_rate, 100.0);

    assert_balance_invariant(&arena.store);
}

#[tokio::test]
async fn test_reserve_then_release_leaves_balance_unchanged() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 300, 0, 10).await;
    arena.add_participant("bob", 300, 0, 10).await;

    let game = arena
        .orchestrator
        .create_match("amy", "bob", 1, Currency::Coin)
        .await
        .unwrap();
    arena.orchestrator.release_match_fee("amy", game.id).await.unwrap();

    let amy = arena.participant("amy").await;
    assert_eq!(amy.wallet.coin.balance, 10);
    assert_eq!(amy.wallet.coin.locked, 0);

    let history = arena
        .orchestrator
        .transaction_history("amy", None)
        .await
        .unwrap();
    assert_eq!(history.transactions[0].status, TransactionStatus::Cancelled);
    assert_eq!(history.transactions[0].kind, TransactionKind::RankMatchFee);
}

#[tokio::test]
async fn test_commit_without_reservation_fails() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 1200, 20, 0).await;
    arena.add_participant("bob", 1200, 20, 0).await;

    let records = MatchRecords::new(arena.store.clone());
    let game = records
        .create(NewMatch::ranked("amy", "bob", 4, Currency::Gem))
        .await
        .unwrap();

    let err = arena
        .orchestrator
        .commit_match_fee("amy", game.id)
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), "not_reserved");

    let amy = arena.participant("amy").await;
    assert_eq!(amy.wallet.gem.balance, 20);
    assert_eq!(amy.wallet.gem.locked, 0);
}

#[tokio::test]
async fn test_ineligible_participant_gets_descriptive_message() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 1600, 5, 5).await;

    let eligibility = arena.orchestrator.check_rank_eligibility("amy").await.unwrap();
    assert!(!eligibility.can_play);
    assert_eq!(eligibility.required_fee, 8);
    assert!(eligibility.message.contains("required 8"));
    assert!(eligibility.message.contains("available 5"));
}

#[tokio::test]
async fn test_concurrent_settlements_apply_once() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 1200, 50, 0).await;
    arena.add_participant("bob", 1200, 50, 0).await;
    let match_id = create_ongoing_match(&arena, "amy", "bob", 4).await;

    let attempts = (0..8).map(|i| {
        let orchestrator = arena.orchestrator.clone();
        let winner = if i % 2 == 0 { "amy" } else { "bob" };
        async move {
            orchestrator
                .process_match_result(match_id, winner, json!([]), json!({}))
                .await
        }
    });
    let results = join_all(attempts).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            ArenaError::classify(err),
            Some(ArenaError::AlreadySettled { .. })
        ));
    }

    let amy = arena.participant("amy").await;
    let bob = arena.participant("bob").await;
    assert_eq!(amy.total_matches, 1);
    assert_eq!(bob.total_matches, 1);
    assert_eq!(amy.rating + bob.rating, 2400);
    assert_eq!(arena.store.match_history(match_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_reservations_never_overdraw() {
    let arena = TestArena::new().await;
    let store = arena.store.clone();
    arena.add_participant("amy", 1200, 10, 0).await;
    arena.add_participant("bob", 1200, 100, 0).await;

    let records = MatchRecords::new(store.clone());
    let mut match_ids = Vec::new();
    for _ in 0..6 {
        let game = records
            .create(NewMatch::ranked("amy", "bob", 4, Currency::Gem))
            .await
            .unwrap();
        match_ids.push(game.id);
    }

    let ledger = Arc::new(LedgerGuard::new(
        store.clone(),
        Arc::new(RankPolicy::standard()),
        LedgerSettings::default(),
    ));
    let handles: Vec<_> = match_ids
        .iter()
        .map(|&match_id| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.reserve("amy", match_id, 4, Currency::Gem).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in join_all(handles).await {
        match handle.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_eq!(error_code(&e), "insufficient_funds"),
        }
    }

    assert_eq!(succeeded, 2);
    let amy = arena.participant("amy").await;
    assert_eq!(amy.wallet.gem.locked, 8);
    assert_eq!(amy.wallet.gem.balance, 10);
    assert_balance_invariant(&store);
}

#[tokio::test]
async fn test_failed_commit_leaves_state_unchanged() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 1200, 50, 0).await;
    arena.add_participant("bob", 1200, 50, 0).await;
    let match_id = create_ongoing_match(&arena, "amy", "bob", 4).await;

    let participants_before = arena.store.all_participants().unwrap();
    let transactions_before = arena.store.all_transactions().unwrap();
    let stats_before = arena.store.stats().await.unwrap();

    arena.store.fail_next_commit();
    let err = arena
        .orchestrator
        .process_match_result(match_id, "amy", json!([]), json!({}))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), "storage_failure");

    assert_eq!(arena.store.all_participants().unwrap(), participants_before);
    assert_eq!(arena.store.all_transactions().unwrap(), transactions_before);
    assert_eq!(arena.store.stats().await.unwrap(), stats_before);
    let status = arena.orchestrator.fee_status(match_id).await.unwrap();
    assert_eq!(status.status, MatchStatus::Ongoing);

    // the caller may retry once the store recovers
    arena
        .orchestrator
        .process_match_result(match_id, "amy", json!([]), json!({}))
        .await
        .unwrap();
    assert_eq!(arena.participant("amy").await.rating, 1212);
}

#[tokio::test]
async fn test_duplicate_reservation_guard() {
    let mut config = AppConfig::default();
    config.ledger.reject_duplicate_reservations = true;
    let arena = TestArena::with_config(config).await;
    arena.add_participant("amy", 1200, 50, 0).await;
    arena.add_participant("bob", 1200, 50, 0).await;

    let game = arena
        .orchestrator
        .create_match("amy", "bob", 4, Currency::Gem)
        .await
        .unwrap();

    let ledger = LedgerGuard::new(
        arena.store.clone(),
        Arc::new(RankPolicy::standard()),
        LedgerSettings {
            reject_duplicate_reservations: true,
        },
    );
    let err = ledger
        .reserve("amy", game.id, 4, Currency::Gem)
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), "duplicate_reservation");
    assert_eq!(arena.participant("amy").await.wallet.gem.locked, 4);
}

#[tokio::test]
async fn test_duplicate_reservation_allowed_by_default() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 1200, 50, 0).await;
    arena.add_participant("bob", 1200, 50, 0).await;

    let game = arena
        .orchestrator
        .create_match("amy", "bob", 4, Currency::Gem)
        .await
        .unwrap();

    let ledger = LedgerGuard::new(
        arena.store.clone(),
        Arc::new(RankPolicy::standard()),
        LedgerSettings::default(),
    );
    ledger.reserve("amy", game.id, 4, Currency::Gem).await.unwrap();
    assert_eq!(arena.participant("amy").await.wallet.gem.locked, 8);
}

#[tokio::test]
async fn test_promotion_on_tier_boundary() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 1095, 10, 0).await;
    arena.add_participant("bob", 1095, 10, 0).await;
    assert_eq!(arena.participant("amy").await.rank_level, 2);

    let match_id = create_ongoing_match(&arena, "amy", "bob", 2).await;
    let report = arena
        .orchestrator
        .process_match_result(match_id, "amy", json!([]), json!({}))
        .await
        .unwrap();

    assert_eq!(report.promotions.len(), 1);
    assert_eq!(report.promotions[0].to_level, 3);

    let amy = arena.participant("amy").await;
    assert_eq!(amy.rank_level, 3);
    // 10 - 2 fee + 20 reward
    assert_eq!(amy.wallet.gem.balance, 28);

    let rewards: Vec<_> = arena
        .store
        .participant_transactions("amy")
        .await
        .unwrap()
        .into_iter()
        .filter(|record| record.kind == TransactionKind::PromotionReward)
        .collect();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].amount, 20);
    assert_eq!(rewards[0].status, TransactionStatus::Completed);

    let bob = arena.participant("bob").await;
    assert_eq!(bob.rank_level, 2);
}

#[tokio::test]
async fn test_expired_reservations_are_released_and_purged() {
    let arena = TestArena::new().await;
    arena.add_participant("amy", 1200, 50, 0).await;
    arena.add_participant("bob", 1200, 50, 0).await;
    arena.add_participant("cat", 1200, 50, 0).await;

    let abandoned = arena
        .orchestrator
        .create_match("amy", "bob", 4, Currency::Gem)
        .await
        .unwrap();
    arena.orchestrator.release_match_fee("bob", abandoned.id).await.unwrap();
    let started = create_ongoing_match(&arena, "amy", "cat", 4).await;

    let cleaned = arena
        .orchestrator
        .cleanup_expired_reservations(Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(cleaned, 1);

    let amy = arena.participant("amy").await;
    assert_eq!(amy.wallet.gem.locked, 0);
    assert_eq!(amy.wallet.gem.balance, 46);
    assert!(arena.store.find_match(abandoned.id).await.unwrap().is_none());
    assert!(arena.store.find_match(started).await.unwrap().is_some());
    assert_eq!(
        arena.orchestrator.reserved_matches_info().unwrap().total_reserved,
        0
    );
    assert_balance_invariant(&arena.store);
}

#[derive(Debug, Clone)]
enum EscrowOp {
    Reserve(usize),
    Commit(usize),
    Release(usize),
}

fn escrow_op() -> impl Strategy<Value = EscrowOp> {
    prop_oneof![
        (0..4usize).prop_map(EscrowOp::Reserve),
        (0..4usize).prop_map(EscrowOp::Commit),
        (0..4usize).prop_map(EscrowOp::Release),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_escrow_keeps_locked_within_balance(ops in prop::collection::vec(escrow_op(), 1..24)) {
        tokio_test::block_on(async {
            let arena = TestArena::new().await;
            arena.add_participant("amy", 1200, 30, 30).await;
            arena.add_participant("bob", 1200, 30, 30).await;

            let records = MatchRecords::new(arena.store.clone());
            let mut games = Vec::new();
            for i in 0..4u64 {
                let currency = if i % 2 == 0 { Currency::Gem } else { Currency::Coin };
                let game = records
                    .create(NewMatch::ranked("amy", "bob", i * 3 + 2, currency))
                    .await
                    .unwrap();
                records.mark_fee_reserved(game.id).await.unwrap();
                games.push((game.id, i * 3 + 2, currency));
            }

            let ledger = LedgerGuard::new(
                arena.store.clone(),
                Arc::new(RankPolicy::standard()),
                LedgerSettings { reject_duplicate_reservations: true },
            );

            let mut pending = [false; 4];
            let mut spent = [0u64; 2];
            for op in ops {
                match op {
                    EscrowOp::Reserve(i) => {
                        let (match_id, fee, currency) = games[i];
                        if ledger.reserve("amy", match_id, fee, currency).await.is_ok() {
                            assert!(!pending[i]);
                            pending[i] = true;
                        }
                    }
                    EscrowOp::Commit(i) => {
                        let (match_id, fee, currency) = games[i];
                        let committed = ledger.commit("amy", match_id).await.is_ok();
                        assert_eq!(committed, pending[i]);
                        if committed {
                            pending[i] = false;
                            spent[(currency == Currency::Coin) as usize] += fee;
                        }
                    }
                    EscrowOp::Release(i) => {
                        let (match_id, _, _) = games[i];
                        let released = ledger.release("amy", match_id).await.is_ok();
                        assert_eq!(released, pending[i]);
                        pending[i] = false;
                    }
                }

                assert_balance_invariant(&arena.store);
                let amy = arena.participant("amy").await;
                for (slot, currency) in [(0, Currency::Gem), (1, Currency::Coin)] {
                    let mut expected_locked = 0;
                    for (i, &(_, fee, game_currency)) in games.iter().enumerate() {
                        if pending[i] && game_currency == currency {
                            expected_locked += fee;
                        }
                    }
                    let balance = amy.wallet.get(currency);
                    assert_eq!(balance.locked, expected_locked);
                    assert_eq!(balance.balance, 30 - spent[slot]);
                }
            }
        });
    }
}
