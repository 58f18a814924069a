//! Matchmaking orchestrator
//!
//! The façade the game client talks to. It sequences the ledger guard, the
//! match record store and the settlement engine: eligibility, match creation
//! with fee reservation for both sides, commit on start, release on cancel,
//! result ingestion and the read-only projections built on top of them.

use crate::config::AppConfig;
use crate::error::{error_code, ArenaError, Result};
use crate::ledger::{escrow, shortfall_message, LedgerGuard};
use crate::matches::{
    create_in, mark_fee_reserved_in, purge_abandoned_in, scope_for, MatchRecords, NewMatch,
};
use crate::matchmaking::monitor::{ReservationEntry, ReservationMonitor};
use crate::metrics::MetricsCollector;
use crate::rank::RankPolicy;
use crate::settlement::{ResultPayload, SettlementEngine, TieredEloCalculator};
use crate::store::{transact, ArenaStore, LockScope};
use crate::types::{
    Currency, Eligibility, FeeCommit, FeeRelease, FeeStatus, Match, MatchHistoryEntry,
    MatchHistoryView, MatchId, MatchOutcome, MatchStatus, Participant,
    ParticipantProfile, ReservedMatchesInfo, SettlementReport, TransactionHistory,
    TransactionStatus,
};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Statistics about orchestrator operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    /// Total number of matches created
    pub matches_created: u64,
    /// Total number of fee reservations made
    pub reservations: u64,
    /// Total number of fees committed
    pub commits: u64,
    /// Total number of reservations released by callers
    pub releases: u64,
    /// Total number of matches settled
    pub settlements: u64,
    /// Total number of expired reservations cleaned up
    pub expired_cleaned: u64,
    /// Matches currently tracked by the reservation monitor
    pub in_flight_reservations: usize,
}

/// The matchmaking orchestrator
pub struct MatchmakingOrchestrator {
    store: Arc<dyn ArenaStore>,
    ranks: Arc<RankPolicy>,
    ledger: LedgerGuard,
    records: MatchRecords,
    settlement: SettlementEngine,
    monitor: ReservationMonitor,
    stats: Arc<RwLock<OrchestratorStats>>,
    metrics_collector: Arc<MetricsCollector>,
    config: AppConfig,
}

impl MatchmakingOrchestrator {
    /// Create an orchestrator with its own metrics registry
    pub fn new(store: Arc<dyn ArenaStore>, config: &AppConfig) -> Result<Self> {
        let metrics_collector = Arc::new(MetricsCollector::new()?);
        Self::with_metrics(store, config, metrics_collector)
    }

    /// Create an orchestrator reporting into `metrics_collector`
    pub fn with_metrics(
        store: Arc<dyn ArenaStore>,
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let ranks = Arc::new(config.rank.policy()?);
        let calculator = Arc::new(TieredEloCalculator::new(config.rating.clone())?);

        Ok(Self {
            ledger: LedgerGuard::new(store.clone(), ranks.clone(), config.ledger),
            records: MatchRecords::new(store.clone()),
            settlement: SettlementEngine::new(
                store.clone(),
                ranks.clone(),
                config.rank.promotion.clone(),
                calculator,
            ),
            store,
            ranks,
            monitor: ReservationMonitor::new(),
            stats: Arc::new(RwLock::new(OrchestratorStats::default())),
            metrics_collector,
            config: config.clone(),
        })
    }

    pub fn store(&self) -> &Arc<dyn ArenaStore> {
        &self.store
    }

    pub fn ranks(&self) -> &RankPolicy {
        &self.ranks
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    /// Register a participant account
    pub async fn register_participant(&self, participant: Participant) -> Result<()> {
        let participant_id = participant.id.clone();
        self.store.insert_participant(participant).await?;
        info!("Registered participant {}", participant_id);
        Ok(())
    }

    pub async fn check_rank_eligibility(&self, participant_id: &str) -> Result<Eligibility> {
        let start = Instant::now();
        let result = self.ledger.check_eligibility(participant_id).await;
        self.observe("check_eligibility", start, &result);
        result
    }

    /// Open a ranked match and reserve `fee` from both participants
    ///
    /// Both participants must be eligible at their tier and able to cover `fee`
    /// in `currency`, otherwise nothing is created. The match row, both
    /// reservations and the reserved flag commit together or not at all.
    pub async fn create_match(
        &self,
        white_id: &str,
        black_id: &str,
        fee: u64,
        currency: Currency,
    ) -> Result<Match> {
        let start = Instant::now();
        let result = self.create_ranked(white_id, black_id, fee, currency).await;
        self.observe("create_match", start, &result);
        result
    }

    async fn create_ranked(
        &self,
        white_id: &str,
        black_id: &str,
        fee: u64,
        currency: Currency,
    ) -> Result<Match> {
        let mut shortfalls = Vec::new();
        for participant_id in [white_id, black_id] {
            let eligibility = self.ledger.check_eligibility(participant_id).await?;
            if !eligibility.can_play {
                shortfalls.push(format!("{}: {}", participant_id, eligibility.message));
            } else if eligibility.available.get(currency) < fee {
                shortfalls.push(format!(
                    "{}: {}",
                    participant_id,
                    shortfall_message(&eligibility, currency, fee)
                ));
            }
        }
        if !shortfalls.is_empty() {
            return Err(ArenaError::EligibilityFailed {
                details: shortfalls.join("; "),
            }
            .into());
        }

        let reject_duplicates = self.ledger.settings().reject_duplicate_reservations;
        let scope = LockScope::new().with_participants([white_id, black_id]);
        let game = transact(self.store.as_ref(), scope, |uow| {
            let game = create_in(uow, NewMatch::ranked(white_id, black_id, fee, currency))?;
            for participant_id in [white_id, black_id] {
                escrow::reserve(uow, participant_id, game.id, fee, currency, reject_duplicates)?;
            }
            mark_fee_reserved_in(uow, game.id)?;
            Ok(uow.game(game.id)?.clone())
        })
        .await?;

        for _ in 0..2 {
            self.metrics_collector.record_reservation(currency);
        }
        self.with_stats(|stats| {
            stats.matches_created += 1;
            stats.reservations += 2;
        })?;
        self.monitor.register(ReservationEntry {
            match_id: game.id,
            participants: game.participants(),
            fee,
            currency,
            reserved_at: current_timestamp(),
        })?;
        self.refresh_in_flight()?;

        info!(
            "Created ranked match {} ({} vs {}) with {} {} reserved from each side",
            game.id, white_id, black_id, fee, currency
        );
        Ok(game)
    }

    /// Open a casual match; no fee and no rating change
    pub async fn create_casual_match(
        &self,
        white_id: &str,
        black_id: Option<&str>,
    ) -> Result<Match> {
        let start = Instant::now();
        let request = NewMatch::casual(white_id, black_id.map(str::to_string));
        let result = self.records.create(request).await;
        if result.is_ok() {
            self.with_stats(|stats| stats.matches_created += 1)?;
        }
        self.observe("create_casual_match", start, &result);
        result
    }

    pub async fn commit_match_fee(
        &self,
        participant_id: &str,
        match_id: MatchId,
    ) -> Result<FeeCommit> {
        let start = Instant::now();
        let result = self.ledger.commit(participant_id, match_id).await;
        if let Ok(commit) = &result {
            self.metrics_collector.record_commit(commit.currency);
            self.with_stats(|stats| stats.commits += 1)?;
            if commit.match_fee_committed {
                self.monitor.remove(match_id)?;
                self.refresh_in_flight()?;
            }
        }
        self.observe("commit_match_fee", start, &result);
        result
    }

    pub async fn release_match_fee(
        &self,
        participant_id: &str,
        match_id: MatchId,
    ) -> Result<FeeRelease> {
        let start = Instant::now();
        let result = self.ledger.release(participant_id, match_id).await;
        if result.is_ok() {
            self.metrics_collector.record_release("cancelled");
            self.with_stats(|stats| stats.releases += 1)?;

            let still_pending = self
                .store
                .match_transactions(match_id)
                .await?
                .iter()
                .any(|record| record.status == TransactionStatus::Pending);
            if !still_pending {
                self.monitor.remove(match_id)?;
                self.refresh_in_flight()?;
            }
        }
        self.observe("release_match_fee", start, &result);
        result
    }

    /// Explicit start signal for a waiting match
    pub async fn start_match(&self, match_id: MatchId) -> Result<Match> {
        let start = Instant::now();
        let result = self.records.start(match_id).await;
        self.observe("start_match", start, &result);
        result
    }

    /// Settle a decisive result reported as the winner's id
    pub async fn process_match_result(
        &self,
        match_id: MatchId,
        winner_id: &str,
        moves: serde_json::Value,
        game_data: serde_json::Value,
    ) -> Result<SettlementReport> {
        let start = Instant::now();
        let result = async {
            let game = self.records.get(match_id).await?;
            let outcome = outcome_for_winner(&game, winner_id)?;
            self.settle(game, outcome, ResultPayload::new(moves, game_data))
                .await
        }
        .await;
        self.observe("process_match_result", start, &result);
        result
    }

    pub async fn process_draw(
        &self,
        match_id: MatchId,
        moves: serde_json::Value,
        game_data: serde_json::Value,
    ) -> Result<SettlementReport> {
        let start = Instant::now();
        let result = async {
            let game = self.records.get(match_id).await?;
            self.settle(game, MatchOutcome::Draw, ResultPayload::new(moves, game_data))
                .await
        }
        .await;
        self.observe("process_draw", start, &result);
        result
    }

    async fn settle(
        &self,
        game: Match,
        outcome: MatchOutcome,
        payload: ResultPayload,
    ) -> Result<SettlementReport> {
        let start = Instant::now();
        let report = self.settlement.settle(game.id, outcome, payload).await?;

        self.metrics_collector.record_settlement(
            game.kind,
            report.status,
            report.promotions.len(),
            start.elapsed(),
        );
        self.with_stats(|stats| stats.settlements += 1)?;
        if self.monitor.remove(game.id)?.is_some() {
            self.refresh_in_flight()?;
        }
        Ok(report)
    }

    /// Fee projection of one match, audit rows newest first
    pub async fn fee_status(&self, match_id: MatchId) -> Result<FeeStatus> {
        let game = self.records.get(match_id).await?;
        let mut transactions = self.store.match_transactions(match_id).await?;
        transactions.reverse();

        Ok(FeeStatus {
            match_id,
            status: game.status,
            fee_reserved: game.fee_reserved,
            fee_committed: game.fee_committed,
            fee: game.fee,
            currency: game.currency,
            created_at: game.created_at,
            started_at: game.started_at,
            completed_at: game.completed_at,
            transactions,
        })
    }

    /// Most recent audit rows of a participant, newest first
    ///
    /// `limit` defaults to the configured history page size.
    pub async fn transaction_history(
        &self,
        participant_id: &str,
        limit: Option<usize>,
    ) -> Result<TransactionHistory> {
        self.find_participant(participant_id).await?;
        let limit = limit.unwrap_or(self.config.matchmaking.history_page_size);

        let mut transactions = self.store.participant_transactions(participant_id).await?;
        transactions.reverse();
        transactions.truncate(limit);
        debug!(
            "Returning {} transactions for {}",
            transactions.len(),
            participant_id
        );

        Ok(TransactionHistory {
            participant_id: participant_id.to_string(),
            total_transactions: transactions.len(),
            transactions,
        })
    }

    pub async fn profile(&self, participant_id: &str) -> Result<ParticipantProfile> {
        let participant = self.find_participant(participant_id).await?;
        Ok(ParticipantProfile::from(&participant))
    }

    pub async fn match_history(&self, match_id: MatchId) -> Result<MatchHistoryView> {
        let game = self.records.get(match_id).await?;
        let entries = self.store.match_history(match_id).await?;
        Ok(MatchHistoryView { game, entries })
    }

    /// Append a history entry to an existing match
    pub async fn save_match_history(
        &self,
        match_id: MatchId,
        content: serde_json::Value,
    ) -> Result<MatchHistoryEntry> {
        let scope = LockScope::new().with_match(match_id);
        let entry = transact(self.store.as_ref(), scope, |uow| {
            uow.game(match_id)?;
            let entry = MatchHistoryEntry::new(match_id, content);
            uow.append_history(entry.clone());
            Ok(entry)
        })
        .await?;
        debug!("Saved history entry {} for match {}", entry.id, match_id);
        Ok(entry)
    }

    /// Read-only view of in-flight reservations
    pub fn reserved_matches_info(&self) -> Result<ReservedMatchesInfo> {
        self.monitor.info()
    }

    /// Release and purge reservations older than `max_age` whose match never started
    pub async fn cleanup_expired_reservations(&self, max_age: Duration) -> Result<usize> {
        let expired = self.monitor.expired(max_age, current_timestamp())?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut cleaned = 0;
        for entry in expired {
            match self.cleanup_reservation(&entry).await {
                Ok(true) => cleaned += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        "Failed to clean up expired reservation for match {}: {}",
                        entry.match_id, e
                    );
                    continue;
                }
            }
            self.monitor.remove(entry.match_id)?;
        }

        self.with_stats(|stats| stats.expired_cleaned += cleaned as u64)?;
        self.metrics_collector.record_expired_reservations(cleaned);
        self.refresh_in_flight()?;

        if cleaned > 0 {
            info!("Cleaned up {} expired reservations", cleaned);
        }
        Ok(cleaned)
    }

    /// Returns whether anything was released and purged
    async fn cleanup_reservation(&self, entry: &ReservationEntry) -> Result<bool> {
        let match_id = entry.match_id;
        let Some(game) = self.store.find_match(match_id).await? else {
            debug!("Expired reservation for match {} has no match left", match_id);
            return Ok(false);
        };
        if game.status != MatchStatus::Waiting {
            debug!(
                "Expired reservation for match {} skipped, match is {}",
                match_id, game.status
            );
            return Ok(false);
        }

        let (released, refunded) = transact(self.store.as_ref(), scope_for(&game), |uow| {
            let mut released = 0;
            let mut refunded = 0;
            for participant_id in game.participants() {
                while !uow.pending_reservations(&participant_id, match_id).is_empty() {
                    escrow::release(uow, &participant_id, match_id)?;
                    released += 1;
                }
                if escrow::refund(uow, &participant_id, match_id)? > 0 {
                    refunded += 1;
                }
            }
            purge_abandoned_in(uow, match_id)?;
            Ok((released, refunded))
        })
        .await?;

        for _ in 0..released {
            self.metrics_collector.record_release("expired");
        }
        for _ in 0..refunded {
            self.metrics_collector.record_release("refunded");
        }
        info!(
            "Released {} expired reservations, refunded {} committed fees and purged match {}",
            released, refunded, match_id
        );
        Ok(true)
    }

    /// Start the periodic expired-reservation cleanup
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self);
        let period = self.config.cleanup_interval();
        let max_age = self.config.reservation_ttl();

        let handle = tokio::spawn(async move {
            let mut cleanup_interval = interval(period);

            loop {
                cleanup_interval.tick().await;

                if let Err(e) = orchestrator.cleanup_expired_reservations(max_age).await {
                    error!("Error during reservation cleanup: {}", e);
                }
            }
        });

        info!(
            "Started reservation cleanup task (every {}s, ttl {}s)",
            period.as_secs(),
            max_age.as_secs()
        );
        handle
    }

    /// Get current orchestrator statistics
    pub fn get_stats(&self) -> Result<OrchestratorStats> {
        let stats = self
            .stats
            .read()
            .map_err(|_| ArenaError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;

        Ok(stats.clone())
    }

    async fn find_participant(&self, participant_id: &str) -> Result<Participant> {
        self.store
            .participant(participant_id)
            .await?
            .ok_or_else(|| {
                ArenaError::ParticipantNotFound {
                    participant_id: participant_id.to_string(),
                }
                .into()
            })
    }

    fn with_stats<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut OrchestratorStats),
    {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| ArenaError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
        update(&mut stats);
        Ok(())
    }

    fn refresh_in_flight(&self) -> Result<()> {
        let in_flight = self.monitor.len()?;
        self.with_stats(|stats| stats.in_flight_reservations = in_flight)?;
        self.metrics_collector.set_in_flight_reservations(in_flight);
        Ok(())
    }

    fn observe<T>(&self, operation: &str, start: Instant, result: &Result<T>) {
        self.metrics_collector
            .record_operation(operation, start.elapsed());
        if let Err(e) = result {
            self.metrics_collector
                .record_failure(operation, error_code(e));
        }
    }
}

/// White-relative outcome for a declared winner
fn outcome_for_winner(game: &Match, winner_id: &str) -> Result<MatchOutcome> {
    if game.white_id == winner_id {
        return Ok(MatchOutcome::Win);
    }
    if game.black_id.as_deref() == Some(winner_id) {
        return Ok(MatchOutcome::Lose);
    }
    Err(ArenaError::InvalidWinner {
        winner_id: winner_id.to_string(),
        match_id: game.id,
    }
    .into())
}

impl std::fmt::Debug for MatchmakingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchmakingOrchestrator")
            .field("ranks", &self.ranks)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryArenaStore;
    use crate::types::{MatchKind, TransactionKind};
    use serde_json::json;

    struct TestArena {
        store: Arc<InMemoryArenaStore>,
        orchestrator: MatchmakingOrchestrator,
    }

    async fn create_test_arena() -> TestArena {
        let store = Arc::new(InMemoryArenaStore::new());
        let orchestrator =
            MatchmakingOrchestrator::new(store.clone(), &AppConfig::default()).unwrap();

        for participant in [
            Participant::new("amy", "Amy")
                .with_rating(1200)
                .with_rank_level(3)
                .with_balance(Currency::Gem, 50)
                .with_balance(Currency::Coin, 50),
            Participant::new("bob", "Bob")
                .with_rating(1200)
                .with_rank_level(3)
                .with_balance(Currency::Gem, 50),
            Participant::new("cat", "Cat")
                .with_rating(1200)
                .with_rank_level(3)
                .with_balance(Currency::Coin, 50),
            Participant::new("dan", "Dan")
                .with_rating(1200)
                .with_rank_level(3),
        ] {
            orchestrator.register_participant(participant).await.unwrap();
        }

        TestArena {
            store,
            orchestrator,
        }
    }

    async fn create_started_match(arena: &TestArena) -> Match {
        let game = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();
        arena.orchestrator.commit_match_fee("amy", game.id).await.unwrap();
        arena.orchestrator.commit_match_fee("bob", game.id).await.unwrap();
        game
    }

    #[tokio::test]
    async fn test_create_match_reserves_both_sides() {
        let arena = create_test_arena().await;
        let game = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();

        assert_eq!(game.status, MatchStatus::Waiting);
        assert!(game.fee_reserved);
        assert!(!game.fee_committed);

        for id in ["amy", "bob"] {
            let profile = arena.orchestrator.profile(id).await.unwrap();
            assert_eq!(profile.gem.balance, 50);
            assert_eq!(profile.gem.locked, 10);
            assert_eq!(profile.gem.available, 40);
        }

        let info = arena.orchestrator.reserved_matches_info().unwrap();
        assert_eq!(info.total_reserved, 1);
        assert_eq!(info.reserved_matches, vec![game.id]);

        let stats = arena.orchestrator.get_stats().unwrap();
        assert_eq!(stats.matches_created, 1);
        assert_eq!(stats.reservations, 2);
        assert_eq!(stats.in_flight_reservations, 1);
    }

    #[tokio::test]
    async fn test_create_match_rejects_ineligible_participant() {
        let arena = create_test_arena().await;
        let err = arena
            .orchestrator
            .create_match("amy", "dan", 10, Currency::Gem)
            .await
            .unwrap_err();

        match ArenaError::classify(&err) {
            Some(ArenaError::EligibilityFailed { details }) => {
                assert!(details.contains("dan"));
                assert!(details.contains("required 4, available 0"));
            }
            other => panic!("expected eligibility failure, got {:?}", other),
        }

        let stats = arena.store.stats().await.unwrap();
        assert_eq!(stats.matches, 0);
        assert_eq!(stats.transactions, 0);
    }

    #[tokio::test]
    async fn test_create_match_checks_requested_currency_before_creating() {
        let arena = create_test_arena().await;
        // cat is eligible through coin but holds no gem
        let err = arena
            .orchestrator
            .create_match("amy", "cat", 10, Currency::Gem)
            .await
            .unwrap_err();

        match ArenaError::classify(&err) {
            Some(ArenaError::EligibilityFailed { details }) => {
                assert!(details.contains("cat: Not enough gem"));
                assert!(details.contains("required 10, available 0"));
                assert!(!details.contains("amy"));
            }
            other => panic!("expected eligibility failure, got {:?}", other),
        }

        let amy = arena.orchestrator.profile("amy").await.unwrap();
        assert_eq!(amy.gem.locked, 0);
        assert_eq!(amy.gem.balance, 50);

        let stats = arena.store.stats().await.unwrap();
        assert_eq!(stats.matches, 0);
        assert_eq!(stats.transactions, 0);
        assert!(arena.orchestrator.reserved_matches_info().unwrap().reserved_matches.is_empty());
        assert_eq!(arena.orchestrator.get_stats().unwrap().matches_created, 0);
    }

    #[tokio::test]
    async fn test_create_match_is_atomic_on_storage_failure() {
        let arena = create_test_arena().await;
        arena.store.fail_next_commit();

        let err = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "storage_failure");

        for id in ["amy", "bob"] {
            let profile = arena.orchestrator.profile(id).await.unwrap();
            assert_eq!(profile.gem.locked, 0);
            assert_eq!(profile.gem.balance, 50);
        }
        let stats = arena.store.stats().await.unwrap();
        assert_eq!(stats.matches, 0);
        assert_eq!(stats.transactions, 0);

        let orchestrator_stats = arena.orchestrator.get_stats().unwrap();
        assert_eq!(orchestrator_stats.matches_created, 0);
        assert_eq!(orchestrator_stats.reservations, 0);
        assert_eq!(orchestrator_stats.in_flight_reservations, 0);

        // a retry goes through once the store recovers
        arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();
        assert_eq!(arena.orchestrator.get_stats().unwrap().matches_created, 1);
    }

    #[tokio::test]
    async fn test_commit_both_sides_starts_match() {
        let arena = create_test_arena().await;
        let game = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();

        let first = arena.orchestrator.commit_match_fee("amy", game.id).await.unwrap();
        assert!(!first.match_fee_committed);
        assert_eq!(first.remaining_balance, 40);

        let second = arena.orchestrator.commit_match_fee("bob", game.id).await.unwrap();
        assert!(second.match_fee_committed);

        let status = arena.orchestrator.fee_status(game.id).await.unwrap();
        assert_eq!(status.status, MatchStatus::Ongoing);
        assert!(status.fee_committed);
        assert!(status.started_at.is_some());
        assert_eq!(status.transactions.len(), 2);
        assert!(status
            .transactions
            .iter()
            .all(|record| record.status == TransactionStatus::Completed));

        assert_eq!(arena.orchestrator.reserved_matches_info().unwrap().total_reserved, 0);
    }

    #[tokio::test]
    async fn test_release_returns_fee() {
        let arena = create_test_arena().await;
        let game = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();

        let release = arena.orchestrator.release_match_fee("amy", game.id).await.unwrap();
        assert_eq!(release.remaining_locked, 0);
        assert_eq!(arena.orchestrator.reserved_matches_info().unwrap().total_reserved, 1);

        arena.orchestrator.release_match_fee("bob", game.id).await.unwrap();
        assert_eq!(arena.orchestrator.reserved_matches_info().unwrap().total_reserved, 0);

        let err = arena
            .orchestrator
            .release_match_fee("bob", game.id)
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "nothing_reserved");

        let bob = arena.orchestrator.profile("bob").await.unwrap();
        assert_eq!(bob.gem.balance, 50);
        assert_eq!(bob.gem.locked, 0);
    }

    #[tokio::test]
    async fn test_process_match_result_settles_once() {
        let arena = create_test_arena().await;
        let game = create_started_match(&arena).await;

        let report = arena
            .orchestrator
            .process_match_result(game.id, "bob", json!(["e4", "e5"]), json!({"plies": 2}))
            .await
            .unwrap();
        assert_eq!(report.status, MatchStatus::Lose);
        assert_eq!(report.winner_id.as_deref(), Some("bob"));

        let bob = arena.orchestrator.profile("bob").await.unwrap();
        let amy = arena.orchestrator.profile("amy").await.unwrap();
        assert_eq!(bob.rating, 1212);
        assert_eq!(amy.rating, 1188);
        assert_eq!(bob.wins, 1);
        assert_eq!(amy.losses, 1);

        let err = arena
            .orchestrator
            .process_match_result(game.id, "bob", json!([]), json!({}))
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "already_settled");
        assert_eq!(arena.orchestrator.profile("bob").await.unwrap().rating, 1212);
        assert_eq!(arena.orchestrator.get_stats().unwrap().settlements, 1);
    }

    #[tokio::test]
    async fn test_process_match_result_rejects_outsider() {
        let arena = create_test_arena().await;
        let game = create_started_match(&arena).await;

        let err = arena
            .orchestrator
            .process_match_result(game.id, "cat", json!([]), json!({}))
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "invalid_winner");

        let status = arena.orchestrator.fee_status(game.id).await.unwrap();
        assert_eq!(status.status, MatchStatus::Ongoing);
    }

    #[tokio::test]
    async fn test_process_draw() {
        let arena = create_test_arena().await;
        let game = create_started_match(&arena).await;

        let report = arena
            .orchestrator
            .process_draw(game.id, json!([]), json!({}))
            .await
            .unwrap();
        assert_eq!(report.status, MatchStatus::Draw);
        assert!(report.winner_id.is_none());

        let amy = arena.orchestrator.profile("amy").await.unwrap();
        assert_eq!(amy.rating, 1200);
        assert_eq!(amy.total_matches, 1);
    }

    #[tokio::test]
    async fn test_start_match_signal() {
        let arena = create_test_arena().await;
        let game = arena
            .orchestrator
            .create_casual_match("amy", Some("dan"))
            .await
            .unwrap();
        assert_eq!(game.kind, MatchKind::Casual);

        let started = arena.orchestrator.start_match(game.id).await.unwrap();
        assert_eq!(started.status, MatchStatus::Ongoing);

        let err = arena.orchestrator.start_match(game.id).await.unwrap_err();
        assert_eq!(error_code(&err), "invalid_transition");
    }

    #[tokio::test]
    async fn test_transaction_history_newest_first_with_limit() {
        let arena = create_test_arena().await;
        let game = create_started_match(&arena).await;
        arena
            .orchestrator
            .process_match_result(game.id, "amy", json!([]), json!({}))
            .await
            .unwrap();
        arena
            .orchestrator
            .create_match("amy", "bob", 5, Currency::Gem)
            .await
            .unwrap();

        let history = arena
            .orchestrator
            .transaction_history("amy", None)
            .await
            .unwrap();
        assert_eq!(history.total_transactions, 2);
        assert_eq!(history.transactions[0].status, TransactionStatus::Pending);
        assert_eq!(history.transactions[0].amount, 5);
        assert_eq!(history.transactions[1].kind, TransactionKind::RankMatchFee);

        let limited = arena
            .orchestrator
            .transaction_history("amy", Some(1))
            .await
            .unwrap();
        assert_eq!(limited.transactions.len(), 1);

        let err = arena
            .orchestrator
            .transaction_history("nobody", None)
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "participant_not_found");
    }

    #[tokio::test]
    async fn test_match_history_and_incremental_save() {
        let arena = create_test_arena().await;
        let game = create_started_match(&arena).await;

        arena
            .orchestrator
            .save_match_history(game.id, json!({"ply": 1, "move": "e4"}))
            .await
            .unwrap();
        arena
            .orchestrator
            .process_match_result(game.id, "amy", json!(["e4"]), json!({}))
            .await
            .unwrap();

        let view = arena.orchestrator.match_history(game.id).await.unwrap();
        assert_eq!(view.game.status, MatchStatus::Win);
        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.entries[0].content["move"], "e4");

        let err = arena
            .orchestrator
            .save_match_history(crate::utils::generate_match_id(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "match_not_found");
    }

    #[tokio::test]
    async fn test_cleanup_expired_reservations() {
        let arena = create_test_arena().await;
        let stale = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();

        // nothing is old enough yet
        let cleaned = arena
            .orchestrator
            .cleanup_expired_reservations(Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(cleaned, 0);

        let cleaned = arena
            .orchestrator
            .cleanup_expired_reservations(Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cleaned, 1);

        for id in ["amy", "bob"] {
            let profile = arena.orchestrator.profile(id).await.unwrap();
            assert_eq!(profile.gem.locked, 0);
            assert_eq!(profile.gem.balance, 50);
        }
        let err = arena.orchestrator.fee_status(stale.id).await.unwrap_err();
        assert_eq!(error_code(&err), "match_not_found");

        let stats = arena.orchestrator.get_stats().unwrap();
        assert_eq!(stats.expired_cleaned, 1);
        assert_eq!(stats.in_flight_reservations, 0);
    }

    #[tokio::test]
    async fn test_cleanup_refunds_one_sided_commit() {
        let arena = create_test_arena().await;
        let stale = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();
        arena.orchestrator.commit_match_fee("amy", stale.id).await.unwrap();
        assert_eq!(arena.orchestrator.profile("amy").await.unwrap().gem.balance, 40);

        let cleaned = arena
            .orchestrator
            .cleanup_expired_reservations(Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cleaned, 1);

        for id in ["amy", "bob"] {
            let profile = arena.orchestrator.profile(id).await.unwrap();
            assert_eq!(profile.gem.balance, 50);
            assert_eq!(profile.gem.locked, 0);
        }
        assert!(arena.store.find_match(stale.id).await.unwrap().is_none());

        let refunds: Vec<_> = arena
            .store
            .participant_transactions("amy")
            .await
            .unwrap()
            .into_iter()
            .filter(|record| record.kind == TransactionKind::RankMatchRefund)
            .collect();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, 10);
        assert_eq!(refunds[0].status, TransactionStatus::Completed);
        assert!(arena
            .store
            .participant_transactions("bob")
            .await
            .unwrap()
            .iter()
            .all(|record| record.kind != TransactionKind::RankMatchRefund));
    }

    #[tokio::test]
    async fn test_cleanup_skips_started_matches() {
        let arena = create_test_arena().await;
        let game = arena
            .orchestrator
            .create_match("amy", "bob", 10, Currency::Gem)
            .await
            .unwrap();
        arena.orchestrator.commit_match_fee("amy", game.id).await.unwrap();
        arena.orchestrator.start_match(game.id).await.unwrap();

        let cleaned = arena
            .orchestrator
            .cleanup_expired_reservations(Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cleaned, 0);

        let status = arena.orchestrator.fee_status(game.id).await.unwrap();
        assert_eq!(status.status, MatchStatus::Ongoing);
        assert_eq!(arena.orchestrator.reserved_matches_info().unwrap().total_reserved, 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted_in_metrics() {
        let arena = create_test_arena().await;
        let _ = arena
            .orchestrator
            .commit_match_fee("amy", crate::utils::generate_match_id())
            .await;

        let families = arena.orchestrator.metrics().registry().gather();
        let failures = families
            .iter()
            .find(|family| family.get_name() == "ranked_arena_failures_total")
            .expect("failures metric registered");
        assert_eq!(failures.get_metric()[0].get_counter().get_value(), 1.0);
    }
}
