//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use ranked_arena::config::AppConfig;
use ranked_arena::store::{ArenaStore, InMemoryArenaStore};
use ranked_arena::types::{Currency, Participant};
use ranked_arena::MatchmakingOrchestrator;
use std::sync::Arc;

/// A complete arena wired on an in-memory store
pub struct TestArena {
    pub store: Arc<InMemoryArenaStore>,
    pub orchestrator: Arc<MatchmakingOrchestrator>,
}

impl TestArena {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryArenaStore::new());
        let orchestrator = Arc::new(
            MatchmakingOrchestrator::new(store.clone(), &config)
                .expect("Failed to create orchestrator"),
        );
        Self {
            store,
            orchestrator,
        }
    }

    /// Register a participant at `rating`, already at the level of its tier
    pub async fn add_participant(&self, id: &str, rating: u32, gem: u64, coin: u64) {
        let level = self.orchestrator.ranks().tier_for_rating(rating);
        let participant = Participant::new(id, format!("{} (test)", id))
            .with_rating(rating)
            .with_rank_level(level)
            .with_balance(Currency::Gem, gem)
            .with_balance(Currency::Coin, coin);
        self.orchestrator
            .register_participant(participant)
            .await
            .expect("Failed to register participant");
    }

    pub async fn participant(&self, id: &str) -> Participant {
        self.store
            .participant(id)
            .await
            .expect("Store lookup failed")
            .expect("Participant missing")
    }
}

/// Every balance in the store satisfies `0 <= locked <= balance`
pub fn assert_balance_invariant(store: &InMemoryArenaStore) {
    for participant in store.all_participants().expect("Failed to list participants") {
        for currency in Currency::ALL {
            let balance = participant.wallet.get(currency);
            assert!(
                balance.is_consistent(),
                "{} {}: locked {} exceeds balance {}",
                participant.id,
                currency,
                balance.locked,
                balance.balance
            );
        }
    }
}
