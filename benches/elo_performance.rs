//! Performance benchmarks for rating calculations and settlement

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ranked_arena::config::AppConfig;
use ranked_arena::settlement::{RatingCalculator, TieredEloCalculator};
use ranked_arena::store::InMemoryArenaStore;
use ranked_arena::types::{Currency, MatchOutcome, Participant};
use ranked_arena::MatchmakingOrchestrator;
use serde_json::json;
use std::sync::Arc;

async fn create_bench_system() -> MatchmakingOrchestrator {
    let store = Arc::new(InMemoryArenaStore::new());
    let orchestrator = MatchmakingOrchestrator::new(store, &AppConfig::default()).unwrap();

    for id in ["white", "black"] {
        let participant = Participant::new(id, id)
            .with_rating(1200)
            .with_rank_level(3)
            .with_balance(Currency::Gem, 1_000_000);
        orchestrator.register_participant(participant).await.unwrap();
    }

    orchestrator
}

fn bench_rating_calculations(c: &mut Criterion) {
    let calculator = TieredEloCalculator::default();

    c.bench_function("elo_calculation_across_tiers", |b| {
        b.iter(|| {
            for (white, black) in [(800, 950), (1200, 1200), (1950, 2050), (2400, 1800)] {
                black_box(
                    calculator
                        .calculate(black_box(white), black_box(black), MatchOutcome::Win)
                        .unwrap(),
                );
            }
        })
    });

    c.bench_function("elo_expected_score", |b| {
        b.iter(|| black_box(calculator.expected_score(black_box(1500), black_box(1650))))
    });
}

fn bench_match_lifecycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = rt.block_on(create_bench_system());

    c.bench_function("ranked_match_lifecycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let game = orchestrator
                    .create_match("white", "black", 4, Currency::Gem)
                    .await
                    .unwrap();
                orchestrator.commit_match_fee("white", game.id).await.unwrap();
                orchestrator.commit_match_fee("black", game.id).await.unwrap();

                black_box(
                    orchestrator
                        .process_draw(game.id, json!([]), json!({}))
                        .await
                        .unwrap(),
                )
            })
        })
    });
}

criterion_group!(benches, bench_rating_calculations, bench_match_lifecycle);
criterion_main!(benches);
