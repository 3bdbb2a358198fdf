use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use wc26_odds::group_sim::{GroupTeam, simulate_group_winner_seeded};
use wc26_odds::match_sim::{IterationBudget, SimulationPolicy, Stage, simulate_match};
use wc26_odds::memory_cache::MemoryTier;
use wc26_odds::odds_cache::{CachedOdds, derive_cache_key};
use wc26_odds::rng::{SeededLcg, simulation_seed};

fn bench_match_group_stage(c: &mut Criterion) {
    let policy = SimulationPolicy::default();
    c.bench_function("match_group_stage_adaptive", |b| {
        b.iter(|| {
            let mut rng = SeededLcg::from_ids(&["Spain", "Canada"]);
            let odds = simulate_match(
                &policy,
                black_box(1877.18),
                black_box(1559.15),
                Stage::GroupStage,
                IterationBudget::Adaptive,
                &mut rng,
            );
            black_box(odds);
        })
    });
}

fn bench_match_knockout_close(c: &mut Criterion) {
    let policy = SimulationPolicy::default();
    c.bench_function("match_knockout_close_gap", |b| {
        b.iter(|| {
            let mut rng = SeededLcg::from_ids(&["Spain", "Argentina"]);
            let odds = simulate_match(
                &policy,
                black_box(1877.18),
                black_box(1873.33),
                Stage::Knockout,
                IterationBudget::Adaptive,
                &mut rng,
            );
            black_box(odds);
        })
    });
}

fn bench_group_winner(c: &mut Criterion) {
    let policy = SimulationPolicy::default();
    let teams = vec![
        GroupTeam::new("Spain", Some(1877.18)),
        GroupTeam::new("Canada", Some(1559.15)),
        GroupTeam::new("Tonga", Some(835.64)),
        GroupTeam::new("New Zealand", Some(1279.25)),
    ];
    c.bench_function("group_winner_adaptive", |b| {
        b.iter(|| {
            let odds = simulate_group_winner_seeded(&policy, black_box(&teams));
            black_box(odds.map(|o| o.iterations).unwrap_or(0));
        })
    });
}

fn bench_seed_and_key(c: &mut Criterion) {
    let ids = ["Spain", "Canada", "Tonga", "New Zealand"];
    c.bench_function("seed_and_cache_key", |b| {
        b.iter(|| {
            black_box(simulation_seed(black_box(&ids)));
            black_box(derive_cache_key(black_box(&ids), false));
        })
    });
}

fn bench_memory_tier_churn(c: &mut Criterion) {
    let policy = SimulationPolicy::default();
    let mut rng = SeededLcg::new(1);
    let payload = simulate_match(
        &policy,
        1700.0,
        1650.0,
        Stage::GroupStage,
        IterationBudget::Fixed(500),
        &mut rng,
    )
    .map(CachedOdds::MatchOdds);
    let Some(payload) = payload else {
        return;
    };
    let keys = (0..1024)
        .map(|i| format!("T{i}|U{i}_group"))
        .collect::<Vec<_>>();
    c.bench_function("memory_tier_insert_evict", |b| {
        b.iter(|| {
            let tier = MemoryTier::new(256);
            for key in &keys {
                tier.insert(key.clone(), payload.clone());
            }
            black_box(tier.len());
        })
    });
}

criterion_group!(
    perf,
    bench_match_group_stage,
    bench_match_knockout_close,
    bench_group_winner,
    bench_seed_and_key,
    bench_memory_tier_churn
);
criterion_main!(perf);
