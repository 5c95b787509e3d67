//! Criterion benchmarks for the Sol simulation engine.
//!
//! Three benchmark groups:
//! - `duel`: two AI players on a default map after the countdown
//! - `skirmish`: eight AI players with a dense asteroid field and many units
//! - `state_hash`: a fresh canonical hash over a crowded world

use criterion::{Criterion, criterion_group, criterion_main};
use sol_core::config::PlayerSetup;
use sol_core::engine::Engine;
use sol_core::entity::UnitKind;
use sol_core::math::Vec2;
use sol_core::test_utils::*;

// ===========================================================================
// Match builders
// ===========================================================================

/// Two AI players, warmed past the countdown so the economy is running.
fn build_duel() -> Engine {
    let mut config = two_player_config(42);
    config.players = vec![PlayerSetup::ai("alpha", 0), PlayerSetup::ai("beta", 1)];
    config.world.asteroid_count = 10;
    let mut engine = Engine::new(config).unwrap();
    run_ticks(&mut engine, 300);
    engine
}

/// Eight AI players, 30 asteroids and 40 soldiers each.
fn build_skirmish() -> Engine {
    let mut config = two_player_config(7);
    config.players = (0..8u8)
        .map(|i| PlayerSetup::ai(format!("p{i}"), i % 2))
        .collect();
    config.world.asteroid_count = 30;
    config.world.half_extents = Vec2::new(2000.0, 1400.0);
    config.world.layout_radius = 900.0;
    let mut engine = Engine::new(config).unwrap();
    for owner in 0..8u8 {
        let core = engine.players[owner as usize].core.unwrap();
        let base = engine.world.cores[core].position;
        for i in 0..40 {
            let offset = Vec2::from_angle(i as f32 * 0.7) * (60.0 + i as f32 * 3.0);
            spawn_unit(&mut engine, owner, UnitKind::Soldier, base + offset);
        }
    }
    run_ticks(&mut engine, 200);
    engine
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_duel(c: &mut Criterion) {
    let mut engine = build_duel();
    c.bench_function("duel_tick", |b| {
        b.iter(|| {
            engine.step();
        });
    });
}

fn bench_skirmish(c: &mut Criterion) {
    let mut group = c.benchmark_group("skirmish");
    group.sample_size(20);
    let mut engine = build_skirmish();
    group.bench_function("tick", |b| {
        b.iter(|| {
            engine.step();
        });
    });
    group.finish();
}

fn bench_state_hash(c: &mut Criterion) {
    let engine = build_skirmish();
    c.bench_function("state_hash", |b| {
        b.iter(|| std::hint::black_box(engine.compute_state_hash()));
    });
}

criterion_group!(benches, bench_duel, bench_skirmish, bench_state_hash);
criterion_main!(benches);
