//! Seeded world construction.
//!
//! Every random draw comes from the engine's [`SimRng`] in a fixed order:
//! AI strategies, starting workers, asteroids, then dust. Two peers with
//! the same config therefore build the same world.

use crate::ai::AiState;
use crate::combat::new_unit;
use crate::config::{MatchConfig, WorldGenParams};
use crate::effects::DustParticle;
use crate::energy::new_mirror;
use crate::entity::{Asteroid, Sun, UnitKind};
use crate::fixed::f32_to_fixed64;
use crate::id::PlayerId;
use crate::math::{Vec2, is_convex};
use crate::player::{Player, Upgrades};
use crate::rng::SimRng;
use crate::structures::new_core;
use crate::world::World;
use std::f32::consts::TAU;

/// Rejection-sampling budget per requested asteroid.
const ASTEROID_ATTEMPTS: u32 = 40;

/// Minimum gap between two generated asteroids.
const ASTEROID_GAP: f32 = 20.0;

/// Build the starting world and player list.
pub fn generate(config: &MatchConfig, rng: &mut SimRng) -> (World, Vec<Player>) {
    let params = &config.world;
    let tuning = &config.tuning;

    let mut world = World {
        suns: params
            .suns
            .iter()
            .map(|s| Sun {
                position: s.position,
                radius: s.radius,
                intensity: s.intensity,
                orbit: s.orbit,
            })
            .collect(),
        teams: config.players.iter().map(|p| p.team).collect(),
        half_extents: params.half_extents,
        ..World::default()
    };

    let layout = standard_layout(params, config.players.len());
    let mut players = Vec::with_capacity(config.players.len());
    for (i, setup) in config.players.iter().enumerate() {
        let id = PlayerId(i as u8);
        let position = setup.core_position.unwrap_or(layout[i]);
        let core = world.cores.insert(new_core(id, position, tuning));
        players.push(Player {
            id,
            name: setup.name.clone(),
            faction: setup.faction,
            team: setup.team,
            energy: f32_to_fixed64(tuning.starting_energy),
            core: Some(core),
            upgrades: Upgrades::default(),
            patrol_path: Vec::new(),
            ai: setup.ai.then(|| AiState::new(rng)),
        });
    }

    // Mirrors start on the core; the countdown deploy moves them out.
    for p in &players {
        let Some(core) = world.core_position(p.id) else {
            continue;
        };
        for _ in 0..tuning.mirror_deploy_distances.len() {
            world.mirrors.insert(new_mirror(p.id, core, tuning));
        }
    }

    for p in &players {
        let Some(core) = world.core_position(p.id) else {
            continue;
        };
        for _ in 0..tuning.starting_workers {
            let reach = tuning.core_radius + tuning.worker.radius + rng.range_f32(0.0, tuning.spawn_jitter);
            let position = core + Vec2::from_angle(rng.angle()) * reach;
            world
                .units
                .insert(new_unit(UnitKind::Worker, p.id, position, tuning, &p.upgrades));
        }
    }

    generate_asteroids(&mut world, params, rng);

    world.dust = (0..params.dust_count)
        .map(|_| DustParticle {
            position: Vec2::new(
                rng.range_f32(-params.half_extents.x, params.half_extents.x),
                rng.range_f32(-params.half_extents.y, params.half_extents.y),
            ),
            velocity: Vec2::ZERO,
        })
        .collect();

    world.refresh_occluders();
    tracing::debug!(
        asteroids = world.asteroids.len(),
        players = players.len(),
        "world generated"
    );
    (world, players)
}

/// Default core positions: opposite sides for two players, otherwise an
/// even ring around the first sun.
pub fn standard_layout(params: &WorldGenParams, count: usize) -> Vec<Vec2> {
    let r = params.layout_radius;
    let center = params.suns.first().map_or(Vec2::ZERO, |s| s.position);
    if count == 2 {
        return vec![center + Vec2::new(-r, 0.0), center + Vec2::new(r, 0.0)];
    }
    (0..count)
        .map(|i| center + Vec2::from_angle(std::f32::consts::PI + TAU * i as f32 / count as f32) * r)
        .collect()
}

// ---------------------------------------------------------------------------
// Asteroids
// ---------------------------------------------------------------------------

/// Random convex polygon around the origin with `n` vertices, returned in
/// counter-clockwise order.
pub fn random_polygon(rng: &mut SimRng, radius: f32, n: u32) -> Vec<Vec2> {
    let step = TAU / n as f32;
    (0..n)
        .map(|i| {
            let angle = i as f32 * step + rng.range_f32(-0.3, 0.3) * step;
            Vec2::from_angle(angle) * (radius * rng.range_f32(0.75, 1.0))
        })
        .collect()
}

fn asteroid_fits(world: &World, params: &WorldGenParams, candidate: &Asteroid) -> bool {
    let p = candidate.position;
    let r = candidate.radius;
    let h = params.half_extents;
    if p.x.abs() + r > h.x || p.y.abs() + r > h.y {
        return false;
    }
    let clear = params.structure_clearance;
    let near = |center: Vec2, other: f32, gap: f32| p.distance(center) < r + other + gap;

    !(world.cores.values().any(|c| near(c.position, c.radius, clear))
        || world.suns.iter().any(|s| near(s.position, s.radius, clear))
        || params.exclusion_zones.iter().any(|z| near(z.center, z.radius, 0.0))
        || world.asteroids.values().any(|a| near(a.position, a.radius, ASTEROID_GAP)))
}

/// Place up to `asteroid_count` asteroids by rejection sampling. Candidates
/// that are not strictly convex or violate a clearance are discarded.
pub fn generate_asteroids(world: &mut World, params: &WorldGenParams, rng: &mut SimRng) {
    let budget = params.asteroid_count.saturating_mul(ASTEROID_ATTEMPTS);
    let mut attempts = 0;
    while (world.asteroids.len() as u32) < params.asteroid_count && attempts < budget {
        attempts += 1;
        let position = Vec2::new(
            rng.range_f32(-params.half_extents.x, params.half_extents.x),
            rng.range_f32(-params.half_extents.y, params.half_extents.y),
        );
        let radius = rng.range_f32(params.asteroid_radius_min, params.asteroid_radius_max);
        let spread = params.asteroid_vertices_max - params.asteroid_vertices_min + 1;
        let n = params.asteroid_vertices_min + rng.below(spread);
        let vertices = random_polygon(rng, radius, n);
        let max_spin = params.asteroid_max_rotation_speed;
        let spin = rng.range_f32(-max_spin, max_spin);

        if !is_convex(&vertices) {
            continue;
        }
        let candidate = Asteroid::new(position, vertices, spin);
        if asteroid_fits(world, params, &candidate) {
            world.asteroids.insert(candidate);
        }
    }
    if (world.asteroids.len() as u32) < params.asteroid_count {
        tracing::warn!(
            placed = world.asteroids.len(),
            requested = params.asteroid_count,
            "asteroid field is sparser than requested"
        );
    }
}
