//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::combat::new_unit;
use crate::command::Command;
use crate::config::{MatchConfig, PlayerSetup};
use crate::energy::new_mirror;
use crate::engine::Engine;
use crate::entity::{Asteroid, BuildingKind, MirrorLink, UnitKind};
use crate::fixed::{Fixed64, Ticks};
use crate::id::{BuildingId, MirrorId, PlayerId, UnitId};
use crate::lockstep::CommandTransport;
use crate::math::Vec2;
use crate::production::Construction;
use crate::structures::new_building;
use std::f32::consts::TAU;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Configs and engines
// ===========================================================================

/// Two humans, "alpha" on team 0 and "beta" on team 1, with default tuning
/// and no asteroids.
pub fn two_player_config(seed: u64) -> MatchConfig {
    let mut config = MatchConfig::new(
        seed,
        vec![PlayerSetup::human("alpha", 0), PlayerSetup::human("beta", 1)],
    );
    config.world.asteroid_count = 0;
    config
}

/// A live two-player match with nothing on the field but the cores and the
/// sun: no countdown, workers, mirrors, asteroids or dust.
pub fn bare_engine() -> Engine {
    let mut config = two_player_config(1);
    config.tuning.countdown_seconds = 0.0;
    config.tuning.starting_workers = 0;
    config.tuning.mirror_deploy_distances.clear();
    config.world.dust_count = 0;
    let mut engine = Engine::new(config).expect("bare config is valid");
    engine.sim_state.mirrors_deployed = true;
    engine
}

pub fn run_ticks(engine: &mut Engine, n: Ticks) {
    for _ in 0..n {
        engine.step();
    }
}

// ===========================================================================
// Entity placement
// ===========================================================================

pub fn spawn_unit(engine: &mut Engine, owner: u8, kind: UnitKind, position: Vec2) -> UnitId {
    let owner = PlayerId(owner);
    let upgrades = engine.players[owner.index()].upgrades;
    let unit = new_unit(kind, owner, position, &engine.config.tuning, &upgrades);
    engine.world.units.insert(unit)
}

pub fn spawn_building(
    engine: &mut Engine,
    owner: u8,
    kind: BuildingKind,
    position: Vec2,
    complete: bool,
) -> BuildingId {
    let mut building = new_building(kind, PlayerId(owner), position, &engine.config.tuning);
    if complete {
        building.construction = Construction::finished();
    }
    engine.world.buildings.insert(building)
}

/// A regular polygon asteroid. Occluders are refreshed so shadow queries
/// see it straight away.
pub fn place_asteroid(engine: &mut Engine, position: Vec2, radius: f32, rotation_speed: f32) {
    let vertices = (0..8)
        .map(|i| Vec2::from_angle(TAU * i as f32 / 8.0) * radius)
        .collect();
    engine
        .world
        .asteroids
        .insert(Asteroid::new(position, vertices, rotation_speed));
    engine.world.refresh_occluders();
}

/// A mirror on the line between the player's core and the first sun,
/// linked to the core.
pub fn link_mirror_to_core(engine: &mut Engine, player: usize) -> MirrorId {
    let owner = engine.players[player].id;
    let core = engine.players[player].core.expect("player has a core");
    let core_pos = engine.world.cores[core].position;
    let sun = engine.world.suns[0].position;
    let position = core_pos + (sun - core_pos) * 0.4;
    let mut mirror = new_mirror(owner, position, &engine.config.tuning);
    mirror.link = MirrorLink::Core(core);
    engine.world.mirrors.insert(mirror)
}

// ===========================================================================
// Transport
// ===========================================================================

/// Records every sent command instead of delivering it anywhere.
#[derive(Debug)]
pub struct LoopbackTransport {
    pub player: PlayerId,
    pub sent: Vec<Command>,
}

impl LoopbackTransport {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            sent: Vec::new(),
        }
    }
}

impl CommandTransport for LoopbackTransport {
    fn local_player(&self) -> PlayerId {
        self.player
    }

    fn send_command(&mut self, command: &Command) {
        self.sent.push(command.clone());
    }
}
