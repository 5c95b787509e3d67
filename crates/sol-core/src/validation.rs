//! Multiplayer validation tools for state comparison and determinism checking.
//!
//! When a checkpoint mismatch is reported, comparing two engines
//! subsystem by subsystem narrows down where the divergence started.

use crate::command::Command;
use crate::config::{ConfigError, MatchConfig};
use crate::engine::{
    Engine, hash_effects, hash_environment, hash_players, hash_structures, hash_units,
};
use crate::fixed::Ticks;
use crate::id::{BuildingId, UnitId};
use crate::sim::StateHash;

// ---------------------------------------------------------------------------
// Subsystem hashes
// ---------------------------------------------------------------------------

/// Independent hashes of each part of the canonical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemHashes {
    pub sim_state: u32,
    pub players: u32,
    pub units: u32,
    pub structures: u32,
    pub environment: u32,
    pub effects: u32,
}

impl Engine {
    pub fn subsystem_hashes(&self) -> SubsystemHashes {
        SubsystemHashes {
            sim_state: sub_hash(|h| {
                h.write_u64(self.sim_state.tick);
                h.write_f32(self.sim_state.countdown_remaining);
                h.write_u64(self.rng.state());
            }),
            players: sub_hash(|h| hash_players(&self.players, &self.world, h)),
            units: sub_hash(|h| hash_units(&self.world, h)),
            structures: sub_hash(|h| hash_structures(&self.world, h)),
            environment: sub_hash(|h| hash_environment(&self.world, h)),
            effects: sub_hash(|h| hash_effects(&self.world, h)),
        }
    }
}

fn sub_hash(write: impl FnOnce(&mut StateHash)) -> u32 {
    let mut h = StateHash::new();
    write(&mut h);
    h.finish()
}

// ---------------------------------------------------------------------------
// State diff types
// ---------------------------------------------------------------------------

/// Per-subsystem match results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemDiff {
    pub sim_state_matches: bool,
    pub players_match: bool,
    pub units_match: bool,
    pub structures_match: bool,
    pub environment_matches: bool,
    pub effects_match: bool,
}

impl SubsystemDiff {
    pub fn all_match(&self) -> bool {
        self.sim_state_matches
            && self.players_match
            && self.units_match
            && self.structures_match
            && self.environment_matches
            && self.effects_match
    }
}

/// Difference between two engines for one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDiff<K> {
    OnlyInA(K),
    OnlyInB(K),
    StateMismatch { id: K, description: String },
}

/// Full state diff between two engines.
#[derive(Debug, Clone)]
pub struct StateDiff {
    pub is_identical: bool,
    pub subsystem_diffs: SubsystemDiff,
    pub unit_diffs: Vec<EntityDiff<UnitId>>,
    pub building_diffs: Vec<EntityDiff<BuildingId>>,
}

// ---------------------------------------------------------------------------
// Quick compare (subsystem-level only)
// ---------------------------------------------------------------------------

/// Quick subsystem-level comparison using hashes.
pub fn quick_compare(a: &Engine, b: &Engine) -> SubsystemDiff {
    let ha = a.subsystem_hashes();
    let hb = b.subsystem_hashes();

    SubsystemDiff {
        sim_state_matches: ha.sim_state == hb.sim_state,
        players_match: ha.players == hb.players,
        units_match: ha.units == hb.units,
        structures_match: ha.structures == hb.structures,
        environment_matches: ha.environment == hb.environment,
        effects_match: ha.effects == hb.effects,
    }
}

// ---------------------------------------------------------------------------
// Full diff
// ---------------------------------------------------------------------------

/// Compute a detailed diff between two engine states.
pub fn diff_engines(a: &Engine, b: &Engine) -> StateDiff {
    let subsystem_diffs = quick_compare(a, b);
    let mut unit_diffs = Vec::new();
    let mut building_diffs = Vec::new();

    for (id, ua) in &a.world.units {
        let Some(ub) = b.world.units.get(id) else {
            unit_diffs.push(EntityDiff::OnlyInA(id));
            continue;
        };
        let mut mismatches = Vec::new();
        if ua.owner != ub.owner || ua.kind != ub.kind {
            mismatches.push("identity");
        }
        if ua.position != ub.position {
            mismatches.push("position");
        }
        if ua.velocity != ub.velocity {
            mismatches.push("velocity");
        }
        if ua.health.to_bits() != ub.health.to_bits() {
            mismatches.push("health");
        }
        if ua.order != ub.order {
            mismatches.push("order");
        }
        if !mismatches.is_empty() {
            unit_diffs.push(EntityDiff::StateMismatch {
                id,
                description: mismatches.join(", "),
            });
        }
    }
    for id in b.world.units.keys() {
        if !a.world.units.contains_key(id) {
            unit_diffs.push(EntityDiff::OnlyInB(id));
        }
    }

    for (id, ba) in &a.world.buildings {
        let Some(bb) = b.world.buildings.get(id) else {
            building_diffs.push(EntityDiff::OnlyInA(id));
            continue;
        };
        let mut mismatches = Vec::new();
        if ba.owner != bb.owner || ba.kind != bb.kind {
            mismatches.push("identity");
        }
        if ba.health.to_bits() != bb.health.to_bits() {
            mismatches.push("health");
        }
        if ba.construction.progress() != bb.construction.progress() {
            mismatches.push("construction");
        }
        if ba.production != bb.production {
            mismatches.push("production");
        }
        if !mismatches.is_empty() {
            building_diffs.push(EntityDiff::StateMismatch {
                id,
                description: mismatches.join(", "),
            });
        }
    }
    for id in b.world.buildings.keys() {
        if !a.world.buildings.contains_key(id) {
            building_diffs.push(EntityDiff::OnlyInB(id));
        }
    }

    let is_identical =
        unit_diffs.is_empty() && building_diffs.is_empty() && subsystem_diffs.all_match();

    StateDiff {
        is_identical,
        subsystem_diffs,
        unit_diffs,
        building_diffs,
    }
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

/// Result of a determinism validation run.
#[derive(Debug)]
pub struct DeterminismResult {
    /// Whether the two runs produced identical results.
    pub is_deterministic: bool,
    /// Tick at which divergence was first detected (if any).
    pub divergence_tick: Option<Ticks>,
    /// Hash log: (tick, hash_run1, hash_run2) for each tick.
    pub hash_log: Vec<(Ticks, u32, u32)>,
}

/// Run two engines from the same config and command list and compare
/// their fresh state hashes after every tick.
pub fn verify_determinism(
    config: &MatchConfig,
    commands: &[Command],
    ticks: Ticks,
) -> Result<DeterminismResult, ConfigError> {
    let mut engine_a = Engine::new(config.clone())?;
    let mut engine_b = Engine::new(config.clone())?;
    engine_a.deliver_command_batch(commands.to_vec());
    engine_b.deliver_command_batch(commands.to_vec());

    let mut hash_log = Vec::with_capacity(ticks as usize);
    let mut divergence_tick = None;

    for _ in 0..ticks {
        engine_a.step();
        engine_b.step();

        let hash_a = engine_a.compute_state_hash();
        let hash_b = engine_b.compute_state_hash();
        let tick = engine_a.tick();

        hash_log.push((tick, hash_a, hash_b));

        if hash_a != hash_b && divergence_tick.is_none() {
            divergence_tick = Some(tick);
        }
    }

    Ok(DeterminismResult {
        is_deterministic: divergence_tick.is_none(),
        divergence_tick,
        hash_log,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::entity::{BuildingKind, UnitKind};
    use crate::id::PlayerId;
    use crate::math::Vec2;
    use crate::test_utils::*;

    // -----------------------------------------------------------------------
    // Diffs
    // -----------------------------------------------------------------------

    #[test]
    fn identical_engines_have_no_diff() {
        let a = Engine::new(two_player_config(11)).unwrap();
        let b = Engine::new(two_player_config(11)).unwrap();
        let diff = diff_engines(&a, &b);
        assert!(diff.is_identical);
        assert!(diff.unit_diffs.is_empty());
        assert!(diff.building_diffs.is_empty());
    }

    #[test]
    fn tick_difference_shows_in_sim_state() {
        let mut a = bare_engine();
        let b = bare_engine();
        a.step();
        let diff = quick_compare(&a, &b);
        assert!(!diff.sim_state_matches);
        assert!(diff.environment_matches);
    }

    #[test]
    fn unit_only_in_one_engine() {
        let mut a = bare_engine();
        let b = bare_engine();
        let id = spawn_unit(&mut a, 0, UnitKind::Soldier, Vec2::new(0.0, 200.0));
        let diff = diff_engines(&a, &b);
        assert!(!diff.is_identical);
        assert!(!diff.subsystem_diffs.units_match);
        assert_eq!(diff.unit_diffs, vec![EntityDiff::OnlyInA(id)]);
    }

    #[test]
    fn unit_state_mismatch_is_described() {
        let mut a = bare_engine();
        let mut b = bare_engine();
        let ia = spawn_unit(&mut a, 0, UnitKind::Soldier, Vec2::new(0.0, 200.0));
        let ib = spawn_unit(&mut b, 0, UnitKind::Soldier, Vec2::new(0.0, 200.0));
        assert_eq!(ia, ib);
        b.world.units[ib].health -= 1.0;
        let diff = diff_engines(&a, &b);
        assert_eq!(
            diff.unit_diffs,
            vec![EntityDiff::StateMismatch {
                id: ia,
                description: "health".to_string(),
            }]
        );
    }

    #[test]
    fn building_only_in_b() {
        let a = bare_engine();
        let mut b = bare_engine();
        let id = spawn_building(&mut b, 1, BuildingKind::Cannon, Vec2::new(300.0, 0.0), true);
        let diff = diff_engines(&a, &b);
        assert!(!diff.subsystem_diffs.structures_match);
        assert_eq!(diff.building_diffs, vec![EntityDiff::OnlyInB(id)]);
    }

    // -----------------------------------------------------------------------
    // Determinism
    // -----------------------------------------------------------------------

    #[test]
    fn same_inputs_are_deterministic() {
        let mut config = two_player_config(2024);
        config.players[1].ai = true;
        let commands = vec![
            Command::new(5, PlayerId(0), 0, CommandKind::PurchaseWorker),
            Command::new(40, PlayerId(0), 1, CommandKind::MoveCore {
                target: Vec2::new(-450.0, 80.0),
            }),
        ];
        let result = verify_determinism(&config, &commands, 300).unwrap();
        assert!(result.is_deterministic);
        assert_eq!(result.divergence_tick, None);
        assert_eq!(result.hash_log.len(), 300);
        assert_eq!(result.hash_log.last().map(|e| e.0), Some(300));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = two_player_config(1);
        config.seed = None;
        assert!(verify_determinism(&config, &[], 10).is_err());
    }
}
