//! Match setup: roster, world-generation parameters and gameplay tuning.
//!
//! A [`MatchConfig`] is the complete input an engine needs besides the
//! command stream. Two peers holding equal configs and equal ordered command
//! logs derive identical worlds. Validation happens once, in
//! [`MatchConfig::validate`], before any tick runs.

use crate::math::Vec2;
use serde::{Deserialize, Serialize};

/// Largest roster the engine accepts. Player ids are `u8`.
pub const MAX_PLAYERS: usize = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal setup errors. Reported by [`crate::engine::Engine::new`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("match seed is missing; a seed is required before the first tick")]
    MissingSeed,

    #[error("roster must contain between 2 and {MAX_PLAYERS} players, got {0}")]
    RosterSize(usize),

    #[error("player {index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate player name '{0}'")]
    DuplicateName(String),

    #[error("every player is on team {0}; at least two teams are required")]
    SingleTeam(u8),

    #[error("tuning value '{field}' must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f32 },

    #[error("world parameter '{field}' is invalid: {detail}")]
    InvalidWorld { field: &'static str, detail: String },
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Cosmetic faction identity. Carries no gameplay modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    #[default]
    Radiant,
    Aurum,
    Solari,
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSetup {
    pub name: String,
    #[serde(default)]
    pub faction: Faction,
    pub team: u8,
    /// Controlled by the AI decision layer on every peer.
    #[serde(default)]
    pub ai: bool,
    /// Overrides the standard layout position of this player's core.
    #[serde(default)]
    pub core_position: Option<Vec2>,
}

impl PlayerSetup {
    pub fn human(name: impl Into<String>, team: u8) -> Self {
        Self {
            name: name.into(),
            faction: Faction::default(),
            team,
            ai: false,
            core_position: None,
        }
    }

    pub fn ai(name: impl Into<String>, team: u8) -> Self {
        Self {
            ai: true,
            ..Self::human(name, team)
        }
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Which rule hides points from a player in fog of war. Exactly one mode is
/// active per match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum VisibilityMode {
    /// Points in shadow are hidden.
    #[default]
    Shadow,
    /// Points on the far side of the line `normal · p = offset` (relative to
    /// the viewer's core) are hidden; shadows do not hide.
    Divider { normal: Vec2, offset: f32 },
}

/// Secondary order for commands sharing a tick. Both peers must agree on it
/// before the match starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOrdering {
    /// Sort by `(tick, player, sequence)`.
    #[default]
    PlayerSequence,
    /// Stable sort by tick only; relies on the transport delivering batches
    /// in the same order on every peer.
    Arrival,
}

// ---------------------------------------------------------------------------
// World generation
// ---------------------------------------------------------------------------

/// A circular area in which no asteroid may be generated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExclusionZone {
    pub center: Vec2,
    pub radius: f32,
}

/// Circular motion of a sun around a fixed center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunOrbit {
    pub center: Vec2,
    /// Radians per second, counter-clockwise.
    pub angular_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunSetup {
    pub position: Vec2,
    pub radius: f32,
    pub intensity: f32,
    #[serde(default)]
    pub orbit: Option<SunOrbit>,
}

impl Default for SunSetup {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            radius: 100.0,
            intensity: 1.0,
            orbit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldGenParams {
    pub suns: Vec<SunSetup>,
    pub asteroid_count: u32,
    pub asteroid_radius_min: f32,
    pub asteroid_radius_max: f32,
    pub asteroid_vertices_min: u32,
    pub asteroid_vertices_max: u32,
    pub asteroid_max_rotation_speed: f32,
    /// Asteroids keep at least this gap from cores and suns.
    pub structure_clearance: f32,
    /// The playfield spans `[-half_extents, half_extents]`.
    pub half_extents: Vec2,
    pub exclusion_zones: Vec<ExclusionZone>,
    /// Radius of the ring on which cores are placed for three or more players.
    pub layout_radius: f32,
    pub dust_count: u32,
}

impl Default for WorldGenParams {
    fn default() -> Self {
        Self {
            suns: vec![SunSetup::default()],
            asteroid_count: 10,
            asteroid_radius_min: 30.0,
            asteroid_radius_max: 80.0,
            asteroid_vertices_min: 5,
            asteroid_vertices_max: 9,
            asteroid_max_rotation_speed: 0.3,
            structure_clearance: 120.0,
            half_extents: Vec2::new(1200.0, 800.0),
            exclusion_zones: Vec::new(),
            layout_radius: 500.0,
            dust_count: 80,
        }
    }
}

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

/// Combat and movement statistics for a unit class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub health: f32,
    pub radius: f32,
    pub speed: f32,
    /// Zero means the unit cannot attack.
    pub damage: f32,
    pub range: f32,
    pub attack_cooldown: f32,
    /// Zero means attacks land instantly.
    pub projectile_speed: f32,
    pub vision: f32,
    pub cost: f32,
    pub build_time: f32,
}

/// Statistics for a building class. Attack fields are ignored by kinds
/// that do not attack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildingStats {
    pub health: f32,
    pub radius: f32,
    pub cost: f32,
    pub build_time: f32,
    pub damage: f32,
    pub range: f32,
    pub attack_cooldown: f32,
    pub projectile_speed: f32,
}

/// Every gameplay constant. Files override only the fields they name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // -- Timing --
    pub fixed_dt: f32,
    pub countdown_seconds: f32,
    pub hash_interval_ticks: u64,
    /// Locally issued commands are scheduled this many ticks ahead.
    pub input_delay_ticks: u64,
    pub command_history: usize,

    // -- Economy --
    pub starting_energy: f32,
    pub influence_radius: f32,
    pub influence_regen_per_second: f32,
    pub starting_workers: u32,
    pub max_queue: usize,

    // -- Core structure --
    pub core_health: f32,
    pub core_radius: f32,
    pub core_speed: f32,

    // -- Mirrors and light --
    pub mirror_health: f32,
    pub mirror_radius: f32,
    pub mirror_speed: f32,
    pub mirror_energy_rate: f32,
    pub mirror_efficiency: f32,
    pub mirror_cost: f32,
    pub mirror_build_time: f32,
    /// Distances from the core, toward the nearest sun, of the starting mirrors.
    pub mirror_deploy_distances: Vec<f32>,
    /// Light per second that builds a structure at its nominal rate.
    pub build_light_baseline: f32,

    // -- Units --
    pub worker: UnitStats,
    pub soldier: UnitStats,
    pub hero: UnitStats,
    pub ability_cooldown: f32,
    pub lancer_beam_length: f32,
    pub lancer_beam_damage: f32,
    pub lancer_beam_width: f32,
    pub scatter_projectiles: u32,
    pub scatter_spread: f32,
    pub scatter_damage: f32,
    pub scatter_speed: f32,
    pub seer_reveal_range: f32,
    pub seer_reveal_half_angle: f32,
    pub seer_reveal_duration: f32,
    pub projectile_radius: f32,
    pub projectile_lifetime: f32,
    pub beam_duration: f32,

    // -- Buildings --
    pub cannon: BuildingStats,
    pub foundry: BuildingStats,
    pub shield_tower: BuildingStats,
    pub lance_tower: BuildingStats,
    pub warp_gate: BuildingStats,
    pub cannon_splash_radius: f32,
    pub shield_radius: f32,
    pub shield_capacity: f32,
    pub shield_recharge: f32,
    pub lance_lock_time: f32,
    pub lance_reload_time: f32,
    pub lance_beam_length: f32,
    pub lance_beam_damage: f32,
    pub lance_beam_width: f32,
    pub upgrade_cost: f32,
    pub upgrade_build_time: f32,

    // -- Fusion --
    pub fusion_worker_count: usize,
    pub fusion_radius: f32,
    pub gate_influence_radius: f32,

    // -- Collision --
    pub push_multiplier: f32,
    pub max_push_distance: f32,
    pub structure_standoff: f32,
    pub knockback_speed: f32,
    pub knockback_padding: f32,

    // -- Dust --
    pub dust_cell_size: f32,
    pub dust_repulsion_radius: f32,
    pub dust_repulsion_strength: f32,
    pub dust_unit_push: f32,
    pub dust_damping: f32,

    // -- Spawning and AI --
    pub spawn_jitter: f32,
    pub formation_spacing: f32,
    pub ai_think_interval: f32,
    pub ai_build_interval: f32,
    pub ai_attack_interval: f32,
    pub ai_attack_wave: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            countdown_seconds: 3.0,
            hash_interval_ticks: 30,
            input_delay_ticks: 4,
            command_history: 100_000,

            starting_energy: 100.0,
            influence_radius: 300.0,
            influence_regen_per_second: 5.0,
            starting_workers: 3,
            max_queue: 5,

            core_health: 1000.0,
            core_radius: 40.0,
            core_speed: 10.0,

            mirror_health: 100.0,
            mirror_radius: 12.0,
            mirror_speed: 60.0,
            mirror_energy_rate: 10.0,
            mirror_efficiency: 1.0,
            mirror_cost: 50.0,
            mirror_build_time: 4.0,
            mirror_deploy_distances: vec![50.0, 100.0],
            build_light_baseline: 20.0,

            worker: UnitStats {
                health: 60.0,
                radius: 8.0,
                speed: 70.0,
                damage: 0.0,
                range: 0.0,
                attack_cooldown: 1.0,
                projectile_speed: 0.0,
                vision: 150.0,
                cost: 25.0,
                build_time: 3.0,
            },
            soldier: UnitStats {
                health: 100.0,
                radius: 9.0,
                speed: 60.0,
                damage: 12.0,
                range: 120.0,
                attack_cooldown: 1.0,
                projectile_speed: 320.0,
                vision: 200.0,
                cost: 40.0,
                build_time: 4.0,
            },
            hero: UnitStats {
                health: 300.0,
                radius: 14.0,
                speed: 55.0,
                damage: 25.0,
                range: 150.0,
                attack_cooldown: 0.8,
                projectile_speed: 0.0,
                vision: 260.0,
                cost: 150.0,
                build_time: 8.0,
            },
            ability_cooldown: 6.0,
            lancer_beam_length: 400.0,
            lancer_beam_damage: 60.0,
            lancer_beam_width: 6.0,
            scatter_projectiles: 5,
            scatter_spread: 0.6,
            scatter_damage: 15.0,
            scatter_speed: 300.0,
            seer_reveal_range: 500.0,
            seer_reveal_half_angle: 0.5,
            seer_reveal_duration: 4.0,
            projectile_radius: 3.0,
            projectile_lifetime: 3.0,
            beam_duration: 0.25,

            cannon: BuildingStats {
                health: 400.0,
                radius: 24.0,
                cost: 120.0,
                build_time: 8.0,
                damage: 30.0,
                range: 250.0,
                attack_cooldown: 1.5,
                projectile_speed: 280.0,
            },
            foundry: BuildingStats {
                health: 600.0,
                radius: 32.0,
                cost: 150.0,
                build_time: 10.0,
                damage: 0.0,
                range: 0.0,
                attack_cooldown: 0.0,
                projectile_speed: 0.0,
            },
            shield_tower: BuildingStats {
                health: 350.0,
                radius: 20.0,
                cost: 100.0,
                build_time: 8.0,
                damage: 0.0,
                range: 0.0,
                attack_cooldown: 0.0,
                projectile_speed: 0.0,
            },
            lance_tower: BuildingStats {
                health: 450.0,
                radius: 22.0,
                cost: 180.0,
                build_time: 12.0,
                damage: 0.0,
                range: 0.0,
                attack_cooldown: 0.0,
                projectile_speed: 0.0,
            },
            warp_gate: BuildingStats {
                health: 500.0,
                radius: 28.0,
                cost: 0.0,
                build_time: 6.0,
                damage: 0.0,
                range: 0.0,
                attack_cooldown: 0.0,
                projectile_speed: 0.0,
            },
            cannon_splash_radius: 30.0,
            shield_radius: 120.0,
            shield_capacity: 100.0,
            shield_recharge: 10.0,
            lance_lock_time: 1.5,
            lance_reload_time: 5.0,
            lance_beam_length: 600.0,
            lance_beam_damage: 120.0,
            lance_beam_width: 8.0,
            upgrade_cost: 200.0,
            upgrade_build_time: 10.0,

            fusion_worker_count: 3,
            fusion_radius: 30.0,
            gate_influence_radius: 200.0,

            push_multiplier: 0.5,
            max_push_distance: 4.0,
            structure_standoff: 6.0,
            knockback_speed: 240.0,
            knockback_padding: 4.0,

            dust_cell_size: 32.0,
            dust_repulsion_radius: 24.0,
            dust_repulsion_strength: 40.0,
            dust_unit_push: 60.0,
            dust_damping: 0.9,

            spawn_jitter: 20.0,
            formation_spacing: 24.0,
            ai_think_interval: 1.0,
            ai_build_interval: 12.0,
            ai_attack_interval: 20.0,
            ai_attack_wave: 4,
        }
    }
}

impl Tuning {
    fn check_positive(&self) -> Result<(), ConfigError> {
        let fields: [(&'static str, f32); 14] = [
            ("fixed_dt", self.fixed_dt),
            ("influence_radius", self.influence_radius),
            ("core_health", self.core_health),
            ("core_radius", self.core_radius),
            ("mirror_health", self.mirror_health),
            ("mirror_radius", self.mirror_radius),
            ("mirror_build_time", self.mirror_build_time),
            ("build_light_baseline", self.build_light_baseline),
            ("worker.radius", self.worker.radius),
            ("soldier.radius", self.soldier.radius),
            ("hero.radius", self.hero.radius),
            ("max_push_distance", self.max_push_distance),
            ("dust_cell_size", self.dust_cell_size),
            ("upgrade_build_time", self.upgrade_build_time),
        ];
        for (field, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.countdown_seconds < 0.0 || !self.countdown_seconds.is_finite() {
            return Err(ConfigError::NonPositive {
                field: "countdown_seconds",
                value: self.countdown_seconds,
            });
        }
        if self.hash_interval_ticks == 0 {
            return Err(ConfigError::NonPositive {
                field: "hash_interval_ticks",
                value: 0.0,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MatchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Mandatory. `None` is a fatal setup error.
    pub seed: Option<u64>,
    pub players: Vec<PlayerSetup>,
    #[serde(default)]
    pub world: WorldGenParams,
    #[serde(default)]
    pub tuning: Tuning,
    #[serde(default)]
    pub visibility: VisibilityMode,
    #[serde(default)]
    pub command_order: CommandOrdering,
}

impl MatchConfig {
    /// A config with default world and tuning.
    pub fn new(seed: u64, players: Vec<PlayerSetup>) -> Self {
        Self {
            seed: Some(seed),
            players,
            world: WorldGenParams::default(),
            tuning: Tuning::default(),
            visibility: VisibilityMode::default(),
            command_order: CommandOrdering::default(),
        }
    }

    /// Check the whole config and return the seed.
    pub fn validate(&self) -> Result<u64, ConfigError> {
        let seed = self.seed.ok_or(ConfigError::MissingSeed)?;

        let n = self.players.len();
        if !(2..=MAX_PLAYERS).contains(&n) {
            return Err(ConfigError::RosterSize(n));
        }
        for (index, p) in self.players.iter().enumerate() {
            if p.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if self.players[..index].iter().any(|q| q.name == p.name) {
                return Err(ConfigError::DuplicateName(p.name.clone()));
            }
            if p.core_position.is_some_and(|pos| !pos.is_finite()) {
                return Err(ConfigError::InvalidWorld {
                    field: "core_position",
                    detail: format!("player '{}' has a non-finite core position", p.name),
                });
            }
        }
        let first_team = self.players[0].team;
        if self.players.iter().all(|p| p.team == first_team) {
            return Err(ConfigError::SingleTeam(first_team));
        }

        self.tuning.check_positive()?;
        self.validate_world()?;
        Ok(seed)
    }

    fn validate_world(&self) -> Result<(), ConfigError> {
        let w = &self.world;
        if !(w.half_extents.x > 0.0 && w.half_extents.y > 0.0 && w.half_extents.is_finite()) {
            return Err(ConfigError::InvalidWorld {
                field: "half_extents",
                detail: format!("{:?} must be positive", w.half_extents),
            });
        }
        if w.asteroid_count > 0 {
            if !(w.asteroid_radius_min > 0.0 && w.asteroid_radius_min <= w.asteroid_radius_max) {
                return Err(ConfigError::InvalidWorld {
                    field: "asteroid_radius",
                    detail: format!(
                        "min {} must be positive and not exceed max {}",
                        w.asteroid_radius_min, w.asteroid_radius_max
                    ),
                });
            }
            if w.asteroid_vertices_min < 3 || w.asteroid_vertices_min > w.asteroid_vertices_max {
                return Err(ConfigError::InvalidWorld {
                    field: "asteroid_vertices",
                    detail: format!(
                        "need 3 <= min ({}) <= max ({})",
                        w.asteroid_vertices_min, w.asteroid_vertices_max
                    ),
                });
            }
        }
        for sun in &w.suns {
            if !(sun.radius > 0.0 && sun.intensity >= 0.0 && sun.position.is_finite()) {
                return Err(ConfigError::InvalidWorld {
                    field: "suns",
                    detail: format!("sun at {:?} has invalid radius or intensity", sun.position),
                });
            }
        }
        for zone in &w.exclusion_zones {
            if !(zone.radius >= 0.0 && zone.center.is_finite()) {
                return Err(ConfigError::InvalidWorld {
                    field: "exclusion_zones",
                    detail: format!("zone at {:?} has a negative radius", zone.center),
                });
            }
        }
        Ok(())
    }
}
