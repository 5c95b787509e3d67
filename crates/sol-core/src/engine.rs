//! The simulation engine: owns the world and orchestrates the nine-phase
//! tick pipeline.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A [`World`] of entity arenas (units, buildings, mirrors, cores, asteroids)
//! - The [`Player`] list, indexed by [`PlayerId`]
//! - A [`SimState`] (tick counter, countdown, accumulator)
//! - The one seeded [`SimRng`] every gameplay draw comes from
//! - A [`CommandQueue`] of buffered commands and the applied history
//! - A [`HashAccumulator`] of rolling checkpoints
//!
//! # Tick pipeline
//!
//! Each `update()` runs:
//! 1. **Commands** -- apply buffered commands that are due, in the agreed order
//! 2. **Countdown** -- advance the pre-game countdown; deploy starting mirrors once
//! 3. **Environment** -- orbit suns, rotate asteroids, refresh occluders
//! 4. **Knockback** -- push units and mirrors out of asteroid clearance
//! 5. **AI** -- AI players plan and apply commands (after the countdown)
//! 6. **Players** -- per player: mirrors, core, buildings, units, rituals,
//!    outbox drain, production, prune
//! 7. **Collision** -- unit-unit, unit-obstacle, standoff, dust
//! 8. **Effects** -- projectiles, beams, reveal cones
//! 9. **Bookkeeping** -- prune, tick counter, hash checkpoint

use crate::ai::{AiView, plan_commands};
use crate::collision::{
    Obstacle, ObstacleKind, PushParams, asteroid_knockback, enforce_structure_standoff, resolve_unit_collisions,
    revert_embedded_units,
    resolve_unit_obstacles,
};
use crate::combat::{
    UnitContext, age_reveals, new_unit, realize_effects, resolve_beams, resolve_projectiles, update_rituals,
    update_unit,
};
use crate::command::{Command, CommandKind, CommandQueue};
use crate::config::{CommandOrdering, ConfigError, MatchConfig, Tuning};
use crate::energy::{LightContext, move_mirror, new_mirror, update_mirrors};
use crate::entity::*;
use crate::event::{EventLog, SimEvent};
use crate::fixed::{Fixed64, Ticks};
use crate::id::*;
use crate::lockstep::CommandTransport;
use crate::math::Vec2;
use crate::player::Player;
use crate::production::ProductionItem;
use crate::rng::SimRng;
use crate::router::{RouterContext, apply_commands};
use crate::sim::{AdvanceResult, HashAccumulator, SimState, StateHash};
use crate::spatial::{DustParams, SpatialGrid, step_dust};
use crate::structures::{BuildingContext, update_building, update_core};
use crate::visibility::{Viewer, VisionSources, is_visible, nearest_sun};
use crate::world::World;
use crate::world_gen::generate;
use std::f32::consts::TAU;

/// Events retained between drains.
pub const EVENT_CAPACITY: usize = 4096;

/// Where a completed production item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProductionSource {
    Core(CoreId),
    Building(BuildingId),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The deterministic simulation kernel. Two engines built from the same
/// config and fed the same commands produce identical state hashes.
#[derive(Debug)]
pub struct Engine {
    /// Match setup. Read-only after construction.
    pub(crate) config: MatchConfig,

    /// Validated seed.
    pub(crate) seed: u64,

    /// Simulation clock.
    pub sim_state: SimState,

    /// The one gameplay random stream.
    pub(crate) rng: SimRng,

    /// Entity arenas.
    pub world: World,

    /// Players, indexed by `PlayerId`.
    pub players: Vec<Player>,

    /// Buffered commands and applied history.
    pub(crate) commands: CommandQueue,

    /// Rolling checkpoints.
    pub(crate) hashes: HashAccumulator,

    /// Rolling value at the most recent checkpoint.
    pub(crate) last_state_hash: u32,

    /// Events for consumers outside the core.
    pub events: EventLog,

    /// Sequence stamped on the next locally issued command.
    pub(crate) next_sequence: u32,

    /// Scratch grid for dust repulsion.
    pub(crate) dust_grid: SpatialGrid,
}

impl Engine {
    /// Validate `config`, seed the generator and build the world.
    pub fn new(config: MatchConfig) -> Result<Self, ConfigError> {
        let seed = config.validate()?;
        let mut rng = SimRng::new(seed);
        let (world, players) = generate(&config, &mut rng);
        let t = &config.tuning;

        let mut engine = Self {
            sim_state: SimState::new(t.countdown_seconds),
            commands: CommandQueue::with_max_history(t.command_history),
            hashes: HashAccumulator::new(t.hash_interval_ticks),
            last_state_hash: 0,
            events: EventLog::new(EVENT_CAPACITY),
            next_sequence: 0,
            dust_grid: SpatialGrid::new(t.dust_cell_size),
            rng,
            world,
            players,
            seed,
            config,
        };
        let initial = engine.compute_state_hash();
        engine.last_state_hash = engine.hashes.fold(0, initial);
        tracing::info!(seed, players = engine.players.len(), "match created");
        Ok(engine)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn tuning(&self) -> &Tuning {
        &self.config.tuning
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Completed ticks.
    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.index())
    }

    pub fn rng_state(&self) -> u64 {
        self.rng.state()
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Run exactly one tick with the given step. Lockstep peers must pass
    /// the same `dt`; [`Engine::step`] uses the configured fixed step.
    /// Non-finite or negative steps run as zero.
    pub fn update(&mut self, dt: f32) -> AdvanceResult {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let mut result = AdvanceResult::default();
        self.step_internal(dt, &mut result);
        result
    }

    /// Run one fixed tick.
    pub fn step(&mut self) -> AdvanceResult {
        self.update(self.config.tuning.fixed_dt)
    }

    /// Accumulate host time and run as many fixed ticks as fit.
    pub fn advance(&mut self, elapsed: f32) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if !(elapsed.is_finite() && elapsed > 0.0) {
            return result;
        }
        let step = self.config.tuning.fixed_dt;
        self.sim_state.accumulator += elapsed;
        while self.sim_state.accumulator >= step {
            self.sim_state.accumulator -= step;
            self.step_internal(step, &mut result);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Buffer commands received from the transport. They apply at the
    /// start of the first tick at or after their scheduled tick.
    pub fn deliver_command_batch(&mut self, commands: Vec<Command>) {
        self.commands.push_batch(commands);
    }

    /// Stamp a locally issued command with its execution tick and
    /// sequence, buffer it, and hand it to the transport.
    pub fn issue_command<T: CommandTransport>(&mut self, transport: &mut T, kind: CommandKind) -> Command {
        let command = Command::new(
            self.sim_state.tick + self.config.tuning.input_delay_ticks,
            transport.local_player(),
            self.next_sequence,
            kind,
        );
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.commands.push(command.clone());
        transport.send_command(&command);
        command
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.pending_count()
    }

    /// Every applied command as `(applied_tick, command)`, in application
    /// order.
    pub fn command_history(&self) -> &[(Ticks, Command)] {
        self.commands.history()
    }

    /// Apply engine-originated commands (AI, starting deploy) at once. They
    /// are not recorded: replays regenerate them.
    fn apply_internal(&mut self, player: PlayerId, kinds: Vec<CommandKind>) {
        let tick = self.sim_state.tick;
        let mut batch: Vec<Command> = kinds
            .into_iter()
            .enumerate()
            .map(|(i, kind)| Command::new(tick, player, i as u32, kind))
            .collect();
        let mut ctx = RouterContext {
            world: &mut self.world,
            players: &mut self.players,
            tuning: &self.config.tuning,
            tick,
            events: &mut self.events,
        };
        apply_commands(&mut ctx, &mut batch, CommandOrdering::Arrival);
    }

    // -----------------------------------------------------------------------
    // Internal: single step
    // -----------------------------------------------------------------------

    fn step_internal(&mut self, dt: f32, result: &mut AdvanceResult) {
        // Phase 1: Commands -- apply due commands in the agreed order.
        self.phase_commands();

        // Phase 2: Countdown -- starting deploy, countdown timer.
        let live = self.phase_countdown(dt);

        // Phase 3: Environment -- suns, asteroid rotation, occluders.
        self.phase_environment(dt);

        // Phase 4: Knockback -- keep bodies out of rotating asteroids.
        self.phase_knockback(dt);

        // Collision reverts to this position. Units that skip phase 6
        // (countdown, defeated owner) must not revert to a stale one.
        for unit in self.world.units.values_mut().filter(|u| u.health > 0.0) {
            unit.prev_position = unit.position;
        }

        if live {
            // Phase 5: AI -- plan with the same vocabulary humans use.
            self.phase_ai();

            // Phase 6: Players -- economy, structures, units, prune.
            for index in 0..self.players.len() {
                self.phase_player(index, dt);
            }
        } else {
            for mirror in self.world.mirrors.values_mut() {
                move_mirror(mirror, dt);
            }
        }

        // Phase 7: Collision -- separate units, keep them out of obstacles.
        self.phase_collision(dt);

        // Phase 8: Effects -- projectiles, beams, reveal cones.
        self.phase_effects(dt);

        // Phase 9: Bookkeeping -- prune, tick counter, checkpoint.
        self.phase_bookkeeping(dt);

        result.steps_run += 1;
    }

    // -----------------------------------------------------------------------
    // Phase 1: Commands
    // -----------------------------------------------------------------------

    fn phase_commands(&mut self) {
        let tick = self.sim_state.tick;
        let mut due = self.commands.drain_due(tick);
        if due.is_empty() {
            return;
        }
        let mut ctx = RouterContext {
            world: &mut self.world,
            players: &mut self.players,
            tuning: &self.config.tuning,
            tick,
            events: &mut self.events,
        };
        let report = apply_commands(&mut ctx, &mut due, self.config.command_order);
        tracing::trace!(tick, applied = report.applied, rejected = report.rejected, "commands applied");
        self.commands.record(tick, &due);
    }

    // -----------------------------------------------------------------------
    // Phase 2: Countdown
    // -----------------------------------------------------------------------

    /// Returns whether the match is live this tick.
    fn phase_countdown(&mut self, dt: f32) -> bool {
        if !self.sim_state.mirrors_deployed {
            self.deploy_mirrors();
            self.sim_state.mirrors_deployed = true;
        }
        if !self.sim_state.in_countdown() {
            return true;
        }
        self.sim_state.countdown_remaining = (self.sim_state.countdown_remaining - dt).max(0.0);
        if !self.sim_state.in_countdown() {
            tracing::info!(tick = self.sim_state.tick, "countdown finished");
        }
        false
    }

    /// Send every player's starting mirrors toward the nearest sun and link
    /// them to the core, through the ordinary command handlers.
    fn deploy_mirrors(&mut self) {
        let distances = self.config.tuning.mirror_deploy_distances.clone();
        let spacing = distances.last().copied().unwrap_or(50.0) / distances.len().max(1) as f32;
        for index in 0..self.players.len() {
            let player = PlayerId(index as u8);
            let Some(core_id) = self.players[index].core else {
                continue;
            };
            let Some(core) = self.world.cores.get(core_id).map(|c| c.position) else {
                continue;
            };
            let toward = nearest_sun(core, &self.world.suns)
                .map_or(Vec2::X, |s| (s.position - core).normalize_or(Vec2::X));
            let mirrors: Vec<MirrorId> = self
                .world
                .mirrors
                .iter()
                .filter(|(_, m)| m.owner == player)
                .map(|(id, _)| id)
                .collect();

            let mut kinds = Vec::with_capacity(mirrors.len() * 2);
            for (i, id) in mirrors.into_iter().enumerate() {
                let extra = (i + 1).saturating_sub(distances.len()) as f32;
                let d = distances
                    .get(i)
                    .copied()
                    .unwrap_or_else(|| distances.last().copied().unwrap_or(0.0) + spacing * extra);
                kinds.push(CommandKind::MoveMirrors {
                    mirrors: vec![id],
                    target: core + toward * d,
                });
                kinds.push(CommandKind::LinkMirror {
                    mirror: id,
                    link: MirrorLink::Core(core_id),
                });
            }
            if !kinds.is_empty() {
                self.apply_internal(player, kinds);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 3: Environment
    // -----------------------------------------------------------------------

    fn phase_environment(&mut self, dt: f32) {
        for sun in &mut self.world.suns {
            if let Some(orbit) = sun.orbit {
                let offset = sun.position - orbit.center;
                sun.position = orbit.center + offset.rotate(orbit.angular_speed * dt);
            }
        }
        for asteroid in self.world.asteroids.values_mut() {
            asteroid.rotation = (asteroid.rotation + asteroid.rotation_speed * dt).rem_euclid(TAU);
        }
        self.world.refresh_occluders();
    }

    // -----------------------------------------------------------------------
    // Phase 4: Knockback
    // -----------------------------------------------------------------------

    fn phase_knockback(&mut self, dt: f32) {
        let t = &self.config.tuning;
        let World {
            asteroids,
            units,
            mirrors,
            ..
        } = &mut self.world;
        let rocks: Vec<&Asteroid> = asteroids.values().collect();
        if rocks.is_empty() {
            return;
        }
        for unit in units.values_mut().filter(|u| u.health > 0.0) {
            asteroid_knockback(
                &mut unit.position,
                unit.radius,
                &rocks,
                t.knockback_speed,
                t.knockback_padding,
                dt,
            );
        }
        for mirror in mirrors.values_mut().filter(|m| m.health > 0.0) {
            asteroid_knockback(
                &mut mirror.position,
                mirror.radius,
                &rocks,
                t.knockback_speed,
                t.knockback_padding,
                dt,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Phase 5: AI
    // -----------------------------------------------------------------------

    fn phase_ai(&mut self) {
        let now = self.sim_state.game_time;
        for index in 0..self.players.len() {
            let Some(mut ai) = self.players[index].ai.take() else {
                continue;
            };
            let kinds = {
                let view = AiView {
                    player: &self.players[index],
                    world: &self.world,
                    tuning: &self.config.tuning,
                    now,
                };
                plan_commands(&mut ai, &view, &mut self.rng)
            };
            self.players[index].ai = Some(ai);
            if !kinds.is_empty() {
                self.apply_internal(PlayerId(index as u8), kinds);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 6: Players
    // -----------------------------------------------------------------------

    fn phase_player(&mut self, index: usize, dt: f32) {
        let owner = PlayerId(index as u8);
        if self.players[index].is_defeated(&self.world.cores) {
            return;
        }
        let tick = self.sim_state.tick;
        let Self {
            config,
            world,
            players,
            rng,
            events,
            ..
        } = self;
        let t = &config.tuning;
        let team = world.team_of(owner);

        // Mirrors: light is recomputed from scratch every tick.
        for core in world.cores.values_mut().filter(|c| c.owner == owner) {
            core.incoming_light = Fixed64::ZERO;
        }
        for b in world.buildings.values_mut().filter(|b| b.owner == owner) {
            b.incoming_light = Fixed64::ZERO;
        }
        let light = LightContext {
            suns: &world.suns,
            occluders: &world.occluders,
            bonus: players[index].upgrades.mirror_bonus(),
            dt,
        };
        let credited = update_mirrors(owner, &mut world.mirrors, &mut world.cores, &mut world.buildings, &light);
        let player = &mut players[index];
        player.energy = player.energy.saturating_add(credited);

        let targets = world.collect_targets();
        let mut produced: Vec<(ProductionSource, ProductionItem)> = Vec::new();

        // Core.
        if let Some(core_id) = player.core {
            if let Some(core) = world.cores.get_mut(core_id).filter(|c| c.health > 0.0) {
                if let Some(item) = update_core(core, t, dt) {
                    produced.push((ProductionSource::Core(core_id), item));
                }
            }
        }

        // Buildings.
        let sites: Vec<(BuildingId, bool)> = world
            .buildings
            .iter()
            .filter(|(_, b)| b.owner == owner && b.health > 0.0)
            .map(|(id, b)| {
                (
                    id,
                    world.in_influence(owner, b.position, t.influence_radius, t.gate_influence_radius),
                )
            })
            .collect();
        for (id, in_influence) in sites {
            let ctx = BuildingContext {
                tuning: t,
                dt,
                team,
                in_influence,
                targets: &targets,
                occluders: &world.occluders,
            };
            let Some(b) = world.buildings.get_mut(id) else {
                continue;
            };
            let outcome = update_building(b, &mut player.energy, &ctx);
            if outcome.completed {
                tracing::info!(player = %owner, kind = ?b.kind, tick, "building completed");
                events.push(SimEvent::BuildingCompleted {
                    building: id,
                    owner,
                    kind: b.kind,
                    tick,
                });
            }
            if let Some(item) = outcome.produced {
                produced.push((ProductionSource::Building(id), item));
            }
        }

        // Units.
        let unit_ids: Vec<UnitId> = world
            .units
            .iter()
            .filter(|(_, u)| u.owner == owner && u.health > 0.0)
            .map(|(id, _)| id)
            .collect();
        let core_position = world.core_position(owner);
        let ctx = UnitContext {
            tuning: t,
            dt,
            team,
            targets: &targets,
            rituals: &world.rituals,
            core_position,
            occluders: &world.occluders,
        };
        for id in unit_ids {
            let Some(unit) = world.units.get_mut(id) else {
                continue;
            };
            if let Some((hero, direction)) = update_unit(unit, &ctx, rng) {
                events.push(SimEvent::AbilityFired {
                    unit: id,
                    owner,
                    hero,
                    direction,
                    tick,
                });
            }
        }

        update_rituals(world, owner, t, tick, events);

        // Drain outboxes exactly once.
        let mut effects = Vec::new();
        for unit in world.units.values_mut().filter(|u| u.owner == owner) {
            effects.extend(unit.outbox.drain());
        }
        for b in world.buildings.values_mut().filter(|b| b.owner == owner) {
            effects.extend(b.outbox.drain());
        }
        realize_effects(world, effects);

        for (source, item) in produced {
            realize_production(world, player, source, item, t, rng, events, tick);
        }

        prune_dead(world, players, events, tick);
    }

    // -----------------------------------------------------------------------
    // Phase 7: Collision
    // -----------------------------------------------------------------------

    fn phase_collision(&mut self, dt: f32) {
        let t = &self.config.tuning;
        let world = &mut self.world;

        resolve_unit_collisions(&mut world.units);

        let mut obstacles: Vec<Obstacle> = Vec::new();
        obstacles.extend(world.asteroids.values().map(|a| Obstacle {
            position: a.position,
            radius: a.radius,
            kind: ObstacleKind::Asteroid,
            team: None,
        }));
        obstacles.extend(world.cores.values().filter(|c| c.health > 0.0).map(|c| Obstacle {
            position: c.position,
            radius: c.radius,
            kind: ObstacleKind::Core,
            team: None,
        }));
        obstacles.extend(world.mirrors.values().filter(|m| m.health > 0.0).map(|m| Obstacle {
            position: m.position,
            radius: m.radius,
            kind: ObstacleKind::Mirror,
            team: Some(world.team_of(m.owner)),
        }));
        obstacles.extend(world.buildings.values().filter(|b| b.health > 0.0).map(|b| Obstacle {
            position: b.position,
            radius: b.radius,
            kind: ObstacleKind::Building,
            team: None,
        }));
        let teams = &world.teams;
        let team_of = |u: &Unit| teams.get(u.owner.index()).copied().unwrap_or(u8::MAX);
        resolve_unit_obstacles(
            &mut world.units,
            &obstacles,
            team_of,
            &PushParams {
                push_multiplier: t.push_multiplier,
                max_push_distance: t.max_push_distance,
            },
        );

        let structures: Vec<(Vec2, f32)> = world
            .cores
            .values()
            .filter(|c| c.health > 0.0)
            .map(|c| (c.position, c.radius))
            .chain(
                world
                    .buildings
                    .values()
                    .filter(|b| b.health > 0.0)
                    .map(|b| (b.position, b.radius)),
            )
            .collect();
        enforce_structure_standoff(&mut world.units, &structures, t.structure_standoff);
        let reverted = revert_embedded_units(&mut world.units, &obstacles, team_of);
        if reverted > 0 {
            tracing::trace!(reverted, "standoff pushed units into obstacles");
        }

        if !world.dust.is_empty() {
            let bodies: Vec<(Vec2, f32)> = world
                .units
                .values()
                .filter(|u| u.health > 0.0)
                .map(|u| (u.position, u.radius))
                .collect();
            let params = DustParams {
                repulsion_radius: t.dust_repulsion_radius,
                repulsion_strength: t.dust_repulsion_strength,
                unit_push: t.dust_unit_push,
                damping: t.dust_damping,
                half_extents: world.half_extents,
            };
            step_dust(&mut world.dust, &mut self.dust_grid, &bodies, &params, dt);
        }
    }

    // -----------------------------------------------------------------------
    // Phase 8: Effects
    // -----------------------------------------------------------------------

    fn phase_effects(&mut self, dt: f32) {
        let tick = self.sim_state.tick;
        resolve_projectiles(&mut self.world, dt, tick, &mut self.events);
        resolve_beams(&mut self.world, dt);
        age_reveals(&mut self.world, dt);
    }

    // -----------------------------------------------------------------------
    // Phase 9: Bookkeeping
    // -----------------------------------------------------------------------

    fn phase_bookkeeping(&mut self, dt: f32) {
        prune_dead(&mut self.world, &self.players, &mut self.events, self.sim_state.tick);
        self.sim_state.tick += 1;
        self.sim_state.game_time += f64::from(dt);

        let tick = self.sim_state.tick;
        if self.hashes.is_due(tick) {
            let state = self.compute_state_hash();
            let hash = self.hashes.fold(tick, state);
            self.last_state_hash = hash;
            self.events.push(SimEvent::Checkpoint { tick, hash });
            tracing::debug!(tick, hash, "hash checkpoint");
        }
    }

    // -----------------------------------------------------------------------
    // Hashing
    // -----------------------------------------------------------------------

    /// Rolling hash at the most recent checkpoint.
    pub fn state_hash(&self) -> u32 {
        self.last_state_hash
    }

    /// Rolling hash at `tick`, while it is still retained.
    pub fn checkpoint(&self, tick: Ticks) -> Option<u32> {
        self.hashes.at(tick)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = (Ticks, u32)> + '_ {
        self.hashes.checkpoints()
    }

    /// Fresh hash of the canonical state subset. Dust is cosmetic and
    /// excluded.
    pub fn compute_state_hash(&self) -> u32 {
        let mut h = StateHash::new();
        h.write_u64(self.sim_state.tick);
        h.write_f32(self.sim_state.countdown_remaining);
        h.write_u64(self.rng.state());
        hash_players(&self.players, &self.world, &mut h);
        hash_units(&self.world, &mut h);
        hash_structures(&self.world, &mut h);
        hash_environment(&self.world, &mut h);
        hash_effects(&self.world, &mut h);
        h.finish()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Fog-of-war query for `player`.
    pub fn is_visible_to(&self, player: PlayerId, point: Vec2) -> bool {
        let world = &self.world;
        let viewer = Viewer {
            team: world.team_of(player),
            core_position: world.core_position(player),
            influence_radius: self.config.tuning.influence_radius,
        };
        let units: Vec<(u8, Vec2, f32)> = world
            .units
            .values()
            .filter(|u| u.health > 0.0)
            .map(|u| (world.team_of(u.owner), u.position, u.vision_radius))
            .collect();
        is_visible(
            point,
            &viewer,
            self.config.visibility,
            &world.suns,
            &world.occluders,
            &VisionSources {
                units: &units,
                reveals: &world.reveals,
            },
        )
    }

    pub fn is_in_shadow(&self, point: Vec2) -> bool {
        crate::visibility::is_in_shadow(point, &self.world.suns, &self.world.occluders)
    }

    pub fn is_defeated(&self, player: PlayerId) -> bool {
        self.player(player)
            .is_none_or(|p| p.is_defeated(&self.world.cores))
    }

    /// The lowest-numbered undefeated player of the only team left
    /// standing, or `None` while two or more teams remain.
    pub fn winner(&self) -> Option<PlayerId> {
        let alive: Vec<&Player> = self
            .players
            .iter()
            .filter(|p| !p.is_defeated(&self.world.cores))
            .collect();
        let first = alive.first()?;
        if alive.iter().all(|p| p.team == first.team) {
            Some(first.id)
        } else {
            None
        }
    }

    /// Take every buffered event, oldest first.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain()
    }
}

// ---------------------------------------------------------------------------
// Production and pruning
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn realize_production(
    world: &mut World,
    player: &mut Player,
    source: ProductionSource,
    item: ProductionItem,
    tuning: &Tuning,
    rng: &mut SimRng,
    events: &mut EventLog,
    tick: Ticks,
) {
    let owner = player.id;
    let origin = match source {
        ProductionSource::Core(id) => world.cores.get(id).map(|c| (c.position, c.radius)),
        ProductionSource::Building(id) => world.buildings.get(id).map(|b| (b.position, b.radius)),
    };
    let Some((position, radius)) = origin else {
        return;
    };

    let unit_kind = match item {
        ProductionItem::Worker => Some(UnitKind::Worker),
        ProductionItem::Soldier => Some(UnitKind::Soldier),
        ProductionItem::Hero(hero) => Some(UnitKind::Hero(hero)),
        ProductionItem::Mirror | ProductionItem::Upgrade(_) => None,
    };

    if let Some(kind) = unit_kind {
        let mut unit = new_unit(kind, owner, position, tuning, &player.upgrades);
        let reach = radius + unit.radius + rng.range_f32(0.0, tuning.spawn_jitter);
        unit.position = position + Vec2::from_angle(rng.angle()) * reach;
        unit.prev_position = unit.position;
        if !player.patrol_path.is_empty() {
            unit.order = UnitOrder::Path {
                waypoints: player.patrol_path.clone(),
                next: 0,
            };
        }
        let id = world.units.insert(unit);
        events.push(SimEvent::UnitSpawned {
            unit: id,
            owner,
            kind,
            tick,
        });
    }

    match item {
        ProductionItem::Mirror => {
            let reach = radius + tuning.mirror_radius + rng.range_f32(0.0, tuning.spawn_jitter);
            let at = position + Vec2::from_angle(rng.angle()) * reach;
            let mirror = world.mirrors.insert(new_mirror(owner, at, tuning));
            events.push(SimEvent::MirrorSpawned { mirror, owner, tick });
        }
        ProductionItem::Upgrade(upgrade) => {
            player.upgrades.grant(upgrade);
            tracing::info!(player = %owner, ?upgrade, tick, "upgrade researched");
            events.push(SimEvent::UpgradeResearched { owner, upgrade, tick });
        }
        _ => {}
    }

    tracing::info!(player = %owner, ?item, tick, "production completed");
    events.push(SimEvent::ProductionCompleted { owner, item, tick });

    match source {
        ProductionSource::Core(id) => {
            if let Some(core) = world.cores.get_mut(id) {
                core.production.take_completed();
            }
        }
        ProductionSource::Building(id) => {
            if let Some(queue) = world.buildings.get_mut(id).and_then(|b| b.production.as_mut()) {
                queue.take_completed();
            }
        }
    }
}

/// Remove everything at zero health, emitting one event per removal. A
/// destroyed core also defeats its owner.
fn prune_dead(world: &mut World, players: &[Player], events: &mut EventLog, tick: Ticks) {
    let dead: Vec<(UnitId, PlayerId, UnitKind, Vec2)> = world
        .units
        .iter()
        .filter(|(_, u)| u.health <= 0.0)
        .map(|(id, u)| (id, u.owner, u.kind, u.position))
        .collect();
    for (unit, owner, kind, position) in dead {
        world.units.remove(unit);
        events.push(SimEvent::UnitDied {
            unit,
            owner,
            kind,
            position,
            tick,
        });
    }

    let dead: Vec<(BuildingId, PlayerId, BuildingKind, Vec2)> = world
        .buildings
        .iter()
        .filter(|(_, b)| b.health <= 0.0)
        .map(|(id, b)| (id, b.owner, b.kind, b.position))
        .collect();
    for (building, owner, kind, position) in dead {
        world.buildings.remove(building);
        tracing::debug!(player = %owner, ?kind, tick, "building destroyed");
        events.push(SimEvent::BuildingDestroyed {
            building,
            owner,
            kind,
            position,
            tick,
        });
    }

    let dead: Vec<(MirrorId, PlayerId, Vec2)> = world
        .mirrors
        .iter()
        .filter(|(_, m)| m.health <= 0.0)
        .map(|(id, m)| (id, m.owner, m.position))
        .collect();
    for (mirror, owner, position) in dead {
        world.mirrors.remove(mirror);
        events.push(SimEvent::MirrorDestroyed {
            mirror,
            owner,
            position,
            tick,
        });
    }

    let dead: Vec<(CoreId, PlayerId, Vec2)> = world
        .cores
        .iter()
        .filter(|(_, c)| c.health <= 0.0)
        .map(|(id, c)| (id, c.owner, c.position))
        .collect();
    for (core, owner, position) in dead {
        world.cores.remove(core);
        events.push(SimEvent::CoreDestroyed {
            core,
            owner,
            position,
            tick,
        });
        if players.get(owner.index()).is_some_and(|p| p.core == Some(core)) {
            tracing::info!(player = %owner, tick, "player defeated");
            events.push(SimEvent::PlayerDefeated { player: owner, tick });
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical hashing
// ---------------------------------------------------------------------------

pub(crate) fn hash_players(players: &[Player], world: &World, h: &mut StateHash) {
    for p in players {
        h.write_u32(u32::from(p.id.0));
        h.write_fixed64(p.energy);
        h.write_u32(p.upgrades.bits());
        h.write_bool(p.core.is_some_and(|c| world.cores.contains_key(c)));
        h.write_u32(p.patrol_path.len() as u32);
        for w in &p.patrol_path {
            h.write_vec2(*w);
        }
        // AI policy timers decide when the next orders are issued.
        match &p.ai {
            Some(ai) => {
                h.write_bool(true);
                h.write_u32(ai.strategy as u32);
                h.write_f64(ai.last_think);
                h.write_f64(ai.last_build);
                h.write_f64(ai.last_attack);
                h.write_u32(ai.builds);
            }
            None => h.write_bool(false),
        }
    }
}

pub(crate) fn hash_units(world: &World, h: &mut StateHash) {
    for (id, u) in &world.units {
        h.write_u64(key_bits(id));
        h.write_u32(u32::from(u.owner.0));
        h.write_u32(u.kind.tag());
        h.write_vec2(u.position);
        h.write_vec2(u.velocity);
        h.write_f32(u.health);
        h.write_f32(u.max_health);
        h.write_u32(u.order.tag());
        h.write_f32(u.ability_cooldown);
        if let Some(a) = &u.attack {
            h.write_f32(a.timer);
        }
    }
}

pub(crate) fn hash_structures(world: &World, h: &mut StateHash) {
    for (id, c) in &world.cores {
        h.write_u64(key_bits(id));
        h.write_vec2(c.position);
        h.write_f32(c.health);
        hash_queue(&c.production, h);
    }
    for (id, b) in &world.buildings {
        h.write_u64(key_bits(id));
        h.write_u32(u32::from(b.owner.0));
        h.write_vec2(b.position);
        h.write_f32(b.health);
        h.write_fixed64(b.construction.progress());
        if let Some(q) = &b.production {
            hash_queue(q, h);
        }
        if let Some(a) = &b.attack {
            h.write_f32(a.timer);
        }
        if let Some(s) = &b.shield {
            h.write_f32(s.charge);
        }
        match b.lance {
            None | Some(LanceState::Ready) => h.write_u32(0),
            Some(LanceState::LockingOn { aim, remaining }) => {
                h.write_u32(1);
                h.write_vec2(aim);
                h.write_f32(remaining);
            }
            Some(LanceState::Reloading { remaining }) => {
                h.write_u32(2);
                h.write_f32(remaining);
            }
        }
    }
    for (id, m) in &world.mirrors {
        h.write_u64(key_bits(id));
        h.write_u32(u32::from(m.owner.0));
        h.write_vec2(m.position);
        h.write_f32(m.health);
        h.write_u32(m.link.tag());
        h.write_fixed64(m.efficiency);
    }
}

fn hash_queue(q: &crate::production::ProductionQueue, h: &mut StateHash) {
    h.write_u32(q.state() as u32);
    h.write_u32(q.current().map_or(u32::MAX, ProductionItem::tag));
    h.write_fixed64(q.progress());
    for item in q.queued() {
        h.write_u32(item.tag());
    }
}

pub(crate) fn hash_environment(world: &World, h: &mut StateHash) {
    for s in &world.suns {
        h.write_vec2(s.position);
    }
    for (_, a) in &world.asteroids {
        h.write_vec2(a.position);
        h.write_f32(a.rotation);
    }
    for (_, r) in &world.rituals {
        h.write_vec2(r.position);
        h.write_u32(r.participants.len() as u32);
    }
}

pub(crate) fn hash_effects(world: &World, h: &mut StateHash) {
    for p in &world.projectiles {
        h.write_vec2(p.position);
        h.write_vec2(p.velocity);
        h.write_f32(p.lifetime);
    }
    for b in &world.beams {
        h.write_vec2(b.start);
        h.write_vec2(b.end);
        h.write_f32(b.ttl);
    }
    for r in &world.reveals {
        h.write_vec2(r.origin);
        h.write_f32(r.ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Formation;
    use crate::config::PlayerSetup;
    use crate::test_utils::*;

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn missing_seed_is_fatal() {
        let mut cfg = two_player_config(1);
        cfg.seed = None;
        assert!(matches!(Engine::new(cfg), Err(ConfigError::MissingSeed)));
    }

    #[test]
    fn fresh_engine_has_tick_zero_checkpoint() {
        let engine = Engine::new(two_player_config(1)).unwrap();
        assert_eq!(engine.tick(), 0);
        assert_eq!(engine.checkpoint(0), Some(engine.state_hash()));
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    #[test]
    fn advance_accumulates_fixed_steps() {
        let mut engine = Engine::new(two_player_config(1)).unwrap();
        let dt = engine.tuning().fixed_dt;
        assert_eq!(engine.advance(dt * 0.5).steps_run, 0);
        assert_eq!(engine.advance(dt * 2.0).steps_run, 2);
        assert_eq!(engine.tick(), 2);
    }

    #[test]
    fn bad_dt_runs_a_zero_step() {
        let mut engine = Engine::new(two_player_config(1)).unwrap();
        assert_eq!(engine.update(f32::NAN).steps_run, 1);
        assert_eq!(engine.sim_state.game_time, 0.0);
        assert_eq!(engine.advance(-1.0).steps_run, 0);
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    #[test]
    fn countdown_deploys_mirrors_without_economy() {
        let mut engine = Engine::new(two_player_config(4)).unwrap();
        let energy = engine.players[0].energy;
        let ticks = (engine.tuning().countdown_seconds / engine.tuning().fixed_dt) as u64 - 5;
        run_ticks(&mut engine, ticks);
        assert!(engine.sim_state.in_countdown());
        assert_eq!(engine.players[0].energy, energy);

        let core = engine.world.core_position(PlayerId(0)).unwrap();
        let mut distances: Vec<f32> = engine
            .world
            .mirrors
            .values()
            .filter(|m| m.owner == PlayerId(0))
            .map(|m| {
                assert!(matches!(m.link, MirrorLink::Core(_)));
                m.position.distance(core)
            })
            .collect();
        distances.sort_by(f32::total_cmp);
        assert!((distances[0] - 50.0).abs() < 0.5);
        assert!((distances[1] - 100.0).abs() < 0.5);
    }

    #[test]
    fn deployed_mirrors_earn_after_countdown() {
        let mut engine = Engine::new(two_player_config(4)).unwrap();
        let energy = engine.players[0].energy;
        let ticks = (engine.tuning().countdown_seconds / engine.tuning().fixed_dt) as u64 + 60;
        run_ticks(&mut engine, ticks);
        assert!(!engine.sim_state.in_countdown());
        assert!(engine.players[0].energy > energy);
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    #[test]
    fn issued_command_applies_after_input_delay() {
        let mut engine = bare_engine();
        let unit = spawn_unit(&mut engine, 0, UnitKind::Soldier, Vec2::new(-200.0, 0.0));
        let mut transport = LoopbackTransport::new(PlayerId(0));
        let cmd = engine.issue_command(
            &mut transport,
            CommandKind::MoveUnits {
                units: vec![unit],
                target: Vec2::new(-200.0, 200.0),
                formation: Formation::Direct,
            },
        );
        assert_eq!(cmd.tick, engine.tuning().input_delay_ticks);
        assert_eq!(transport.sent.len(), 1);

        run_ticks(&mut engine, cmd.tick);
        assert_eq!(engine.world.units[unit].order, UnitOrder::Idle);
        engine.step();
        assert_eq!(engine.world.units[unit].order, UnitOrder::Rally(Vec2::new(-200.0, 200.0)));
        assert_eq!(engine.command_history().len(), 1);
    }

    #[test]
    fn late_command_still_applies() {
        let mut engine = bare_engine();
        run_ticks(&mut engine, 10);
        engine.deliver_command_batch(vec![Command::new(2, PlayerId(1), 0, CommandKind::PurchaseWorker)]);
        engine.step();
        assert_eq!(engine.command_history(), &[(10, Command::new(2, PlayerId(1), 0, CommandKind::PurchaseWorker))]);
        let core = engine.players[1].core.unwrap();
        assert!(engine.world.cores[core].production.contains(ProductionItem::Worker));
    }

    #[test]
    fn unknown_command_is_recorded_but_harmless() {
        let mut a = bare_engine();
        let mut b = bare_engine();
        a.deliver_command_batch(vec![Command::new(0, PlayerId(0), 0, CommandKind::Unknown { tag: 99 })]);
        a.step();
        b.step();
        assert_eq!(a.compute_state_hash(), b.compute_state_hash());
        assert_eq!(a.command_history().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Production and economy
    // -----------------------------------------------------------------------

    #[test]
    fn lit_core_produces_a_worker() {
        let mut engine = bare_engine();
        link_mirror_to_core(&mut engine, 0);
        engine.players[0].energy = Fixed64::from_num(100);
        engine.deliver_command_batch(vec![Command::new(0, PlayerId(0), 0, CommandKind::PurchaseWorker)]);
        let before = engine.world.units.len();
        let ticks = (engine.tuning().worker.build_time / engine.tuning().fixed_dt) as u64 + 3;
        run_ticks(&mut engine, ticks);
        assert_eq!(engine.world.units.len(), before + 1);
        let events = engine.drain_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SimEvent::ProductionCompleted { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn unlit_core_does_not_produce() {
        let mut engine = bare_engine();
        engine.deliver_command_batch(vec![Command::new(0, PlayerId(0), 0, CommandKind::PurchaseWorker)]);
        run_ticks(&mut engine, 600);
        assert!(engine.world.units.is_empty());
    }

    #[test]
    fn patrol_path_applies_to_new_units() {
        let mut engine = bare_engine();
        link_mirror_to_core(&mut engine, 0);
        let path = vec![Vec2::new(0.0, 300.0), Vec2::new(0.0, -300.0)];
        engine.deliver_command_batch(vec![
            Command::new(0, PlayerId(0), 0, CommandKind::SetPatrolPath { waypoints: path.clone() }),
            Command::new(0, PlayerId(0), 1, CommandKind::PurchaseWorker),
        ]);
        let ticks = (engine.tuning().worker.build_time / engine.tuning().fixed_dt) as u64 + 3;
        run_ticks(&mut engine, ticks);
        let unit = engine.world.units.values().next().unwrap();
        assert!(matches!(unit.order, UnitOrder::Path { .. }));
    }

    // -----------------------------------------------------------------------
    // Defeat and victory
    // -----------------------------------------------------------------------

    #[test]
    fn destroyed_core_defeats_player() {
        let mut engine = bare_engine();
        let core = engine.players[1].core.unwrap();
        engine.world.cores[core].health = 0.0;
        engine.step();
        assert!(engine.is_defeated(PlayerId(1)));
        assert_eq!(engine.winner(), Some(PlayerId(0)));
        assert!(engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, SimEvent::PlayerDefeated { player: PlayerId(1), .. })));
    }

    #[test]
    fn no_winner_while_teams_remain() {
        let mut cfg = two_player_config(2);
        cfg.players.push(PlayerSetup::human("c", 0));
        let engine = Engine::new(cfg).unwrap();
        assert_eq!(engine.winner(), None);
    }

    // -----------------------------------------------------------------------
    // Collision
    // -----------------------------------------------------------------------

    #[test]
    fn standoff_never_leaves_unit_inside_rock() {
        let mut engine = bare_engine();
        let core = engine.world.core_position(PlayerId(0)).unwrap();
        let rock = core + Vec2::new(0.0, 79.0);
        place_asteroid(&mut engine, rock, 20.0, 0.0);
        let id = spawn_unit(&mut engine, 0, UnitKind::Soldier, core + Vec2::new(0.0, 47.0));
        let radius = engine.world.units[id].radius;

        for _ in 0..30 {
            engine.step();
            let unit = &engine.world.units[id];
            assert!(
                unit.position.distance(rock) >= 20.0 + radius - 1e-2,
                "unit at {:?} is inside the asteroid",
                unit.position
            );
        }
    }

    #[test]
    fn countdown_revert_uses_current_position() {
        let mut engine = bare_engine();
        engine.sim_state.countdown_remaining = 5.0;
        let core = engine.world.core_position(PlayerId(0)).unwrap();
        let spawned_at = core + Vec2::new(300.0, 0.0);
        let id = spawn_unit(&mut engine, 0, UnitKind::Soldier, spawned_at);
        let inside = core + Vec2::new(0.0, 20.0);
        engine.world.units[id].position = inside;

        engine.step();
        assert!(engine.sim_state.in_countdown());
        let unit = &engine.world.units[id];
        assert_eq!(unit.prev_position, inside);
        assert!(unit.position.distance(spawned_at) > 100.0);
    }

    // -----------------------------------------------------------------------
    // Hashing and visibility
    // -----------------------------------------------------------------------

    #[test]
    fn checkpoints_every_interval() {
        let mut engine = bare_engine();
        let interval = engine.tuning().hash_interval_ticks;
        run_ticks(&mut engine, interval * 2);
        assert!(engine.checkpoint(interval).is_some());
        assert_eq!(engine.checkpoint(interval * 2), Some(engine.state_hash()));
        assert!(engine.checkpoint(interval + 1).is_none());
    }

    #[test]
    fn hash_sees_health_changes() {
        let mut engine = bare_engine();
        let before = engine.compute_state_hash();
        let core = engine.players[0].core.unwrap();
        engine.world.cores[core].health -= 1.0;
        assert_ne!(engine.compute_state_hash(), before);
    }

    #[test]
    fn hash_sees_ai_timers() {
        let mut config = two_player_config(9);
        config.players[1] = PlayerSetup::ai("beta", 1);
        let mut engine = Engine::new(config).unwrap();
        let before = engine.compute_state_hash();

        engine.players[1].ai.as_mut().unwrap().last_build += 1.0;
        assert_ne!(engine.compute_state_hash(), before);

        let ai = engine.players[1].ai.as_mut().unwrap();
        ai.last_build -= 1.0;
        ai.builds += 1;
        assert_ne!(engine.compute_state_hash(), before);
    }

    #[test]
    fn shadowed_point_needs_vision() {
        let mut engine = bare_engine();
        place_asteroid(&mut engine, Vec2::new(0.0, 300.0), 60.0, 0.0);
        let hidden = Vec2::new(0.0, 500.0);
        assert!(engine.is_in_shadow(hidden));
        assert!(!engine.is_visible_to(PlayerId(0), hidden));
        spawn_unit(&mut engine, 0, UnitKind::Soldier, Vec2::new(0.0, 450.0));
        assert!(engine.is_visible_to(PlayerId(0), hidden));
        assert!(!engine.is_visible_to(PlayerId(1), hidden));
    }
}
