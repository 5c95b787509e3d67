//! Unit behaviour, hero abilities, effect resolution and fusion rituals.
//!
//! Unit updates read a target snapshot taken at the start of the owning
//! player's turn and write only to the unit itself and its outbox. Damage
//! from projectiles and beams is applied in the effects phase, after every
//! player has moved.

use crate::config::Tuning;
use crate::effects::{BeamEffect, Effect, Projectile, RevealCone};
use crate::entity::*;
use crate::event::{EventLog, SimEvent};
use crate::fixed::Ticks;
use crate::id::{BuildingId, PlayerId, RitualId};
use crate::math::{Ray, Vec2, closest_point_on_segment, point_in_polygon};
use crate::rng::SimRng;
use crate::structures::new_building;
use crate::visibility::{Occluder, first_obstruction};
use crate::world::World;
use slotmap::SlotMap;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Inputs for one player's unit pass.
pub struct UnitContext<'a> {
    pub tuning: &'a Tuning,
    pub dt: f32,
    pub team: u8,
    pub targets: &'a [TargetInfo],
    pub rituals: &'a SlotMap<RitualId, FusionRitual>,
    /// Owner's live core position, for influence regeneration.
    pub core_position: Option<Vec2>,
    pub occluders: &'a [Occluder],
}

impl UnitContext<'_> {
    fn projectile(&self) -> ProjectileTemplate {
        ProjectileTemplate {
            team: self.team,
            radius: self.tuning.projectile_radius,
            lifetime: self.tuning.projectile_lifetime,
            splash_radius: 0.0,
        }
    }

    fn find(&self, target: TargetRef) -> Option<&TargetInfo> {
        self.targets.iter().find(|t| t.target == target)
    }
}

/// A freshly spawned unit with stats from `tuning`. Hardened hulls raise
/// max health for units created after the upgrade.
pub fn new_unit(
    kind: UnitKind,
    owner: PlayerId,
    position: Vec2,
    tuning: &Tuning,
    upgrades: &crate::player::Upgrades,
) -> Unit {
    let stats = match kind {
        UnitKind::Worker => &tuning.worker,
        UnitKind::Soldier => &tuning.soldier,
        UnitKind::Hero(_) => &tuning.hero,
    };
    let health = stats.health * upgrades.health_bonus();
    Unit {
        owner,
        kind,
        position,
        prev_position: position,
        velocity: Vec2::ZERO,
        health,
        max_health: health,
        radius: stats.radius,
        speed: stats.speed,
        vision_radius: stats.vision,
        order: UnitOrder::Idle,
        attack: AttackStats::new(
            stats.damage,
            stats.range,
            stats.attack_cooldown,
            stats.projectile_speed,
        ),
        ability_cooldown: 0.0,
        pending_ability: None,
        outbox: crate::effects::Outbox::default(),
    }
}

/// Nearest enemy in attack range, ties to the earlier snapshot entry.
pub fn acquire_target<'t>(unit: &Unit, team: u8, targets: &'t [TargetInfo]) -> Option<&'t TargetInfo> {
    let mut best: Option<(&TargetInfo, f32)> = None;
    for t in targets {
        if t.team == team || !unit.in_range(t) {
            continue;
        }
        let d = t.position.distance_sq(unit.position);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((t, d));
        }
    }
    best.map(|(t, _)| t)
}

/// Fire a queued hero ability into the unit's outbox. Returns the hero kind
/// and direction when something fired.
pub fn fire_ability(unit: &mut Unit, ctx: &UnitContext<'_>, rng: &mut SimRng) -> Option<(HeroKind, Vec2)> {
    let direction = unit.pending_ability.take()?;
    let UnitKind::Hero(hero) = unit.kind else {
        return None;
    };
    if unit.ability_cooldown > 0.0 {
        return None;
    }
    let t = ctx.tuning;
    match hero {
        HeroKind::Lancer => {
            let reach = first_obstruction(
                &Ray::new(unit.position, direction),
                t.lancer_beam_length,
                ctx.occluders,
            );
            unit.outbox.push(Effect::Beam(BeamEffect {
                owner: unit.owner,
                team: ctx.team,
                start: unit.position,
                end: unit.position + direction * reach,
                damage: t.lancer_beam_damage,
                width: t.lancer_beam_width,
                hits_structures: false,
                ttl: t.beam_duration,
                resolved: false,
            }));
        }
        HeroKind::Scatter => {
            for _ in 0..t.scatter_projectiles {
                let spread = rng.range_f32(-t.scatter_spread, t.scatter_spread);
                unit.outbox.push(Effect::Projectile(Projectile {
                    owner: unit.owner,
                    team: ctx.team,
                    position: unit.position,
                    velocity: direction.rotate(spread) * t.scatter_speed,
                    damage: t.scatter_damage,
                    radius: t.projectile_radius,
                    lifetime: t.projectile_lifetime,
                    splash_radius: 0.0,
                    spent: false,
                }));
            }
        }
        HeroKind::Seer => {
            unit.outbox.push(Effect::Reveal(RevealCone {
                owner: unit.owner,
                team: ctx.team,
                origin: unit.position,
                direction,
                range: t.seer_reveal_range,
                half_angle: t.seer_reveal_half_angle,
                ttl: t.seer_reveal_duration,
            }));
        }
    }
    unit.ability_cooldown = t.ability_cooldown;
    Some((hero, direction))
}

/// One tick of unit behaviour: cooldowns, ability, orders, movement,
/// attacks and regeneration.
pub fn update_unit(unit: &mut Unit, ctx: &UnitContext<'_>, rng: &mut SimRng) -> Option<(HeroKind, Vec2)> {
    if unit.health <= 0.0 {
        return None;
    }
    unit.prev_position = unit.position;
    unit.cool_down(ctx.dt);
    unit.ability_cooldown = (unit.ability_cooldown - ctx.dt).max(0.0);

    let fired = fire_ability(unit, ctx, rng);
    let step = unit.speed * ctx.dt;

    match unit.order.clone() {
        UnitOrder::Attack { target, .. } => match ctx.find(target).copied() {
            Some(info) if info.team != ctx.team => {
                unit.order = UnitOrder::Attack {
                    target,
                    approach: info.position,
                };
                if unit.in_range(&info) {
                    unit.try_fire(&info, ctx.projectile());
                } else {
                    unit.position = unit.position.move_toward(info.position, step);
                }
            }
            _ => unit.order = UnitOrder::Idle,
        },
        UnitOrder::Rally(point) => {
            unit.position = unit.position.move_toward(point, step);
            if unit.position == point {
                unit.order = UnitOrder::Idle;
            }
        }
        UnitOrder::Path { waypoints, next } => match waypoints.get(next).copied() {
            Some(point) => {
                unit.position = unit.position.move_toward(point, step);
                if unit.position == point {
                    unit.order = if next + 1 < waypoints.len() {
                        UnitOrder::Path {
                            waypoints,
                            next: next + 1,
                        }
                    } else {
                        UnitOrder::Idle
                    };
                }
            }
            None => unit.order = UnitOrder::Idle,
        },
        UnitOrder::Fuse(ritual) => match ctx.rituals.get(ritual) {
            Some(r) => unit.position = unit.position.move_toward(r.position, step),
            None => unit.order = UnitOrder::Idle,
        },
        UnitOrder::Idle => {}
    }

    if !matches!(unit.order, UnitOrder::Attack { .. }) {
        if let Some(target) = acquire_target(unit, ctx.team, ctx.targets).copied() {
            unit.try_fire(&target, ctx.projectile());
        }
    }

    unit.velocity = if ctx.dt > 0.0 {
        (unit.position - unit.prev_position) / ctx.dt
    } else {
        Vec2::ZERO
    };

    let r = ctx.tuning.influence_radius;
    if ctx
        .core_position
        .is_some_and(|c| c.distance_sq(unit.position) <= r * r)
    {
        unit.health =
            (unit.health + ctx.tuning.influence_regen_per_second * ctx.dt).min(unit.max_health);
    }
    fired
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Route drained outbox effects into the world. Strikes land immediately.
pub fn realize_effects(world: &mut World, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Projectile(p) => world.projectiles.push(p),
            Effect::Beam(b) => world.beams.push(b),
            Effect::Reveal(r) => world.reveals.push(r),
            Effect::Strike { target, damage } => {
                world.apply_damage(target, damage);
            }
        }
    }
}

/// Enemy targets touched by a circle.
fn enemies_in_circle(world: &World, targets: &[TargetInfo], team: u8, center: Vec2, radius: f32) -> Vec<TargetRef> {
    targets
        .iter()
        .filter(|t| t.team != team && t.position.distance(center) <= t.radius + radius)
        .filter(|t| world.target_info(t.target).is_some())
        .map(|t| t.target)
        .collect()
}

/// Advance projectiles: move, shield interception, asteroid absorption,
/// then the first enemy hit (with splash). Spent projectiles are pruned.
pub fn resolve_projectiles(world: &mut World, dt: f32, tick: Ticks, events: &mut EventLog) {
    let targets = world.collect_targets();
    let shields: Vec<(BuildingId, Vec2, f32, u8)> = world
        .buildings
        .iter()
        .filter(|(_, b)| b.health > 0.0 && b.is_complete())
        .filter_map(|(id, b)| b.shield.map(|s| (id, b.position, s.radius, world.team_of(b.owner))))
        .collect();

    let mut projectiles = std::mem::take(&mut world.projectiles);
    for p in projectiles.iter_mut() {
        p.position += p.velocity * dt;
        p.lifetime -= dt;
        if p.lifetime <= 0.0 {
            continue;
        }

        for &(id, pos, radius, team) in &shields {
            if team == p.team || pos.distance_sq(p.position) > radius * radius {
                continue;
            }
            let Some(shield) = world.buildings.get_mut(id).and_then(|b| b.shield.as_mut()) else {
                continue;
            };
            if shield.charge >= p.damage {
                shield.charge -= p.damage;
                p.spent = true;
                events.push(SimEvent::ShieldIntercept {
                    building: id,
                    position: p.position,
                    tick,
                });
                break;
            }
        }
        if p.spent {
            continue;
        }

        if world
            .occluders
            .iter()
            .any(|o| o.center.distance_sq(p.position) <= o.radius * o.radius && point_in_polygon(p.position, &o.vertices))
        {
            p.spent = true;
            continue;
        }

        let hit = enemies_in_circle(world, &targets, p.team, p.position, p.radius)
            .into_iter()
            .next();
        let Some(first) = hit else {
            continue;
        };
        if p.splash_radius > 0.0 {
            for t in enemies_in_circle(world, &targets, p.team, p.position, p.splash_radius) {
                world.apply_damage(t, p.damage);
            }
        } else {
            world.apply_damage(first, p.damage);
        }
        p.spent = true;
        events.push(SimEvent::ProjectileImpact {
            owner: p.owner,
            position: p.position,
            tick,
        });
    }
    projectiles.retain(|p| !p.is_expired());
    world.projectiles = projectiles;
}

/// Apply each new beam's damage once, age every beam and prune expired
/// ones.
pub fn resolve_beams(world: &mut World, dt: f32) {
    let targets = world.collect_targets();
    let mut beams = std::mem::take(&mut world.beams);
    for beam in beams.iter_mut() {
        if !beam.resolved {
            let half_width = beam.width * 0.5;
            for t in &targets {
                if t.team == beam.team || (t.target.is_structure() && !beam.hits_structures) {
                    continue;
                }
                let closest = closest_point_on_segment(t.position, beam.start, beam.end);
                if closest.distance(t.position) <= t.radius + half_width {
                    world.apply_damage(t.target, beam.damage);
                }
            }
            beam.resolved = true;
        }
        beam.ttl -= dt;
    }
    beams.retain(|b| !b.is_expired());
    world.beams = beams;
}

pub fn age_reveals(world: &mut World, dt: f32) {
    for r in world.reveals.iter_mut() {
        r.ttl -= dt;
    }
    world.reveals.retain(|r| !r.is_expired());
}

// ---------------------------------------------------------------------------
// Fusion rituals
// ---------------------------------------------------------------------------

/// Maintain `owner`'s rituals: drop participants that died or were given
/// other orders, dissolve rituals that fell below the required count, and
/// fuse the workers into an incomplete warp gate once all have gathered.
pub fn update_rituals(world: &mut World, owner: PlayerId, tuning: &Tuning, tick: Ticks, events: &mut EventLog) {
    let ids: Vec<RitualId> = world
        .rituals
        .iter()
        .filter(|(_, r)| r.owner == owner)
        .map(|(id, _)| id)
        .collect();

    for id in ids {
        let Some(ritual) = world.rituals.get_mut(id) else {
            continue;
        };
        let units = &world.units;
        ritual.participants.retain(|u| {
            units
                .get(*u)
                .is_some_and(|unit| unit.health > 0.0 && unit.order == UnitOrder::Fuse(id))
        });
        let position = ritual.position;
        let participants = ritual.participants.clone();

        if participants.len() < tuning.fusion_worker_count {
            for u in &participants {
                if let Some(unit) = world.units.get_mut(*u) {
                    unit.order = UnitOrder::Idle;
                }
            }
            world.rituals.remove(id);
            tracing::debug!(player = %owner, "fusion ritual dissolved");
            events.push(SimEvent::RitualDissolved {
                ritual: id,
                owner,
                tick,
            });
            continue;
        }

        let r = tuning.fusion_radius;
        let gathered = participants
            .iter()
            .all(|u| world.units.get(*u).is_some_and(|unit| unit.position.distance_sq(position) <= r * r));
        if !gathered {
            continue;
        }
        for u in &participants {
            world.units.remove(*u);
        }
        world.rituals.remove(id);
        let gate = world
            .buildings
            .insert(new_building(BuildingKind::WarpGate, owner, position, tuning));
        tracing::info!(player = %owner, tick, "warp gate fused");
        events.push(SimEvent::RitualCompleted {
            ritual: id,
            owner,
            gate,
            tick,
        });
    }
}
