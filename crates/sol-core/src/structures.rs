//! Per-tick update of cores and buildings: construction, production,
//! cannons, shields and the lance tower sequence.
//!
//! Structures never touch other entities. Attacks go into the building's
//! outbox and finished production is returned to the orchestrator, which
//! spawns units or grants upgrades.

use crate::config::Tuning;
use crate::effects::{BeamEffect, Effect, Outbox};
use crate::entity::*;
use crate::fixed::{Fixed64, f32_to_fixed64};
use crate::id::PlayerId;
use crate::math::{Ray, Vec2};
use crate::production::{Construction, ProductionItem, ProductionQueue};
use crate::visibility::{Occluder, first_obstruction};

/// Build time of a production item in seconds.
pub fn item_build_time(tuning: &Tuning, item: ProductionItem) -> Fixed64 {
    let secs = match item {
        ProductionItem::Worker => tuning.worker.build_time,
        ProductionItem::Soldier => tuning.soldier.build_time,
        ProductionItem::Hero(_) => tuning.hero.build_time,
        ProductionItem::Mirror => tuning.mirror_build_time,
        ProductionItem::Upgrade(_) => tuning.upgrade_build_time,
    };
    f32_to_fixed64(secs)
}

/// Energy price of a production item.
pub fn item_cost(tuning: &Tuning, item: ProductionItem) -> Fixed64 {
    let cost = match item {
        ProductionItem::Worker => tuning.worker.cost,
        ProductionItem::Soldier => tuning.soldier.cost,
        ProductionItem::Hero(_) => tuning.hero.cost,
        ProductionItem::Mirror => tuning.mirror_cost,
        ProductionItem::Upgrade(_) => tuning.upgrade_cost,
    };
    f32_to_fixed64(cost)
}

/// Whether `kind` can produce `item`.
pub fn produces(kind: BuildingKind, item: ProductionItem) -> bool {
    kind == BuildingKind::Foundry
        && matches!(item, ProductionItem::Soldier | ProductionItem::Upgrade(_))
}

/// Stats row for a building kind.
pub fn building_stats(tuning: &Tuning, kind: BuildingKind) -> &crate::config::BuildingStats {
    match kind {
        BuildingKind::Cannon => &tuning.cannon,
        BuildingKind::Foundry => &tuning.foundry,
        BuildingKind::ShieldTower => &tuning.shield_tower,
        BuildingKind::LanceTower => &tuning.lance_tower,
        BuildingKind::WarpGate => &tuning.warp_gate,
    }
}

/// An incomplete building whose construction draws its full cost.
pub fn new_building(kind: BuildingKind, owner: PlayerId, position: Vec2, tuning: &Tuning) -> Building {
    let stats = building_stats(tuning, kind);
    Building {
        owner,
        kind,
        position,
        radius: stats.radius,
        health: stats.health,
        max_health: stats.health,
        construction: Construction::new(f32_to_fixed64(stats.build_time), f32_to_fixed64(stats.cost)),
        attack: AttackStats::new(stats.damage, stats.range, stats.attack_cooldown, stats.projectile_speed),
        incoming_light: Fixed64::ZERO,
        production: (kind == BuildingKind::Foundry).then(|| ProductionQueue::new(tuning.max_queue)),
        shield: (kind == BuildingKind::ShieldTower).then_some(ShieldState {
            charge: 0.0,
            capacity: tuning.shield_capacity,
            radius: tuning.shield_radius,
            recharge: tuning.shield_recharge,
        }),
        lance: (kind == BuildingKind::LanceTower).then_some(LanceState::Ready),
        outbox: Outbox::default(),
    }
}

// ---------------------------------------------------------------------------
// Cores
// ---------------------------------------------------------------------------

pub fn new_core(owner: PlayerId, position: Vec2, tuning: &Tuning) -> CoreStructure {
    CoreStructure {
        owner,
        position,
        radius: tuning.core_radius,
        health: tuning.core_health,
        max_health: tuning.core_health,
        speed: tuning.core_speed,
        move_target: None,
        production: ProductionQueue::new(tuning.max_queue),
        incoming_light: Fixed64::ZERO,
    }
}

/// Move the core toward its move target and advance production. Production
/// only progresses while the core receives mirror light.
pub fn update_core(core: &mut CoreStructure, tuning: &Tuning, dt: f32) -> Option<ProductionItem> {
    if let Some(target) = core.move_target {
        core.position = core.position.move_toward(target, core.speed * dt);
        if core.position == target {
            core.move_target = None;
        }
    }
    let powered = core.incoming_light > Fixed64::ZERO;
    core.production
        .advance(f32_to_fixed64(dt), powered, |item| item_build_time(tuning, item))
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// Inputs a building needs from the rest of the world.
pub struct BuildingContext<'a> {
    pub tuning: &'a Tuning,
    pub dt: f32,
    pub team: u8,
    /// Whether the building sits inside its owner's construction influence.
    pub in_influence: bool,
    /// Enemy and friendly targets captured at the start of the player turn.
    pub targets: &'a [TargetInfo],
    pub occluders: &'a [Occluder],
}

/// What happened to a building this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BuildingOutcome {
    /// Construction finished this tick.
    pub completed: bool,
    pub produced: Option<ProductionItem>,
}

/// Advance construction. Inside influence the build draws energy from the
/// owner's pool in proportion to progress, partially when the pool runs
/// short; outside it progresses from mirror light alone.
pub fn advance_construction(building: &mut Building, pool: &mut Fixed64, ctx: &BuildingContext<'_>) -> bool {
    let dt = f32_to_fixed64(ctx.dt);
    let c = &mut building.construction;
    let delta = if ctx.in_influence {
        let paid = c.energy_demand(dt).min(*pool).max(Fixed64::ZERO);
        *pool -= paid;
        c.delta_for_energy(paid, dt)
    } else {
        c.delta_for_light(building.incoming_light, f32_to_fixed64(ctx.tuning.build_light_baseline))
    };
    c.advance(delta)
}

/// Nearest live enemy unit in attack range; ties go to the earlier entry.
pub fn nearest_enemy_unit<'t>(attacker: &Building, team: u8, targets: &'t [TargetInfo]) -> Option<&'t TargetInfo> {
    let mut best: Option<(&TargetInfo, f32)> = None;
    for t in targets {
        if t.team == team || !matches!(t.target, TargetRef::Unit(_)) || !attacker.in_range(t) {
            continue;
        }
        let d = t.position.distance_sq(attacker.position);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((t, d));
        }
    }
    best.map(|(t, _)| t)
}

fn beam_toward(
    origin: Vec2,
    aim: Vec2,
    length: f32,
    occluders: &[Occluder],
) -> Vec2 {
    let dir = (aim - origin).normalize_or(Vec2::X);
    let reach = first_obstruction(&Ray::new(origin, dir), length, occluders);
    origin + dir * reach
}

/// Step the lance tower state machine. Fires a beam when the lock-on
/// timer runs out.
fn update_lance(building: &mut Building, ctx: &BuildingContext<'_>) {
    let Some(state) = building.lance else {
        return;
    };
    let t = ctx.tuning;
    let next = match state {
        LanceState::Ready => LanceState::Ready,
        LanceState::LockingOn { aim, remaining } => {
            let remaining = remaining - ctx.dt;
            if remaining > 0.0 {
                LanceState::LockingOn { aim, remaining }
            } else {
                let end = beam_toward(building.position, aim, t.lance_beam_length, ctx.occluders);
                building.outbox.push(Effect::Beam(BeamEffect {
                    owner: building.owner,
                    team: ctx.team,
                    start: building.position,
                    end,
                    damage: t.lance_beam_damage,
                    width: t.lance_beam_width,
                    hits_structures: true,
                    ttl: t.beam_duration,
                    resolved: false,
                }));
                LanceState::Reloading {
                    remaining: t.lance_reload_time,
                }
            }
        }
        LanceState::Reloading { remaining } => {
            let remaining = remaining - ctx.dt;
            if remaining > 0.0 {
                LanceState::Reloading { remaining }
            } else {
                LanceState::Ready
            }
        }
    };
    building.lance = Some(next);
}

/// Update one building. `pool` is the owner's energy pool.
pub fn update_building(building: &mut Building, pool: &mut Fixed64, ctx: &BuildingContext<'_>) -> BuildingOutcome {
    let mut outcome = BuildingOutcome::default();
    if building.health <= 0.0 {
        return outcome;
    }
    if !building.is_complete() {
        outcome.completed = advance_construction(building, pool, ctx);
        return outcome;
    }

    let t = ctx.tuning;
    match building.kind {
        BuildingKind::Cannon => {
            building.cool_down(ctx.dt);
            if let Some(target) = nearest_enemy_unit(building, ctx.team, ctx.targets).copied() {
                building.try_fire(
                    &target,
                    ProjectileTemplate {
                        team: ctx.team,
                        radius: t.projectile_radius,
                        lifetime: t.projectile_lifetime,
                        splash_radius: t.cannon_splash_radius,
                    },
                );
            }
        }
        BuildingKind::Foundry => {
            let powered = building.incoming_light > Fixed64::ZERO;
            if let Some(queue) = building.production.as_mut() {
                outcome.produced = queue.advance(f32_to_fixed64(ctx.dt), powered, |item| {
                    item_build_time(t, item)
                });
            }
        }
        BuildingKind::ShieldTower => {
            if let Some(shield) = building.shield.as_mut() {
                shield.charge = (shield.charge + shield.recharge * ctx.dt).min(shield.capacity);
            }
        }
        BuildingKind::LanceTower => update_lance(building, ctx),
        BuildingKind::WarpGate => {}
    }
    outcome
}
