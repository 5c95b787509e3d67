//! AI decision layer.
//!
//! An AI player is planned on every peer from the same state and the same
//! generator stream, so it needs no network traffic. The planner only
//! emits [`CommandKind`]s, the vocabulary a human issues, and the engine
//! routes them through the same handlers.

use crate::command::{CommandKind, Formation};
use crate::config::Tuning;
use crate::entity::{BuildingKind, HeroKind, MirrorLink, TargetRef, UnitKind};
use crate::fixed::f32_to_fixed64;
use crate::id::{BuildingId, MirrorId, UnitId};
use crate::math::Vec2;
use crate::player::{Player, UpgradeKind};
use crate::production::ProductionItem;
use crate::rng::SimRng;
use crate::structures::{building_stats, item_cost};
use crate::visibility::nearest_sun;
use crate::world::World;

/// Candidate spots tried per placement before giving up for this round.
const PLACEMENT_ATTEMPTS: u32 = 6;

/// Overall play style, drawn once from the seeded generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiStrategy {
    /// Many mirrors, foundry first, late attacks.
    Economic,
    /// Few mirrors, early soldiers and heroes, frequent waves.
    Aggressive,
    /// Shields and cannons around the core, large waves.
    Defensive,
}

impl AiStrategy {
    fn mirror_target(self) -> usize {
        match self {
            AiStrategy::Economic => 6,
            AiStrategy::Aggressive => 3,
            AiStrategy::Defensive => 4,
        }
    }

    fn wave_size(self, base: usize) -> usize {
        match self {
            AiStrategy::Defensive => base * 2,
            _ => base,
        }
    }
}

/// Per-player AI policy state. Timestamps are simulated seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct AiState {
    pub strategy: AiStrategy,
    pub last_think: f64,
    pub last_build: f64,
    pub last_attack: f64,
    /// Buildings placed so far, used to cycle the build order.
    pub builds: u32,
}

impl AiState {
    pub fn new(rng: &mut SimRng) -> Self {
        let strategy = match rng.below(3) {
            0 => AiStrategy::Economic,
            1 => AiStrategy::Aggressive,
            _ => AiStrategy::Defensive,
        };
        Self::with_strategy(strategy)
    }

    pub fn with_strategy(strategy: AiStrategy) -> Self {
        Self {
            strategy,
            last_think: f64::NEG_INFINITY,
            last_build: 0.0,
            last_attack: 0.0,
            builds: 0,
        }
    }

    fn next_building(&self, world: &World, player: &Player) -> BuildingKind {
        let has_foundry = world
            .buildings
            .values()
            .any(|b| b.owner == player.id && b.kind == BuildingKind::Foundry && b.health > 0.0);
        if !has_foundry && self.strategy != AiStrategy::Defensive {
            return BuildingKind::Foundry;
        }
        match (self.strategy, self.builds % 3) {
            (AiStrategy::Defensive, 0) => BuildingKind::ShieldTower,
            (AiStrategy::Defensive, 1) => BuildingKind::Cannon,
            (AiStrategy::Defensive, _) if !has_foundry => BuildingKind::Foundry,
            (AiStrategy::Defensive, _) => BuildingKind::LanceTower,
            (AiStrategy::Aggressive, 2) => BuildingKind::Foundry,
            _ => BuildingKind::Cannon,
        }
    }
}

/// Everything the planner reads.
pub struct AiView<'a> {
    pub player: &'a Player,
    pub world: &'a World,
    pub tuning: &'a Tuning,
    pub now: f64,
}

/// Plan this tick's commands for one AI player. Returns nothing between
/// think intervals or once the player has lost its core.
pub fn plan_commands(ai: &mut AiState, view: &AiView<'_>, rng: &mut SimRng) -> Vec<CommandKind> {
    let t = view.tuning;
    if view.now - ai.last_think < f64::from(t.ai_think_interval) {
        return Vec::new();
    }
    ai.last_think = view.now;

    let Some(core_id) = view.player.core else {
        return Vec::new();
    };
    let Some(core) = view.world.cores.get(core_id).filter(|c| c.health > 0.0) else {
        return Vec::new();
    };
    let core_pos = core.position;

    let mut out = Vec::new();
    plan_mirrors(view, core_id, core_pos, rng, &mut out);
    plan_core_queue(ai, view, rng, &mut out);
    plan_buildings(ai, view, core_pos, rng, &mut out);
    plan_foundries(view, &mut out);
    let attacked = plan_attack(ai, view, core_pos, &mut out);
    if !attacked && ai.strategy == AiStrategy::Defensive {
        let rally = core_pos + (-core_pos).normalize_or(Vec2::X) * (t.influence_radius * 0.5);
        out.extend(regroup(view, rally));
    }
    plan_abilities(view, &mut out);
    out
}

fn affordable(view: &AiView<'_>, cost: f32) -> bool {
    view.player.energy >= f32_to_fixed64(cost)
}

/// Link stray mirrors, spread them sunward and feed an idle foundry.
fn plan_mirrors(
    view: &AiView<'_>,
    core_id: crate::id::CoreId,
    core_pos: Vec2,
    rng: &mut SimRng,
    out: &mut Vec<CommandKind>,
) {
    let world = view.world;
    let own: Vec<(MirrorId, MirrorLink)> = world
        .mirrors
        .iter()
        .filter(|(_, m)| m.owner == view.player.id && m.health > 0.0)
        .map(|(id, m)| (id, m.link))
        .collect();

    let sun_dir = nearest_sun(core_pos, &world.suns)
        .map(|s| (s.position - core_pos).normalize_or(Vec2::X))
        .unwrap_or(Vec2::X);

    for &(id, link) in &own {
        if link != MirrorLink::None {
            continue;
        }
        let spread = rng.range_f32(-0.6, 0.6);
        let dist = rng.range_f32(60.0, 180.0);
        out.push(CommandKind::MoveMirrors {
            mirrors: vec![id],
            target: core_pos + sun_dir.rotate(spread) * dist,
        });
        out.push(CommandKind::LinkMirror {
            mirror: id,
            link: MirrorLink::Core(core_id),
        });
    }

    let core_linked: Vec<MirrorId> = own
        .iter()
        .filter(|(_, l)| matches!(l, MirrorLink::Core(_)))
        .map(|(id, _)| *id)
        .collect();
    if core_linked.len() < 3 {
        return;
    }
    let unlit_foundry = world.buildings.iter().find(|(id, b)| {
        b.owner == view.player.id
            && b.kind == BuildingKind::Foundry
            && b.is_complete()
            && b.health > 0.0
            && !own.iter().any(|(_, l)| *l == MirrorLink::Building(*id))
    });
    if let Some((foundry, _)) = unlit_foundry {
        if let Some(&mirror) = core_linked.last() {
            out.push(CommandKind::LinkMirror {
                mirror,
                link: MirrorLink::Building(foundry),
            });
        }
    }
}

/// Mirrors, workers and heroes from the core.
fn plan_core_queue(ai: &AiState, view: &AiView<'_>, rng: &mut SimRng, out: &mut Vec<CommandKind>) {
    let world = view.world;
    let player = view.player;
    let t = view.tuning;
    let Some(queue) = player
        .core
        .and_then(|id| world.cores.get(id))
        .map(|c| &c.production)
    else {
        return;
    };
    if !queue.can_enqueue() {
        return;
    }

    let mirrors = world.mirrors.values().filter(|m| m.owner == player.id).count();
    if mirrors < ai.strategy.mirror_target()
        && !queue.contains(ProductionItem::Mirror)
        && affordable(view, t.mirror_cost)
    {
        out.push(CommandKind::PurchaseMirror);
        return;
    }

    let workers = world
        .units
        .values()
        .filter(|u| u.owner == player.id && u.kind == UnitKind::Worker)
        .count();
    if workers < 2 && !queue.contains(ProductionItem::Worker) && affordable(view, t.worker.cost) {
        out.push(CommandKind::PurchaseWorker);
        return;
    }

    let has_hero = world
        .units
        .values()
        .any(|u| u.owner == player.id && u.is_hero());
    let hero_queued = queue.current().is_some_and(|i| matches!(i, ProductionItem::Hero(_)))
        || queue.queued().any(|i| matches!(i, ProductionItem::Hero(_)));
    if ai.strategy != AiStrategy::Economic && !has_hero && !hero_queued && affordable(view, t.hero.cost) {
        let hero = match rng.below(3) {
            0 => HeroKind::Lancer,
            1 => HeroKind::Scatter,
            _ => HeroKind::Seer,
        };
        out.push(CommandKind::PurchaseHero { hero });
    }
}

/// Place the next building of the build order on a free spot inside
/// influence.
fn plan_buildings(ai: &mut AiState, view: &AiView<'_>, core_pos: Vec2, rng: &mut SimRng, out: &mut Vec<CommandKind>) {
    let t = view.tuning;
    if view.now - ai.last_build < f64::from(t.ai_build_interval) {
        return;
    }
    let kind = ai.next_building(view.world, view.player);
    let stats = building_stats(t, kind);
    if !affordable(view, stats.cost) {
        return;
    }
    ai.last_build = view.now;

    let min_dist = t.core_radius + stats.radius + 40.0;
    let max_dist = (t.influence_radius * 0.8).max(min_dist);
    for _ in 0..PLACEMENT_ATTEMPTS {
        let position = core_pos + Vec2::from_angle(rng.angle()) * rng.range_f32(min_dist, max_dist);
        if view.world.is_clear_for(position, stats.radius) {
            ai.builds += 1;
            out.push(CommandKind::PurchaseBuilding { kind, position });
            return;
        }
    }
}

/// Keep every lit foundry busy.
fn plan_foundries(view: &AiView<'_>, out: &mut Vec<CommandKind>) {
    let t = view.tuning;
    let player = view.player;
    let mut budget = player.energy;
    let foundries: Vec<(BuildingId, bool)> = view
        .world
        .buildings
        .iter()
        .filter(|(_, b)| b.owner == player.id && b.kind == BuildingKind::Foundry && b.is_complete())
        .filter_map(|(id, b)| b.production.as_ref().map(|q| (id, q.is_empty())))
        .collect();

    for (building, idle) in foundries {
        if !idle {
            continue;
        }
        let upgrade = [UpgradeKind::FocusedMirrors, UpgradeKind::HardenedHulls]
            .into_iter()
            .find(|u| !player.upgrades.has(*u));
        let item = match upgrade {
            Some(u) if budget >= item_cost(t, ProductionItem::Upgrade(u)) * 2 => ProductionItem::Upgrade(u),
            _ => ProductionItem::Soldier,
        };
        let cost = item_cost(t, item);
        if budget < cost {
            return;
        }
        budget -= cost;
        out.push(CommandKind::QueueProduction { building, item });
    }
}

/// Send a wave of idle fighters at the nearest enemy core. Returns whether
/// a wave went out.
fn plan_attack(ai: &mut AiState, view: &AiView<'_>, core_pos: Vec2, out: &mut Vec<CommandKind>) -> bool {
    let t = view.tuning;
    if view.now - ai.last_attack < f64::from(t.ai_attack_interval) {
        return false;
    }
    let world = view.world;
    let fighters: Vec<UnitId> = world
        .idle_units(view.player.id)
        .filter(|(_, u)| u.kind != UnitKind::Worker)
        .map(|(id, _)| id)
        .collect();
    if fighters.len() < ai.strategy.wave_size(t.ai_attack_wave) {
        return false;
    }

    let mut best: Option<(crate::id::CoreId, f32)> = None;
    for (id, c) in world.cores.iter() {
        if c.health <= 0.0 || !world.is_enemy(view.player.id, c.owner) {
            continue;
        }
        let d = c.position.distance_sq(core_pos);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((id, d));
        }
    }
    let Some((target, _)) = best else {
        return false;
    };
    ai.last_attack = view.now;
    tracing::debug!(player = %view.player.id, units = fighters.len(), "ai attack wave");
    out.push(CommandKind::TargetStructure {
        units: fighters,
        target: TargetRef::Core(target),
    });
    true
}

/// Aim ready hero abilities at the nearest visible enemy unit.
fn plan_abilities(view: &AiView<'_>, out: &mut Vec<CommandKind>) {
    let world = view.world;
    for (id, hero) in world.units.iter() {
        if hero.owner != view.player.id || !hero.is_hero() || hero.ability_cooldown > 0.0 || hero.health <= 0.0 {
            continue;
        }
        let reach = hero.vision_radius * hero.vision_radius;
        let mut best: Option<(Vec2, f32)> = None;
        for u in world.units.values() {
            if u.health <= 0.0 || !world.is_enemy(hero.owner, u.owner) {
                continue;
            }
            let d = u.position.distance_sq(hero.position);
            if d <= reach && best.is_none_or(|(_, bd)| d < bd) {
                best = Some((u.position, d));
            }
        }
        if let Some((target, _)) = best {
            out.push(CommandKind::UseAbility {
                unit: id,
                direction: target - hero.position,
            });
        }
    }
}

/// Bring idle fighters that wandered out of influence back to `rally`.
/// Used by defensive players between waves.
pub fn regroup(view: &AiView<'_>, rally: Vec2) -> Option<CommandKind> {
    let r = view.tuning.influence_radius;
    let strays: Vec<UnitId> = view
        .world
        .idle_units(view.player.id)
        .filter(|(_, u)| u.kind != UnitKind::Worker && u.position.distance_sq(rally) > r * r)
        .map(|(id, _)| id)
        .collect();
    (!strays.is_empty()).then(|| CommandKind::MoveUnits {
        units: strays,
        target: rally,
        formation: Formation::Spread,
    })
}
