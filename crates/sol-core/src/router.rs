//! Lockstep command router.
//!
//! [`apply_commands`] sorts a batch into the agreed order and dispatches
//! each command to a per-kind handler. Handlers are pure functions of
//! state and payload: they read no clock, draw no random numbers and only
//! touch entities owned by the issuing player. A rejected command is
//! logged and dropped; nothing here can fail the tick.

use crate::command::{Command, CommandKind, Formation};
use crate::config::{CommandOrdering, Tuning};
use crate::energy::is_linkable;
use crate::entity::*;
use crate::event::{EventLog, SimEvent};
use crate::fixed::{Fixed64, Ticks, f32_to_fixed64};
use crate::id::*;
use crate::math::Vec2;
use crate::player::Player;
use crate::production::{ProductionError, ProductionItem};
use crate::structures::{building_stats, item_cost, new_building, produces};
use crate::world::World;

/// Golden angle in radians, used to lay out spread formations.
const GOLDEN_ANGLE: f32 = 2.399_963;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a command was dropped. Never escapes the router.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command kind (tag {0})")]
    UnknownKind(u16),

    #[error("no such player {0}")]
    NoSuchPlayer(PlayerId),

    #[error("player {0} is defeated")]
    Defeated(PlayerId),

    #[error("no live {0} owned by the issuer")]
    NotOwned(&'static str),

    #[error("insufficient energy: need {needed}, have {available}")]
    InsufficientEnergy { needed: Fixed64, available: Fixed64 },

    #[error(transparent)]
    Production(#[from] ProductionError),

    #[error("invalid placement at {0:?}")]
    InvalidPlacement(Vec2),

    #[error("{0:?} cannot be purchased")]
    NotPurchasable(BuildingKind),

    #[error("building cannot produce {0:?}")]
    CannotProduce(ProductionItem),

    #[error("upgrade {0:?} already owned or queued")]
    AlreadyResearched(crate::player::UpgradeKind),

    #[error("invalid target")]
    InvalidTarget,

    #[error("non-finite coordinates")]
    NonFinite,

    #[error("ability is not ready")]
    AbilityNotReady,

    #[error("need {needed} workers, got {got}")]
    NotEnoughWorkers { needed: usize, got: usize },

    #[error("tower is not ready to charge")]
    TowerNotReady,
}

// ---------------------------------------------------------------------------
// Batch application
// ---------------------------------------------------------------------------

/// Mutable view of the state handlers may touch.
pub struct RouterContext<'a> {
    pub world: &'a mut World,
    pub players: &'a mut [Player],
    pub tuning: &'a Tuning,
    pub tick: Ticks,
    pub events: &'a mut EventLog,
}

/// Outcome counts of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub rejected: usize,
}

/// Put a batch into execution order. Both sorts are stable.
pub fn sort_batch(batch: &mut [Command], ordering: CommandOrdering) {
    match ordering {
        CommandOrdering::PlayerSequence => batch.sort_by_key(|c| (c.tick, c.player, c.sequence)),
        CommandOrdering::Arrival => batch.sort_by_key(|c| c.tick),
    }
}

/// Sort and apply a batch. Rejected commands are logged at `warn` and
/// leave no trace in the state.
pub fn apply_commands(ctx: &mut RouterContext<'_>, batch: &mut [Command], ordering: CommandOrdering) -> ApplyReport {
    sort_batch(batch, ordering);
    let mut report = ApplyReport::default();
    for command in batch.iter() {
        if command.tick < ctx.tick {
            tracing::warn!(
                player = %command.player,
                scheduled = command.tick,
                tick = ctx.tick,
                "late command applied"
            );
        }
        match apply_command(ctx, command) {
            Ok(()) => {
                tracing::trace!(player = %command.player, kind = command.kind.name(), "command applied");
                report.applied += 1;
            }
            Err(error) => {
                tracing::warn!(
                    player = %command.player,
                    kind = command.kind.name(),
                    tick = ctx.tick,
                    %error,
                    "command dropped"
                );
                report.rejected += 1;
            }
        }
    }
    report
}

/// Validate and apply a single command.
pub fn apply_command(ctx: &mut RouterContext<'_>, command: &Command) -> Result<(), CommandError> {
    if let CommandKind::Unknown { tag } = command.kind {
        return Err(CommandError::UnknownKind(tag));
    }
    let player = command.player;
    let index = player.index();
    let p = ctx.players.get(index).ok_or(CommandError::NoSuchPlayer(player))?;
    if p.is_defeated(&ctx.world.cores) {
        return Err(CommandError::Defeated(player));
    }

    match &command.kind {
        CommandKind::MoveUnits {
            units,
            target,
            formation,
        } => move_units(ctx.world, player, units, *target, *formation, ctx.tuning),
        CommandKind::TargetStructure { units, target } => target_structure(ctx.world, player, units, *target),
        CommandKind::FollowPath { units, waypoints } => follow_path(ctx.world, player, units, waypoints),
        CommandKind::UseAbility { unit, direction } => use_ability(ctx.world, player, *unit, *direction),
        CommandKind::PurchaseHero { hero } => purchase_at_core(ctx, player, ProductionItem::Hero(*hero)),
        CommandKind::PurchaseWorker => purchase_at_core(ctx, player, ProductionItem::Worker),
        CommandKind::PurchaseMirror => purchase_at_core(ctx, player, ProductionItem::Mirror),
        CommandKind::PurchaseBuilding { kind, position } => purchase_building(ctx, player, *kind, *position),
        CommandKind::QueueProduction { building, item } => queue_production(ctx, player, *building, *item),
        CommandKind::MoveMirrors { mirrors, target } => move_mirrors(ctx.world, player, mirrors, *target),
        CommandKind::LinkMirror { mirror, link } => link_mirror(ctx.world, player, *mirror, *link),
        CommandKind::MergeWorkers { units, position } => merge_workers(ctx.world, player, units, *position, ctx.tuning),
        CommandKind::ChargeTower { building, aim } => charge_tower(ctx.world, player, *building, *aim, ctx.tuning),
        CommandKind::MoveCore { target } => move_core(ctx.world, ctx.players, player, *target),
        CommandKind::SetPatrolPath { waypoints } => set_patrol_path(ctx.players, player, waypoints),
        CommandKind::Unknown { tag } => Err(CommandError::UnknownKind(*tag)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn finite(point: Vec2) -> Result<Vec2, CommandError> {
    if point.is_finite() {
        Ok(point)
    } else {
        Err(CommandError::NonFinite)
    }
}

fn clamp_to_field(world: &World, point: Vec2) -> Vec2 {
    let h = world.half_extents;
    if h == Vec2::ZERO {
        return point;
    }
    Vec2::new(point.x.clamp(-h.x, h.x), point.y.clamp(-h.y, h.y))
}

/// Live units from `ids` owned by `player`, in payload order, without
/// duplicates. Foreign and unknown ids are skipped.
fn owned_units(world: &World, player: PlayerId, ids: &[UnitId]) -> Result<Vec<UnitId>, CommandError> {
    let mut out: Vec<UnitId> = Vec::with_capacity(ids.len());
    for &id in ids {
        let owned = world
            .units
            .get(id)
            .is_some_and(|u| u.owner == player && u.health > 0.0);
        if owned && !out.contains(&id) {
            out.push(id);
        }
    }
    if out.is_empty() {
        Err(CommandError::NotOwned("unit"))
    } else {
        Ok(out)
    }
}

/// Slot `i` of a spread formation: a golden-angle spiral around `center`.
pub fn formation_slot(center: Vec2, index: usize, spacing: f32) -> Vec2 {
    if index == 0 {
        return center;
    }
    let i = index as f32;
    center + Vec2::from_angle(i * GOLDEN_ANGLE) * (spacing * i.sqrt())
}

fn charge(player: &mut Player, cost: Fixed64) -> Result<(), CommandError> {
    if player.try_spend(cost) {
        Ok(())
    } else {
        Err(CommandError::InsufficientEnergy {
            needed: cost,
            available: player.energy,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit orders
// ---------------------------------------------------------------------------

fn move_units(
    world: &mut World,
    player: PlayerId,
    ids: &[UnitId],
    target: Vec2,
    formation: Formation,
    tuning: &Tuning,
) -> Result<(), CommandError> {
    let target = clamp_to_field(world, finite(target)?);
    let units = owned_units(world, player, ids)?;
    for (i, id) in units.into_iter().enumerate() {
        let point = match formation {
            Formation::Direct => target,
            Formation::Spread => clamp_to_field(world, formation_slot(target, i, tuning.formation_spacing)),
        };
        if let Some(u) = world.units.get_mut(id) {
            u.order = UnitOrder::Rally(point);
        }
    }
    Ok(())
}

fn target_structure(world: &mut World, player: PlayerId, ids: &[UnitId], target: TargetRef) -> Result<(), CommandError> {
    let info = world
        .target_info(target)
        .filter(|t| world.is_enemy(player, t.owner))
        .ok_or(CommandError::InvalidTarget)?;
    let units = owned_units(world, player, ids)?;
    for id in units {
        if let Some(u) = world.units.get_mut(id) {
            u.order = UnitOrder::Attack {
                target,
                approach: info.position,
            };
        }
    }
    Ok(())
}

fn follow_path(world: &mut World, player: PlayerId, ids: &[UnitId], waypoints: &[Vec2]) -> Result<(), CommandError> {
    if waypoints.is_empty() {
        return Err(CommandError::InvalidTarget);
    }
    let mut path = Vec::with_capacity(waypoints.len());
    for &w in waypoints {
        path.push(clamp_to_field(world, finite(w)?));
    }
    let units = owned_units(world, player, ids)?;
    for id in units {
        if let Some(u) = world.units.get_mut(id) {
            u.order = UnitOrder::Path {
                waypoints: path.clone(),
                next: 0,
            };
        }
    }
    Ok(())
}

fn use_ability(world: &mut World, player: PlayerId, unit: UnitId, direction: Vec2) -> Result<(), CommandError> {
    let direction = finite(direction)?;
    let u = world
        .units
        .get_mut(unit)
        .filter(|u| u.owner == player && u.health > 0.0)
        .ok_or(CommandError::NotOwned("unit"))?;
    if u.queue_ability(direction) {
        Ok(())
    } else {
        Err(CommandError::AbilityNotReady)
    }
}

fn merge_workers(
    world: &mut World,
    player: PlayerId,
    ids: &[UnitId],
    position: Vec2,
    tuning: &Tuning,
) -> Result<(), CommandError> {
    let position = clamp_to_field(world, finite(position)?);
    let workers: Vec<UnitId> = owned_units(world, player, ids)
        .unwrap_or_default()
        .into_iter()
        .filter(|id| world.units.get(*id).is_some_and(|u| u.kind == UnitKind::Worker))
        .collect();
    if workers.len() < tuning.fusion_worker_count {
        return Err(CommandError::NotEnoughWorkers {
            needed: tuning.fusion_worker_count,
            got: workers.len(),
        });
    }
    let ritual = world.rituals.insert(FusionRitual {
        owner: player,
        position,
        participants: workers.clone(),
    });
    for id in workers {
        if let Some(u) = world.units.get_mut(id) {
            u.order = UnitOrder::Fuse(ritual);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Purchases and production
// ---------------------------------------------------------------------------

/// Queue an item at the issuer's core, paying up front.
fn purchase_at_core(ctx: &mut RouterContext<'_>, player: PlayerId, item: ProductionItem) -> Result<(), CommandError> {
    let core_id = ctx.players[player.index()].core.ok_or(CommandError::NotOwned("core"))?;
    let core = ctx
        .world
        .cores
        .get_mut(core_id)
        .filter(|c| c.owner == player && c.health > 0.0)
        .ok_or(CommandError::NotOwned("core"))?;
    if !core.production.can_enqueue() {
        return Err(ProductionError::QueueFull {
            max: ctx.tuning.max_queue,
        }
        .into());
    }
    charge(&mut ctx.players[player.index()], item_cost(ctx.tuning, item))?;
    core.production.enqueue(item)?;
    Ok(())
}

/// Place an incomplete building. The cost is checked here and drawn by
/// construction while the site is inside influence.
fn purchase_building(
    ctx: &mut RouterContext<'_>,
    player: PlayerId,
    kind: BuildingKind,
    position: Vec2,
) -> Result<(), CommandError> {
    if kind == BuildingKind::WarpGate {
        return Err(CommandError::NotPurchasable(kind));
    }
    let position = finite(position)?;
    let stats = building_stats(ctx.tuning, kind);
    let cost = f32_to_fixed64(stats.cost);
    let available = ctx.players[player.index()].energy;
    if available < cost {
        return Err(CommandError::InsufficientEnergy {
            needed: cost,
            available,
        });
    }
    if !ctx.world.is_clear_for(position, stats.radius) {
        return Err(CommandError::InvalidPlacement(position));
    }
    let building = ctx
        .world
        .buildings
        .insert(new_building(kind, player, position, ctx.tuning));
    ctx.events.push(SimEvent::BuildingPlaced {
        building,
        owner: player,
        kind,
        tick: ctx.tick,
    });
    Ok(())
}

fn queue_production(
    ctx: &mut RouterContext<'_>,
    player: PlayerId,
    building: BuildingId,
    item: ProductionItem,
) -> Result<(), CommandError> {
    let b = ctx
        .world
        .buildings
        .get(building)
        .filter(|b| b.owner == player && b.health > 0.0 && b.is_complete())
        .ok_or(CommandError::NotOwned("completed building"))?;
    if !produces(b.kind, item) {
        return Err(CommandError::CannotProduce(item));
    }
    if let ProductionItem::Upgrade(upgrade) = item {
        let queued = ctx.world.buildings.values().any(|b| {
            b.owner == player && b.production.as_ref().is_some_and(|q| q.contains(item))
        });
        if queued || ctx.players[player.index()].upgrades.has(upgrade) {
            return Err(CommandError::AlreadyResearched(upgrade));
        }
    }
    let queue_open = b.production.as_ref().is_some_and(|q| q.can_enqueue());
    if !queue_open {
        return Err(ProductionError::QueueFull {
            max: ctx.tuning.max_queue,
        }
        .into());
    }
    charge(&mut ctx.players[player.index()], item_cost(ctx.tuning, item))?;
    if let Some(queue) = ctx
        .world
        .buildings
        .get_mut(building)
        .and_then(|b| b.production.as_mut())
    {
        queue.enqueue(item)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Mirrors, towers and the core
// ---------------------------------------------------------------------------

fn move_mirrors(world: &mut World, player: PlayerId, ids: &[MirrorId], target: Vec2) -> Result<(), CommandError> {
    let target = clamp_to_field(world, finite(target)?);
    let mut moved = 0;
    for &id in ids {
        if let Some(m) = world
            .mirrors
            .get_mut(id)
            .filter(|m| m.owner == player && m.health > 0.0)
        {
            m.move_target = Some(target);
            moved += 1;
        }
    }
    if moved == 0 {
        return Err(CommandError::NotOwned("mirror"));
    }
    Ok(())
}

fn link_mirror(world: &mut World, player: PlayerId, mirror: MirrorId, link: MirrorLink) -> Result<(), CommandError> {
    let valid = match link {
        MirrorLink::None => true,
        MirrorLink::Core(id) => world
            .cores
            .get(id)
            .is_some_and(|c| c.owner == player && c.health > 0.0),
        MirrorLink::Building(id) => world
            .buildings
            .get(id)
            .is_some_and(|b| b.owner == player && is_linkable(b)),
    };
    if !valid {
        return Err(CommandError::InvalidTarget);
    }
    let m = world
        .mirrors
        .get_mut(mirror)
        .filter(|m| m.owner == player && m.health > 0.0)
        .ok_or(CommandError::NotOwned("mirror"))?;
    m.link = link;
    Ok(())
}

fn charge_tower(
    world: &mut World,
    player: PlayerId,
    building: BuildingId,
    aim: Vec2,
    tuning: &Tuning,
) -> Result<(), CommandError> {
    let aim = finite(aim)?;
    let b = world
        .buildings
        .get_mut(building)
        .filter(|b| b.owner == player && b.health > 0.0 && b.is_complete())
        .ok_or(CommandError::NotOwned("completed building"))?;
    match b.lance {
        Some(LanceState::Ready) => {
            b.lance = Some(LanceState::LockingOn {
                aim,
                remaining: tuning.lance_lock_time,
            });
            Ok(())
        }
        _ => Err(CommandError::TowerNotReady),
    }
}

fn move_core(world: &mut World, players: &[Player], player: PlayerId, target: Vec2) -> Result<(), CommandError> {
    let target = clamp_to_field(world, finite(target)?);
    let core_id = players[player.index()].core.ok_or(CommandError::NotOwned("core"))?;
    let core = world
        .cores
        .get_mut(core_id)
        .filter(|c| c.owner == player && c.health > 0.0)
        .ok_or(CommandError::NotOwned("core"))?;
    core.move_target = Some(target);
    Ok(())
}

fn set_patrol_path(players: &mut [Player], player: PlayerId, waypoints: &[Vec2]) -> Result<(), CommandError> {
    if waypoints.iter().any(|w| !w.is_finite()) {
        return Err(CommandError::NonFinite);
    }
    players[player.index()].patrol_path = waypoints.to_vec();
    Ok(())
}
