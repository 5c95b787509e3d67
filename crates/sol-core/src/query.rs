//! Read-only query API for rendering and UI.
//!
//! Snapshots are owned copies with no references into engine storage.
//! Rendering reads them and never writes back.

use crate::config::Faction;
use crate::engine::Engine;
use crate::entity::{BuildingKind, MirrorLink, UnitKind, UnitOrder};
use crate::fixed::Fixed64;
use crate::id::{BuildingId, CoreId, MirrorId, PlayerId, UnitId};
use crate::math::Vec2;
use crate::player::Upgrades;
use crate::production::{ProductionItem, ProductionState};

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub faction: Faction,
    pub team: u8,
    pub energy: Fixed64,
    pub upgrades: Upgrades,
    pub is_ai: bool,
    pub defeated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub owner: PlayerId,
    pub kind: UnitKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub health: f32,
    pub max_health: f32,
    pub radius: f32,
    /// Fraction of the hero ability cooldown still to run, 0 when ready.
    pub ability_cooldown: f32,
    /// Where the unit is heading, if anywhere.
    pub destination: Option<Vec2>,
}

/// Production progress for a queue-owning structure.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub state: ProductionState,
    pub current: Option<ProductionItem>,
    /// 0..1 progress of the current item.
    pub progress: Fixed64,
    pub queued: Vec<ProductionItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingSnapshot {
    pub id: BuildingId,
    pub owner: PlayerId,
    pub kind: BuildingKind,
    pub position: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    /// 0..1 construction progress.
    pub build_progress: Fixed64,
    pub complete: bool,
    pub incoming_light: Fixed64,
    pub production: Option<QueueSnapshot>,
    pub shield_charge: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorSnapshot {
    pub id: MirrorId,
    pub owner: PlayerId,
    pub position: Vec2,
    pub health: f32,
    pub link: MirrorLink,
    pub reflection_angle: f32,
    /// Energy sent on the last tick.
    pub last_output: Fixed64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreSnapshot {
    pub id: CoreId,
    pub owner: PlayerId,
    pub position: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub incoming_light: Fixed64,
    pub production: QueueSnapshot,
}

fn queue_snapshot(q: &crate::production::ProductionQueue) -> QueueSnapshot {
    QueueSnapshot {
        state: q.state(),
        current: q.current(),
        progress: q.progress(),
        queued: q.queued().collect(),
    }
}

// ---------------------------------------------------------------------------
// Engine queries
// ---------------------------------------------------------------------------

impl Engine {
    pub fn snapshot_players(&self) -> Vec<PlayerSnapshot> {
        self.players
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id,
                name: p.name.clone(),
                faction: p.faction,
                team: p.team,
                energy: p.energy,
                upgrades: p.upgrades,
                is_ai: p.ai.is_some(),
                defeated: p.is_defeated(&self.world.cores),
            })
            .collect()
    }

    pub fn snapshot_unit(&self, id: UnitId) -> Option<UnitSnapshot> {
        let u = self.world.units.get(id)?;
        let ability_cooldown = if u.is_hero() && self.tuning().ability_cooldown > 0.0 {
            u.ability_cooldown / self.tuning().ability_cooldown
        } else {
            0.0
        };
        let destination = match &u.order {
            UnitOrder::Idle => None,
            UnitOrder::Rally(p) => Some(*p),
            UnitOrder::Attack { approach, .. } => Some(*approach),
            UnitOrder::Path { waypoints, next } => waypoints.get(*next).copied(),
            UnitOrder::Fuse(r) => self.world.rituals.get(*r).map(|r| r.position),
        };
        Some(UnitSnapshot {
            id,
            owner: u.owner,
            kind: u.kind,
            position: u.position,
            velocity: u.velocity,
            health: u.health,
            max_health: u.max_health,
            radius: u.radius,
            ability_cooldown,
            destination,
        })
    }

    pub fn snapshot_units(&self) -> Vec<UnitSnapshot> {
        self.world
            .units
            .keys()
            .filter_map(|id| self.snapshot_unit(id))
            .collect()
    }

    pub fn snapshot_buildings(&self) -> Vec<BuildingSnapshot> {
        self.world
            .buildings
            .iter()
            .map(|(id, b)| BuildingSnapshot {
                id,
                owner: b.owner,
                kind: b.kind,
                position: b.position,
                radius: b.radius,
                health: b.health,
                max_health: b.max_health,
                build_progress: b.construction.progress(),
                complete: b.is_complete(),
                incoming_light: b.incoming_light,
                production: b.production.as_ref().map(queue_snapshot),
                shield_charge: b.shield.map(|s| s.charge),
            })
            .collect()
    }

    pub fn snapshot_mirrors(&self) -> Vec<MirrorSnapshot> {
        self.world
            .mirrors
            .iter()
            .map(|(id, m)| MirrorSnapshot {
                id,
                owner: m.owner,
                position: m.position,
                health: m.health,
                link: m.link,
                reflection_angle: m.reflection_angle,
                last_output: m.last_output,
            })
            .collect()
    }

    pub fn snapshot_cores(&self) -> Vec<CoreSnapshot> {
        self.world
            .cores
            .iter()
            .map(|(id, c)| CoreSnapshot {
                id,
                owner: c.owner,
                position: c.position,
                radius: c.radius,
                health: c.health,
                max_health: c.max_health,
                incoming_light: c.incoming_light,
                production: queue_snapshot(&c.production),
            })
            .collect()
    }

    pub fn unit_count(&self) -> usize {
        self.world.units.len()
    }

    pub fn building_count(&self) -> usize {
        self.world.buildings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn player_snapshots_carry_identity() {
        let engine = bare_engine();
        let players = engine.snapshot_players();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "alpha");
        assert_eq!(players[1].team, 1);
        assert!(!players[0].defeated);
        assert!(!players[0].is_ai);
    }

    #[test]
    fn unit_snapshot_reports_destination() {
        let mut engine = bare_engine();
        let id = spawn_unit(&mut engine, 0, UnitKind::Soldier, Vec2::new(0.0, 100.0));
        engine.world.units[id].order = UnitOrder::Rally(Vec2::new(50.0, 100.0));
        let snap = engine.snapshot_unit(id).unwrap();
        assert_eq!(snap.destination, Some(Vec2::new(50.0, 100.0)));
        assert_eq!(snap.ability_cooldown, 0.0);
        assert_eq!(engine.snapshot_units().len(), 1);
    }

    #[test]
    fn core_snapshot_shows_queue() {
        let mut engine = bare_engine();
        let core = engine.players[0].core.unwrap();
        engine.world.cores[core]
            .production
            .enqueue(ProductionItem::Worker)
            .unwrap();
        let cores = engine.snapshot_cores();
        let mine = cores.iter().find(|c| c.id == core).unwrap();
        assert_eq!(mine.production.queued.len() + usize::from(mine.production.current.is_some()), 1);
    }

    #[test]
    fn building_snapshot_progress() {
        let mut engine = bare_engine();
        spawn_building(&mut engine, 0, BuildingKind::Cannon, Vec2::new(-300.0, 0.0), false);
        let b = &engine.snapshot_buildings()[0];
        assert_eq!(b.build_progress, Fixed64::ZERO);
        assert!(!b.complete);
        assert_eq!(engine.building_count(), 1);
    }
}
