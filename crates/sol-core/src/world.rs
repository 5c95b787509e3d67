//! Entity arenas shared by the orchestrator, the router and the AI layer.
//!
//! Every collection is a slotmap or a `Vec`. A `Vec` iterates in insertion
//! order. A slotmap iterates in slot order, which follows insertion until a
//! freed slot is reused; reuse depends only on the sequence of inserts and
//! removals, so the order is still identical on every peer.

use crate::effects::{BeamEffect, DustParticle, Projectile, RevealCone};
use crate::entity::*;
use crate::id::*;
use crate::math::Vec2;
use crate::visibility::Occluder;
use slotmap::SlotMap;

#[derive(Debug, Clone, Default)]
pub struct World {
    pub units: SlotMap<UnitId, Unit>,
    pub buildings: SlotMap<BuildingId, Building>,
    pub mirrors: SlotMap<MirrorId, SolarMirror>,
    pub cores: SlotMap<CoreId, CoreStructure>,
    pub asteroids: SlotMap<AsteroidId, Asteroid>,
    pub rituals: SlotMap<RitualId, FusionRitual>,
    pub suns: Vec<Sun>,
    pub projectiles: Vec<Projectile>,
    pub beams: Vec<BeamEffect>,
    pub reveals: Vec<RevealCone>,
    pub dust: Vec<DustParticle>,
    /// Team of each player, indexed by `PlayerId`.
    pub teams: Vec<u8>,
    /// Asteroid polygons in world space, refreshed after rotation.
    pub occluders: Vec<Occluder>,
    pub half_extents: Vec2,
}

impl World {
    /// Team of `player`. Unknown players get a team no one else shares.
    pub fn team_of(&self, player: PlayerId) -> u8 {
        self.teams.get(player.index()).copied().unwrap_or(u8::MAX)
    }

    pub fn is_enemy(&self, a: PlayerId, b: PlayerId) -> bool {
        self.team_of(a) != self.team_of(b)
    }

    /// Recompute occluders from the current asteroid rotations.
    pub fn refresh_occluders(&mut self) {
        self.occluders = self.asteroids.values().map(Occluder::from_asteroid).collect();
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    /// Snapshot of a live target, or `None` when it is gone or dead.
    pub fn target_info(&self, target: TargetRef) -> Option<TargetInfo> {
        let (owner, position, radius, health) = match target {
            TargetRef::Unit(id) => {
                let u = self.units.get(id)?;
                (u.owner, u.position, u.radius, u.health)
            }
            TargetRef::Building(id) => {
                let b = self.buildings.get(id)?;
                (b.owner, b.position, b.radius, b.health)
            }
            TargetRef::Mirror(id) => {
                let m = self.mirrors.get(id)?;
                (m.owner, m.position, m.radius, m.health)
            }
            TargetRef::Core(id) => {
                let c = self.cores.get(id)?;
                (c.owner, c.position, c.radius, c.health)
            }
        };
        (health > 0.0).then(|| TargetInfo {
            target,
            owner,
            team: self.team_of(owner),
            position,
            radius,
        })
    }

    /// Every live target, units first, then buildings, mirrors and cores,
    /// each in arena order.
    pub fn collect_targets(&self) -> Vec<TargetInfo> {
        let refs = self
            .units
            .keys()
            .map(TargetRef::Unit)
            .chain(self.buildings.keys().map(TargetRef::Building))
            .chain(self.mirrors.keys().map(TargetRef::Mirror))
            .chain(self.cores.keys().map(TargetRef::Core));
        refs.filter_map(|t| self.target_info(t)).collect()
    }

    /// Damage a target. Returns `false` when it no longer exists.
    pub fn apply_damage(&mut self, target: TargetRef, amount: f32) -> bool {
        match target {
            TargetRef::Unit(id) => self.units.get_mut(id).map(|u| u.apply_damage(amount)),
            TargetRef::Building(id) => self.buildings.get_mut(id).map(|b| b.apply_damage(amount)),
            TargetRef::Mirror(id) => self.mirrors.get_mut(id).map(|m| m.apply_damage(amount)),
            TargetRef::Core(id) => self.cores.get_mut(id).map(|c| c.apply_damage(amount)),
        }
        .is_some()
    }

    /// Core position of `player`, if the core is alive.
    pub fn core_position(&self, player: PlayerId) -> Option<Vec2> {
        self.cores
            .values()
            .find(|c| c.owner == player && c.health > 0.0)
            .map(|c| c.position)
    }

    /// Whether `point` lies within `player`'s construction influence: the
    /// core's influence radius or any completed warp gate's zone.
    pub fn in_influence(
        &self,
        player: PlayerId,
        point: Vec2,
        influence_radius: f32,
        gate_radius: f32,
    ) -> bool {
        let near_core = self
            .core_position(player)
            .is_some_and(|c| c.distance_sq(point) <= influence_radius * influence_radius);
        near_core
            || self.buildings.values().any(|b| {
                b.owner == player
                    && b.kind == BuildingKind::WarpGate
                    && b.is_complete()
                    && b.health > 0.0
                    && b.position.distance_sq(point) <= gate_radius * gate_radius
            })
    }

    /// Whether a circle at `position` lies inside the playfield and overlaps
    /// no structure or asteroid.
    pub fn is_clear_for(&self, position: Vec2, radius: f32) -> bool {
        let h = self.half_extents;
        if position.x.abs() + radius > h.x || position.y.abs() + radius > h.y {
            return false;
        }
        let overlaps = |center: Vec2, r: f32| center.distance_sq(position) < (r + radius) * (r + radius);
        !(self.buildings.values().any(|b| b.health > 0.0 && overlaps(b.position, b.radius))
            || self.cores.values().any(|c| c.health > 0.0 && overlaps(c.position, c.radius))
            || self.asteroids.values().any(|a| overlaps(a.position, a.radius)))
    }

    /// Live units owned by `player` that currently carry no order.
    pub fn idle_units(&self, player: PlayerId) -> impl Iterator<Item = (UnitId, &Unit)> + '_ {
        self.units
            .iter()
            .filter(move |(_, u)| u.owner == player && u.health > 0.0 && u.order == UnitOrder::Idle)
    }
}
