//! Entity model: units, buildings, core structures, mirrors, asteroids and
//! suns, plus the capability traits combat code is written against.
//!
//! Entities live in flat slotmap arenas owned by the engine. `owner` is a
//! lookup key into the player roster, never a pointer, so removing an entity
//! needs nothing beyond the end-of-phase prune. Behaviour that differs per
//! subtype is selected by an explicit kind tag ([`UnitKind`],
//! [`BuildingKind`]) and the small trait set [`Combatable`], [`Attacker`]
//! and [`AbilityUser`].

use crate::effects::{Effect, Outbox};
use crate::fixed::Fixed64;
use crate::id::{BuildingId, CoreId, MirrorId, PlayerId, RitualId, UnitId};
use crate::math::Vec2;
use crate::production::{Construction, ProductionQueue};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeroKind {
    /// Fires a piercing beam.
    Lancer,
    /// Fires a fan of projectiles.
    Scatter,
    /// Projects a reveal cone.
    Seer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Worker,
    Soldier,
    Hero(HeroKind),
}

impl UnitKind {
    pub fn is_hero(self) -> bool {
        matches!(self, UnitKind::Hero(_))
    }

    pub(crate) fn tag(self) -> u32 {
        match self {
            UnitKind::Worker => 0,
            UnitKind::Soldier => 1,
            UnitKind::Hero(h) => 2 + h as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    Cannon,
    Foundry,
    ShieldTower,
    LanceTower,
    /// Only created by a fusion ritual.
    WarpGate,
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A handle to anything that can take damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetRef {
    Unit(UnitId),
    Building(BuildingId),
    Mirror(MirrorId),
    Core(CoreId),
}

impl TargetRef {
    pub fn is_structure(self) -> bool {
        !matches!(self, TargetRef::Unit(_))
    }
}

/// Read-only view of a live target, captured at the start of a player's
/// turn so that targeting never aliases the arenas being mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetInfo {
    pub target: TargetRef,
    pub owner: PlayerId,
    pub team: u8,
    pub position: Vec2,
    pub radius: f32,
}

/// Anything with a position, an owner and health.
pub trait Combatable {
    fn position(&self) -> Vec2;
    fn radius(&self) -> f32;
    fn owner(&self) -> PlayerId;
    fn health(&self) -> f32;
    fn health_mut(&mut self) -> &mut f32;

    /// Subtract damage, clamping at zero so combat code never reads a
    /// negative value.
    fn apply_damage(&mut self, amount: f32) {
        let health = self.health_mut();
        *health = (*health - amount.max(0.0)).max(0.0);
    }

    fn is_alive(&self) -> bool {
        self.health() > 0.0
    }
}

macro_rules! impl_combatable {
    ($ty:ty) => {
        impl Combatable for $ty {
            fn position(&self) -> Vec2 {
                self.position
            }
            fn radius(&self) -> f32 {
                self.radius
            }
            fn owner(&self) -> PlayerId {
                self.owner
            }
            fn health(&self) -> f32 {
                self.health
            }
            fn health_mut(&mut self) -> &mut f32 {
                &mut self.health
            }
        }
    };
}

impl_combatable!(Unit);
impl_combatable!(Building);
impl_combatable!(CoreStructure);
impl_combatable!(SolarMirror);

/// Entities with a basic attack on a reload timer.
pub trait Attacker: Combatable {
    fn attack(&self) -> Option<&AttackStats>;
    fn attack_mut(&mut self) -> Option<&mut AttackStats>;
    fn outbox_mut(&mut self) -> &mut Outbox<Effect>;

    /// Tick the reload timer.
    fn cool_down(&mut self, dt: f32) {
        if let Some(attack) = self.attack_mut() {
            attack.timer = (attack.timer - dt).max(0.0);
        }
    }

    /// Whether `target` is inside attack range, edge to edge.
    fn in_range(&self, target: &TargetInfo) -> bool {
        self.attack().is_some_and(|a| {
            self.position().distance(target.position) - target.radius - self.radius() <= a.range
        })
    }

    /// Fire at `target` if reloaded. Emits a projectile when the attack has a
    /// projectile speed, otherwise an instant strike.
    fn try_fire(&mut self, target: &TargetInfo, projectile: ProjectileTemplate) -> bool {
        let origin = self.position();
        let owner = self.owner();
        let Some(attack) = self.attack_mut() else {
            return false;
        };
        if attack.timer > 0.0 {
            return false;
        }
        attack.timer = attack.cooldown;
        let damage = attack.damage;
        let speed = attack.projectile_speed;
        let effect = if speed > 0.0 {
            let dir = (target.position - origin).normalize_or(Vec2::X);
            Effect::Projectile(crate::effects::Projectile {
                owner,
                team: projectile.team,
                position: origin,
                velocity: dir * speed,
                damage,
                radius: projectile.radius,
                lifetime: projectile.lifetime,
                splash_radius: projectile.splash_radius,
                spent: false,
            })
        } else {
            Effect::Strike {
                target: target.target,
                damage,
            }
        };
        self.outbox_mut().push(effect);
        true
    }
}

/// Shared projectile parameters passed to [`Attacker::try_fire`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileTemplate {
    pub team: u8,
    pub radius: f32,
    pub lifetime: f32,
    pub splash_radius: f32,
}

/// Entities with a directional ability gated by a cooldown.
pub trait AbilityUser {
    fn ability_ready(&self) -> bool;
    /// Queue an ability toward `direction`. Fired on the next unit update.
    fn queue_ability(&mut self, direction: Vec2) -> bool;
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackStats {
    pub damage: f32,
    pub range: f32,
    pub cooldown: f32,
    /// Seconds until the next shot.
    pub timer: f32,
    /// Zero means instant hits.
    pub projectile_speed: f32,
}

impl AttackStats {
    /// `None` for classes without damage.
    pub fn new(damage: f32, range: f32, cooldown: f32, projectile_speed: f32) -> Option<Self> {
        (damage > 0.0).then_some(Self {
            damage,
            range,
            cooldown,
            timer: 0.0,
            projectile_speed,
        })
    }
}

/// What a unit is doing. A manual attack order and a rally point are
/// mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UnitOrder {
    #[default]
    Idle,
    Rally(Vec2),
    Attack {
        target: TargetRef,
        approach: Vec2,
    },
    Path {
        waypoints: Vec<Vec2>,
        next: usize,
    },
    Fuse(RitualId),
}

impl UnitOrder {
    pub(crate) fn tag(&self) -> u32 {
        match self {
            UnitOrder::Idle => 0,
            UnitOrder::Rally(_) => 1,
            UnitOrder::Attack { .. } => 2,
            UnitOrder::Path { .. } => 3,
            UnitOrder::Fuse(_) => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub owner: PlayerId,
    pub kind: UnitKind,
    pub position: Vec2,
    /// Position at the start of this tick's movement; collision resolution
    /// reverts to it when soft pushing fails.
    pub prev_position: Vec2,
    pub velocity: Vec2,
    pub health: f32,
    pub max_health: f32,
    pub radius: f32,
    pub speed: f32,
    pub vision_radius: f32,
    pub order: UnitOrder,
    pub attack: Option<AttackStats>,
    pub ability_cooldown: f32,
    pub pending_ability: Option<Vec2>,
    pub outbox: Outbox<Effect>,
}

impl Unit {
    pub fn is_hero(&self) -> bool {
        self.kind.is_hero()
    }
}

impl Attacker for Unit {
    fn attack(&self) -> Option<&AttackStats> {
        self.attack.as_ref()
    }
    fn attack_mut(&mut self) -> Option<&mut AttackStats> {
        self.attack.as_mut()
    }
    fn outbox_mut(&mut self) -> &mut Outbox<Effect> {
        &mut self.outbox
    }
}

impl AbilityUser for Unit {
    fn ability_ready(&self) -> bool {
        self.is_hero() && self.ability_cooldown <= 0.0
    }

    fn queue_ability(&mut self, direction: Vec2) -> bool {
        let dir = direction.normalize();
        if !self.ability_ready() || dir == Vec2::ZERO {
            return false;
        }
        self.pending_ability = Some(dir);
        true
    }
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShieldState {
    pub charge: f32,
    pub capacity: f32,
    pub radius: f32,
    pub recharge: f32,
}

/// Lance tower sequence: lock on, fire, reload.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LanceState {
    #[default]
    Ready,
    LockingOn {
        aim: Vec2,
        remaining: f32,
    },
    Reloading {
        remaining: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub owner: PlayerId,
    pub kind: BuildingKind,
    pub position: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub construction: Construction,
    pub attack: Option<AttackStats>,
    /// Mirror light delivered this tick. Reset at the start of every tick.
    pub incoming_light: Fixed64,
    pub production: Option<ProductionQueue>,
    pub shield: Option<ShieldState>,
    pub lance: Option<LanceState>,
    pub outbox: Outbox<Effect>,
}

impl Building {
    pub fn is_complete(&self) -> bool {
        self.construction.is_complete()
    }
}

impl Attacker for Building {
    fn attack(&self) -> Option<&AttackStats> {
        self.attack.as_ref()
    }
    fn attack_mut(&mut self) -> Option<&mut AttackStats> {
        self.attack.as_mut()
    }
    fn outbox_mut(&mut self) -> &mut Outbox<Effect> {
        &mut self.outbox
    }
}

/// A player's home structure ("stellar forge"). Losing it defeats the
/// player.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStructure {
    pub owner: PlayerId,
    pub position: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub speed: f32,
    pub move_target: Option<Vec2>,
    pub production: ProductionQueue,
    pub incoming_light: Fixed64,
}

// ---------------------------------------------------------------------------
// Mirrors
// ---------------------------------------------------------------------------

/// The single structure a mirror currently feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MirrorLink {
    #[default]
    None,
    Core(CoreId),
    Building(BuildingId),
}

impl MirrorLink {
    pub(crate) fn tag(self) -> u32 {
        match self {
            MirrorLink::None => 0,
            MirrorLink::Core(_) => 1,
            MirrorLink::Building(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolarMirror {
    pub owner: PlayerId,
    pub position: Vec2,
    pub move_target: Option<Vec2>,
    pub speed: f32,
    pub health: f32,
    pub max_health: f32,
    pub radius: f32,
    pub link: MirrorLink,
    /// Orientation bisecting the sun and link directions, for rendering.
    pub reflection_angle: f32,
    /// Energy per second at efficiency 1 under a unit-intensity sun.
    pub energy_rate: Fixed64,
    pub efficiency: Fixed64,
    /// Energy transferred on the last tick.
    pub last_output: Fixed64,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Rotating convex obstacle. Blocks light, beams and projectiles by its
/// polygon and bodies by its bounding circle.
#[derive(Debug, Clone, PartialEq)]
pub struct Asteroid {
    pub position: Vec2,
    /// Convex polygon around the origin, counter-clockwise.
    pub local_vertices: Vec<Vec2>,
    pub rotation: f32,
    pub rotation_speed: f32,
    /// Bounding radius of `local_vertices`.
    pub radius: f32,
}

impl Asteroid {
    pub fn new(position: Vec2, local_vertices: Vec<Vec2>, rotation_speed: f32) -> Self {
        let radius = local_vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0f32, f32::max);
        Self {
            position,
            local_vertices,
            rotation: 0.0,
            rotation_speed,
            radius,
        }
    }

    pub fn world_vertices(&self) -> Vec<Vec2> {
        self.local_vertices
            .iter()
            .map(|v| self.position + v.rotate(self.rotation))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sun {
    pub position: Vec2,
    pub radius: f32,
    pub intensity: f32,
    pub orbit: Option<crate::config::SunOrbit>,
}

/// Workers walking to a point to merge into a warp gate.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionRitual {
    pub owner: PlayerId,
    pub position: Vec2,
    pub participants: Vec<UnitId>,
}
