//! Short-lived effect families and the per-entity outbox.
//!
//! Units and buildings never write into shared effect storage while they
//! update. They push [`Effect`]s into their own [`Outbox`], which the
//! orchestrator drains exactly once per player turn, after every entity of
//! that player has updated.

use crate::entity::TargetRef;
use crate::id::PlayerId;
use crate::math::Vec2;

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Pending side effects of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbox<T> {
    items: Vec<T>,
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Outbox<T> {
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Take every pending item, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A combat side effect produced by a unit or building.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Projectile(Projectile),
    Beam(BeamEffect),
    Reveal(RevealCone),
    /// Instant damage to a known target.
    Strike { target: TargetRef, damage: f32 },
}

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub owner: PlayerId,
    pub team: u8,
    pub position: Vec2,
    pub velocity: Vec2,
    pub damage: f32,
    pub radius: f32,
    /// Seconds left before the projectile fizzles.
    pub lifetime: f32,
    /// Zero for single-target hits.
    pub splash_radius: f32,
    pub spent: bool,
}

impl Projectile {
    pub fn is_expired(&self) -> bool {
        self.spent || self.lifetime <= 0.0
    }
}

/// A straight damaging segment. Damage is applied once, on the first
/// resolution pass; the beam then lingers for `ttl` seconds for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamEffect {
    pub owner: PlayerId,
    pub team: u8,
    pub start: Vec2,
    pub end: Vec2,
    pub damage: f32,
    pub width: f32,
    /// Whether the beam also damages structures and mirrors.
    pub hits_structures: bool,
    pub ttl: f32,
    pub resolved: bool,
}

impl BeamEffect {
    pub fn is_expired(&self) -> bool {
        self.resolved && self.ttl <= 0.0
    }
}

/// A cone of temporary vision.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealCone {
    pub owner: PlayerId,
    pub team: u8,
    pub origin: Vec2,
    /// Unit vector along the cone axis.
    pub direction: Vec2,
    pub range: f32,
    pub half_angle: f32,
    pub ttl: f32,
}

impl RevealCone {
    pub fn contains(&self, point: Vec2) -> bool {
        let (dir, dist) = (point - self.origin).normalize_with_length();
        if dist > self.range {
            return false;
        }
        if dist <= crate::math::EPSILON {
            return true;
        }
        dir.dot(self.direction) >= libm::cosf(self.half_angle)
    }

    pub fn is_expired(&self) -> bool {
        self.ttl <= 0.0
    }
}

/// Short-range particle that drifts, repels its neighbours and is pushed
/// around by passing units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DustParticle {
    pub position: Vec2,
    pub velocity: Vec2,
}
