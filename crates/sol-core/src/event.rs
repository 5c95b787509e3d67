//! Simulation events handed to collaborators outside the core.
//!
//! The core records what happened (deaths, completions, defeats) into a
//! pre-allocated ring buffer. Rendering, audio and cosmetic effects (death
//! fragments, muzzle flashes) consume them with their own randomness; the
//! core never reads them back, so dropping old events cannot affect state.

use crate::entity::{BuildingKind, HeroKind, UnitKind};
use crate::fixed::Ticks;
use crate::id::*;
use crate::math::Vec2;
use crate::player::UpgradeKind;
use crate::production::ProductionItem;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    // -- Units --
    UnitSpawned {
        unit: UnitId,
        owner: PlayerId,
        kind: UnitKind,
        tick: Ticks,
    },
    UnitDied {
        unit: UnitId,
        owner: PlayerId,
        kind: UnitKind,
        position: Vec2,
        tick: Ticks,
    },
    AbilityFired {
        unit: UnitId,
        owner: PlayerId,
        hero: HeroKind,
        direction: Vec2,
        tick: Ticks,
    },

    // -- Structures --
    BuildingPlaced {
        building: BuildingId,
        owner: PlayerId,
        kind: BuildingKind,
        tick: Ticks,
    },
    BuildingCompleted {
        building: BuildingId,
        owner: PlayerId,
        kind: BuildingKind,
        tick: Ticks,
    },
    BuildingDestroyed {
        building: BuildingId,
        owner: PlayerId,
        kind: BuildingKind,
        position: Vec2,
        tick: Ticks,
    },
    MirrorSpawned {
        mirror: MirrorId,
        owner: PlayerId,
        tick: Ticks,
    },
    MirrorDestroyed {
        mirror: MirrorId,
        owner: PlayerId,
        position: Vec2,
        tick: Ticks,
    },
    CoreDestroyed {
        core: CoreId,
        owner: PlayerId,
        position: Vec2,
        tick: Ticks,
    },
    ProductionCompleted {
        owner: PlayerId,
        item: ProductionItem,
        tick: Ticks,
    },
    UpgradeResearched {
        owner: PlayerId,
        upgrade: UpgradeKind,
        tick: Ticks,
    },

    // -- Fusion --
    RitualCompleted {
        ritual: RitualId,
        owner: PlayerId,
        gate: BuildingId,
        tick: Ticks,
    },
    RitualDissolved {
        ritual: RitualId,
        owner: PlayerId,
        tick: Ticks,
    },

    // -- Effects --
    ProjectileImpact {
        owner: PlayerId,
        position: Vec2,
        tick: Ticks,
    },
    ShieldIntercept {
        building: BuildingId,
        position: Vec2,
        tick: Ticks,
    },

    // -- Match --
    PlayerDefeated {
        player: PlayerId,
        tick: Ticks,
    },
    Checkpoint {
        tick: Ticks,
        hash: u32,
    },
}

impl SimEvent {
    /// Tick at which the event occurred.
    pub fn tick(&self) -> Ticks {
        match self {
            SimEvent::UnitSpawned { tick, .. }
            | SimEvent::UnitDied { tick, .. }
            | SimEvent::AbilityFired { tick, .. }
            | SimEvent::BuildingPlaced { tick, .. }
            | SimEvent::BuildingCompleted { tick, .. }
            | SimEvent::BuildingDestroyed { tick, .. }
            | SimEvent::MirrorSpawned { tick, .. }
            | SimEvent::MirrorDestroyed { tick, .. }
            | SimEvent::CoreDestroyed { tick, .. }
            | SimEvent::ProductionCompleted { tick, .. }
            | SimEvent::UpgradeResearched { tick, .. }
            | SimEvent::RitualCompleted { tick, .. }
            | SimEvent::RitualDissolved { tick, .. }
            | SimEvent::ProjectileImpact { tick, .. }
            | SimEvent::ShieldIntercept { tick, .. }
            | SimEvent::PlayerDefeated { tick, .. }
            | SimEvent::Checkpoint { tick, .. } => *tick,
        }
    }
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

/// Fixed-capacity ring buffer of events. When full, the oldest event is
/// overwritten.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Option<SimEvent>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    pub fn push(&mut self, event: SimEvent) {
        let cap = self.capacity();
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % cap;
        if self.len < cap {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events overwritten before anyone drained them.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &SimEvent> + '_ {
        let cap = self.capacity();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).filter_map(move |i| self.events[(start + i) % cap].as_ref())
    }

    /// Take every stored event, oldest first.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        let cap = self.capacity();
        let start = (self.head + cap - self.len) % cap;
        let mut out = Vec::with_capacity(self.len);
        for i in 0..self.len {
            if let Some(e) = self.events[(start + i) % cap].take() {
                out.push(e);
            }
        }
        self.len = 0;
        out
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.len = 0;
    }
}
