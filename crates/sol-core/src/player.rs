use crate::ai::AiState;
use crate::config::Faction;
use crate::entity::CoreStructure;
use crate::fixed::Fixed64;
use crate::id::{CoreId, PlayerId};
use crate::math::Vec2;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

/// Research items produced by a foundry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeKind {
    /// Mirror output +25 %.
    FocusedMirrors,
    /// Units spawned afterwards get +20 % max health.
    HardenedHulls,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrades {
    pub focused_mirrors: bool,
    pub hardened_hulls: bool,
}

impl Upgrades {
    pub fn has(&self, kind: UpgradeKind) -> bool {
        match kind {
            UpgradeKind::FocusedMirrors => self.focused_mirrors,
            UpgradeKind::HardenedHulls => self.hardened_hulls,
        }
    }

    pub fn grant(&mut self, kind: UpgradeKind) {
        match kind {
            UpgradeKind::FocusedMirrors => self.focused_mirrors = true,
            UpgradeKind::HardenedHulls => self.hardened_hulls = true,
        }
    }

    /// Multiplier applied to mirror output.
    pub fn mirror_bonus(&self) -> Fixed64 {
        if self.focused_mirrors {
            Fixed64::from_num(1.25)
        } else {
            Fixed64::ONE
        }
    }

    /// Multiplier applied to the max health of newly spawned units.
    pub fn health_bonus(&self) -> f32 {
        if self.hardened_hulls { 1.2 } else { 1.0 }
    }

    pub(crate) fn bits(&self) -> u32 {
        u32::from(self.focused_mirrors) | (u32::from(self.hardened_hulls) << 1)
    }
}

/// A match participant. Players are created at setup and never removed;
/// owned entities live in the engine's arenas and point back here through
/// their `owner` id.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub faction: Faction,
    pub team: u8,
    /// Spendable energy ("solarium").
    pub energy: Fixed64,
    pub core: Option<CoreId>,
    pub upgrades: Upgrades,
    /// Default path given to newly produced units.
    pub patrol_path: Vec<Vec2>,
    pub ai: Option<AiState>,
}

impl Player {
    /// Defeat is derived: the core is gone or has no health left.
    pub fn is_defeated(&self, cores: &SlotMap<CoreId, CoreStructure>) -> bool {
        match self.core.and_then(|id| cores.get(id)) {
            Some(core) => core.health <= 0.0,
            None => true,
        }
    }

    /// Spend `amount` if affordable. Returns whether the energy was taken.
    pub fn try_spend(&mut self, amount: Fixed64) -> bool {
        if self.energy >= amount {
            self.energy -= amount;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::ProductionQueue;

    fn player() -> Player {
        Player {
            id: PlayerId(0),
            name: "alpha".into(),
            faction: Faction::Aurum,
            team: 0,
            energy: Fixed64::from_num(100),
            core: None,
            upgrades: Upgrades::default(),
            patrol_path: Vec::new(),
            ai: None,
        }
    }

    fn core(owner: PlayerId, health: f32) -> CoreStructure {
        CoreStructure {
            owner,
            position: Vec2::ZERO,
            radius: 40.0,
            health,
            max_health: 1000.0,
            speed: 10.0,
            move_target: None,
            production: ProductionQueue::new(5),
            incoming_light: Fixed64::ZERO,
        }
    }

    #[test]
    fn defeated_without_core() {
        let cores = SlotMap::with_key();
        assert!(player().is_defeated(&cores));
    }

    #[test]
    fn defeat_tracks_core_health() {
        let mut cores = SlotMap::with_key();
        let id = cores.insert(core(PlayerId(0), 500.0));
        let mut p = player();
        p.core = Some(id);
        assert!(!p.is_defeated(&cores));
        cores[id].health = 0.0;
        assert!(p.is_defeated(&cores));
        cores.remove(id);
        assert!(p.is_defeated(&cores));
    }

    #[test]
    fn try_spend_is_all_or_nothing() {
        let mut p = player();
        assert!(!p.try_spend(Fixed64::from_num(150)));
        assert_eq!(p.energy, Fixed64::from_num(100));
        assert!(p.try_spend(Fixed64::from_num(40)));
        assert_eq!(p.energy, Fixed64::from_num(60));
    }

    #[test]
    fn upgrades_set_flags_and_bonuses() {
        let mut u = Upgrades::default();
        assert_eq!(u.mirror_bonus(), Fixed64::ONE);
        u.grant(UpgradeKind::FocusedMirrors);
        assert!(u.has(UpgradeKind::FocusedMirrors));
        assert!(!u.has(UpgradeKind::HardenedHulls));
        assert_eq!(u.mirror_bonus(), Fixed64::from_num(1.25));
        assert_eq!(u.bits(), 1);
    }
}
