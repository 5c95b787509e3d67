use serde::{Deserialize, Serialize};
use slotmap::{Key, new_key_type};

new_key_type! {
    /// Identifies a mobile unit (worker, soldier or hero).
    pub struct UnitId;

    /// Identifies a player-built stationary structure.
    pub struct BuildingId;

    /// Identifies a solar mirror.
    pub struct MirrorId;

    /// Identifies a player's core structure.
    pub struct CoreId;

    /// Identifies an asteroid obstacle.
    pub struct AsteroidId;

    /// Identifies an in-progress fusion ritual.
    pub struct RitualId;
}

/// Identifies a player. Doubles as the index into the engine's roster,
/// so ids are dense and assigned in roster order starting at zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PlayerId(pub u8);

impl PlayerId {
    /// Index into the player roster.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Stable 64-bit encoding of an arena key, used for hashing and logs.
#[inline]
pub fn key_bits<K: Key>(key: K) -> u64 {
    key.data().as_ffi()
}
