//! Simulation clock and the rolling state hash used for desync detection.

use crate::fixed::{Fixed64, Ticks};
use std::collections::VecDeque;

/// Number of hash checkpoints retained for late remote comparisons.
pub const CHECKPOINT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable simulation clock tracked by the engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Completed ticks.
    pub tick: Ticks,
    /// Seconds of simulated time, used for AI cooldown timestamps.
    pub game_time: f64,
    /// Seconds of pre-game countdown left.
    pub countdown_remaining: f32,
    /// Host time not yet consumed by [`crate::engine::Engine::advance`].
    pub accumulator: f32,
    /// Whether the one-time starting mirror deploy has been issued.
    pub mirrors_deployed: bool,
}

impl SimState {
    pub fn new(countdown: f32) -> Self {
        Self {
            tick: 0,
            game_time: 0.0,
            countdown_remaining: countdown,
            accumulator: 0.0,
            mirrors_deployed: false,
        }
    }

    pub fn in_countdown(&self) -> bool {
        self.countdown_remaining > 0.0
    }
}

/// Result of an `Engine::advance()` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceResult {
    /// Number of fixed steps actually executed.
    pub steps_run: u64,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// 32-bit multiply-xor hash over canonical state words.
///
/// Floats are fed by bit pattern, so two peers agree only when their state
/// is bit-identical, which is exactly what lockstep requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u32);

impl StateHash {
    const OFFSET: u32 = 0x811C_9DC5;
    const PRIME: u32 = 0x0100_0193;

    pub fn new() -> Self {
        Self(Self::OFFSET)
    }

    /// Continue from a previous value.
    pub fn from_seed(seed: u32) -> Self {
        Self(seed)
    }

    #[inline]
    pub fn write_u32(&mut self, word: u32) {
        self.0 = (self.0 ^ word).wrapping_mul(Self::PRIME);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write_u32(v as u32);
        self.write_u32((v >> 32) as u32);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u32(u32::from(v));
    }

    pub fn write_vec2(&mut self, v: crate::math::Vec2) {
        self.write_f32(v.x);
        self.write_f32(v.y);
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write_u64(v.to_bits() as u64);
    }

    pub fn finish(self) -> u32 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Rolling checkpoints
// ---------------------------------------------------------------------------

/// Folds each checkpoint's state hash into the previous checkpoint value,
/// so a checkpoint attests to the whole history up to that tick.
#[derive(Debug, Clone, PartialEq)]
pub struct HashAccumulator {
    interval: Ticks,
    rolling: u32,
    checkpoints: VecDeque<(Ticks, u32)>,
}

impl HashAccumulator {
    pub fn new(interval: Ticks) -> Self {
        Self {
            interval: interval.max(1),
            rolling: StateHash::OFFSET,
            checkpoints: VecDeque::with_capacity(CHECKPOINT_CAPACITY),
        }
    }

    pub fn interval(&self) -> Ticks {
        self.interval
    }

    /// Whether `tick` is a checkpoint tick.
    pub fn is_due(&self, tick: Ticks) -> bool {
        tick % self.interval == 0
    }

    /// Record the state hash for `tick` and return the new rolling value.
    pub fn fold(&mut self, tick: Ticks, state_hash: u32) -> u32 {
        let mut h = StateHash::from_seed(self.rolling);
        h.write_u64(tick);
        h.write_u32(state_hash);
        self.rolling = h.finish();
        if self.checkpoints.len() == CHECKPOINT_CAPACITY {
            self.checkpoints.pop_front();
        }
        self.checkpoints.push_back((tick, self.rolling));
        self.rolling
    }

    /// Most recent checkpoint.
    pub fn latest(&self) -> Option<(Ticks, u32)> {
        self.checkpoints.back().copied()
    }

    /// Checkpoint value at `tick`, if still retained.
    pub fn at(&self, tick: Ticks) -> Option<u32> {
        self.checkpoints
            .iter()
            .rev()
            .find(|(t, _)| *t == tick)
            .map(|(_, h)| *h)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = (Ticks, u32)> + '_ {
        self.checkpoints.iter().copied()
    }
}
