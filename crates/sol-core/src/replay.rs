//! Replay recording and playback for debugging and desync forensics.
//!
//! A match is fully determined by its config and the commands applied on
//! each tick. A [`ReplayLog`] captures both, plus the rolling hash
//! checkpoints seen while recording, so playback can confirm that it
//! reproduced the same simulation. Engine-originated commands (AI and the
//! countdown deploy) are not logged; playback regenerates them.
//!
//! Playback steps at the configured fixed step. Matches driven with
//! arbitrary `update(dt)` steps do not replay.

use crate::command::Command;
use crate::config::{ConfigError, MatchConfig};
use crate::engine::Engine;
use crate::fixed::Ticks;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("command history was trimmed; raise `command_history` to record replays")]
    IncompleteHistory,
    #[error("replay encoding failed: {0}")]
    Encode(String),
    #[error("replay decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// ReplayMismatch
// ---------------------------------------------------------------------------

/// Details about where replay verification failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMismatch {
    /// Checkpoint tick where the mismatch was detected.
    pub tick: Ticks,
    /// Expected hash from the recording.
    pub expected_hash: u32,
    /// Actual hash from the replay.
    pub actual_hash: u32,
}

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReplayLog {
    pub config: MatchConfig,
    /// Applied commands as `(applied_tick, command)`, in application order.
    pub commands: Vec<(Ticks, Command)>,
    /// Rolling hash checkpoints as `(tick, hash)`.
    pub hash_checkpoints: Vec<(Ticks, u32)>,
    /// Ticks run while recording.
    pub ticks: Ticks,
}

impl ReplayLog {
    /// Capture everything needed to replay `engine` from its start.
    pub fn from_engine(engine: &Engine) -> Result<Self, ReplayError> {
        if !engine.commands.history_complete() {
            return Err(ReplayError::IncompleteHistory);
        }
        Ok(Self {
            config: engine.config().clone(),
            commands: engine.command_history().to_vec(),
            hash_checkpoints: engine.checkpoints().collect(),
            ticks: engine.tick(),
        })
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Serialize the replay log to bytes (using bitcode).
    pub fn serialize(&self) -> Result<Vec<u8>, ReplayError> {
        bitcode::serialize(self).map_err(|e| ReplayError::Encode(e.to_string()))
    }

    /// Deserialize a replay log from bytes.
    pub fn deserialize(data: &[u8]) -> Result<Self, ReplayError> {
        bitcode::deserialize(data).map_err(|e| ReplayError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ReplayResult
// ---------------------------------------------------------------------------

/// The result of replaying a log.
#[derive(Debug)]
pub struct ReplayResult {
    pub ticks_run: Ticks,
    pub commands_delivered: usize,
    /// Number of recorded checkpoints compared.
    pub checkpoints_checked: usize,
    /// Whether all compared checkpoints matched.
    pub is_verified: bool,
    /// First mismatch encountered (if any).
    pub first_mismatch: Option<ReplayMismatch>,
    /// The engine after playback.
    pub engine: Engine,
}

// ---------------------------------------------------------------------------
// Replay execution
// ---------------------------------------------------------------------------

/// Replay a log and verify hash checkpoints.
pub fn replay_and_verify(log: &ReplayLog) -> Result<ReplayResult, ReplayError> {
    let mut engine = Engine::new(log.config.clone())?;

    let mut first_mismatch: Option<ReplayMismatch> = None;
    let mut checkpoints_checked = 0;
    let mut next_command = 0;

    let mut check = |engine: &Engine, first_mismatch: &mut Option<ReplayMismatch>| {
        let tick = engine.tick();
        let Some(&(_, expected)) = log.hash_checkpoints.iter().find(|(t, _)| *t == tick) else {
            return;
        };
        checkpoints_checked += 1;
        let actual = engine.checkpoint(tick).unwrap_or_else(|| engine.state_hash());
        if actual != expected && first_mismatch.is_none() {
            tracing::warn!(tick, expected, actual, "replay diverged");
            *first_mismatch = Some(ReplayMismatch {
                tick,
                expected_hash: expected,
                actual_hash: actual,
            });
        }
    };

    check(&engine, &mut first_mismatch);
    while engine.tick() < log.ticks {
        let tick = engine.tick();
        let start = next_command;
        while next_command < log.commands.len() && log.commands[next_command].0 == tick {
            next_command += 1;
        }
        if next_command > start {
            let batch = log.commands[start..next_command]
                .iter()
                .map(|(_, c)| c.clone())
                .collect();
            engine.deliver_command_batch(batch);
        }
        engine.step();
        check(&engine, &mut first_mismatch);
    }

    Ok(ReplayResult {
        ticks_run: engine.tick(),
        commands_delivered: next_command,
        checkpoints_checked,
        is_verified: first_mismatch.is_none(),
        first_mismatch,
        engine,
    })
}

/// Replay a log without verification (just reproduce the state).
pub fn replay(log: &ReplayLog) -> Result<Engine, ReplayError> {
    replay_and_verify(log).map(|r| r.engine)
}
