//! Transport seam and desync detection.
//!
//! The core never talks to a network. A session layer implements
//! [`CommandTransport`] and feeds remote batches back through
//! [`crate::engine::Engine::deliver_command_batch`]. Checkpoint hashes are
//! exchanged out of band and compared here; a mismatch is reported upward
//! and nothing in the core tries to recover from it.

use crate::command::Command;
use crate::fixed::Ticks;
use crate::id::PlayerId;
use crate::sim::CHECKPOINT_CAPACITY;
use std::collections::VecDeque;

/// What the engine needs from a session transport.
pub trait CommandTransport {
    /// The player this peer issues commands for.
    fn local_player(&self) -> PlayerId;

    /// Fire-and-forget broadcast. Delivery is eventual, not ordered.
    fn send_command(&mut self, command: &Command);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DesyncError {
    #[error("desync at tick {tick} with {peer}: local {local:08x}, remote {remote:08x}")]
    Mismatch {
        tick: Ticks,
        peer: PlayerId,
        local: u32,
        remote: u32,
    },
}

/// Compares local checkpoint hashes with those reported by peers. Either
/// side may arrive first; the comparison happens when both are known.
#[derive(Debug, Clone, Default)]
pub struct DesyncMonitor {
    local: VecDeque<(Ticks, u32)>,
    remote: VecDeque<(PlayerId, Ticks, u32)>,
    verified: u64,
}

impl DesyncMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record our own checkpoint and check it against any remote reports
    /// already waiting for that tick.
    pub fn record_local(&mut self, tick: Ticks, hash: u32) -> Result<(), DesyncError> {
        push_bounded(&mut self.local, (tick, hash));
        let waiting: Vec<(PlayerId, u32)> = self
            .remote
            .iter()
            .filter(|(_, t, _)| *t == tick)
            .map(|(p, _, h)| (*p, *h))
            .collect();
        self.remote.retain(|(_, t, _)| *t != tick);
        for (peer, remote) in waiting {
            self.compare(tick, peer, hash, remote)?;
        }
        Ok(())
    }

    /// Record a peer's checkpoint. Checked now if we already have the
    /// local value, otherwise held until we do.
    pub fn record_remote(&mut self, peer: PlayerId, tick: Ticks, hash: u32) -> Result<(), DesyncError> {
        match self.local.iter().rev().find(|(t, _)| *t == tick) {
            Some(&(_, local)) => self.compare(tick, peer, local, hash),
            None => {
                push_bounded(&mut self.remote, (peer, tick, hash));
                Ok(())
            }
        }
    }

    /// Number of remote checkpoints that matched.
    pub fn verified_count(&self) -> u64 {
        self.verified
    }

    /// Remote reports still waiting for a local checkpoint.
    pub fn pending_remote(&self) -> usize {
        self.remote.len()
    }

    fn compare(&mut self, tick: Ticks, peer: PlayerId, local: u32, remote: u32) -> Result<(), DesyncError> {
        if local == remote {
            self.verified += 1;
            return Ok(());
        }
        tracing::warn!(tick, %peer, local, remote, "state hash mismatch");
        Err(DesyncError::Mismatch {
            tick,
            peer,
            local,
            remote,
        })
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T) {
    if queue.len() == CHECKPOINT_CAPACITY {
        queue.pop_front();
    }
    queue.push_back(item);
}
