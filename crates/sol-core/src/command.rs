//! Player command vocabulary and the buffered command queue.
//!
//! Humans, remote peers and the AI layer all speak the same vocabulary.
//! Commands are immutable once issued: the queue only buffers them until
//! their tick is due, and the router only reorders a batch before
//! dispatching it.

use crate::entity::{BuildingKind, HeroKind, MirrorLink, TargetRef};
use crate::fixed::Ticks;
use crate::id::{BuildingId, MirrorId, PlayerId, UnitId};
use crate::math::Vec2;
use crate::production::ProductionItem;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// How a group move spreads its units around the target point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Formation {
    /// Every unit heads for the exact point.
    #[default]
    Direct,
    /// Units take slots on a spiral around the point, in the order listed.
    Spread,
}

/// What a command asks for. Payloads reference the issuer's own entities;
/// the router rejects anything owned by someone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Rally units to a point.
    MoveUnits {
        units: Vec<UnitId>,
        target: Vec2,
        formation: Formation,
    },
    /// Manual attack order on an enemy structure or unit.
    TargetStructure {
        units: Vec<UnitId>,
        target: TargetRef,
    },
    FollowPath {
        units: Vec<UnitId>,
        waypoints: Vec<Vec2>,
    },
    /// Directional hero ability.
    UseAbility { unit: UnitId, direction: Vec2 },
    /// Queue a hero at the core.
    PurchaseHero { hero: HeroKind },
    /// Queue a worker at the core.
    PurchaseWorker,
    /// Queue a mirror at the core.
    PurchaseMirror,
    /// Place an incomplete building.
    PurchaseBuilding { kind: BuildingKind, position: Vec2 },
    /// Queue an item at a foundry.
    QueueProduction {
        building: BuildingId,
        item: ProductionItem,
    },
    MoveMirrors { mirrors: Vec<MirrorId>, target: Vec2 },
    LinkMirror { mirror: MirrorId, link: MirrorLink },
    /// Walk workers to a point and fuse them into a warp gate.
    MergeWorkers { units: Vec<UnitId>, position: Vec2 },
    /// Start a lance tower's lock-on toward `aim`.
    ChargeTower { building: BuildingId, aim: Vec2 },
    MoveCore { target: Vec2 },
    /// Default path for newly produced units. Empty clears it.
    SetPatrolPath { waypoints: Vec<Vec2> },
    /// A kind this build does not understand, from a peer on a newer
    /// vocabulary. Always dropped.
    Unknown { tag: u16 },
}

/// Wire tags of the kinds this build understands. Tags are stable: new
/// kinds get the next free number and existing numbers never move.
const KNOWN_TAGS: u16 = 15;

impl CommandKind {
    /// Stable wire tag. Unknown kinds keep the tag they arrived with.
    pub fn tag(&self) -> u16 {
        match self {
            CommandKind::MoveUnits { .. } => 0,
            CommandKind::TargetStructure { .. } => 1,
            CommandKind::FollowPath { .. } => 2,
            CommandKind::UseAbility { .. } => 3,
            CommandKind::PurchaseHero { .. } => 4,
            CommandKind::PurchaseWorker => 5,
            CommandKind::PurchaseMirror => 6,
            CommandKind::PurchaseBuilding { .. } => 7,
            CommandKind::QueueProduction { .. } => 8,
            CommandKind::MoveMirrors { .. } => 9,
            CommandKind::LinkMirror { .. } => 10,
            CommandKind::MergeWorkers { .. } => 11,
            CommandKind::ChargeTower { .. } => 12,
            CommandKind::MoveCore { .. } => 13,
            CommandKind::SetPatrolPath { .. } => 14,
            CommandKind::Unknown { tag } => *tag,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::MoveUnits { .. } => "move_units",
            CommandKind::TargetStructure { .. } => "target_structure",
            CommandKind::FollowPath { .. } => "follow_path",
            CommandKind::UseAbility { .. } => "use_ability",
            CommandKind::PurchaseHero { .. } => "purchase_hero",
            CommandKind::PurchaseWorker => "purchase_worker",
            CommandKind::PurchaseMirror => "purchase_mirror",
            CommandKind::PurchaseBuilding { .. } => "purchase_building",
            CommandKind::QueueProduction { .. } => "queue_production",
            CommandKind::MoveMirrors { .. } => "move_mirrors",
            CommandKind::LinkMirror { .. } => "link_mirror",
            CommandKind::MergeWorkers { .. } => "merge_workers",
            CommandKind::ChargeTower { .. } => "charge_tower",
            CommandKind::MoveCore { .. } => "move_core",
            CommandKind::SetPatrolPath { .. } => "set_patrol_path",
            CommandKind::Unknown { .. } => "unknown",
        }
    }
}

/// A command stamped with its execution tick and issuer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Tick at which the command executes.
    pub tick: Ticks,
    pub player: PlayerId,
    /// Issuer-local counter, the secondary sort key under
    /// [`crate::config::CommandOrdering::PlayerSequence`].
    pub sequence: u32,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(tick: Ticks, player: PlayerId, sequence: u32, kind: CommandKind) -> Self {
        Self {
            tick,
            player,
            sequence,
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire encoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("command encoding failed: {0}")]
    Encode(String),
    #[error("command decoding failed: {0}")]
    Decode(String),
}

/// One command on the wire: header, stable kind tag, and the encoded kind
/// as an opaque length-prefixed payload. A receiver that does not know the
/// tag skips the payload instead of failing the batch.
#[derive(Debug, Serialize, Deserialize)]
struct WireCommand {
    tick: Ticks,
    player: PlayerId,
    sequence: u32,
    tag: u16,
    payload: Vec<u8>,
}

/// Encode a batch for the transport.
pub fn encode_batch(commands: &[Command]) -> Result<Vec<u8>, CodecError> {
    let wire = commands
        .iter()
        .map(|c| -> Result<WireCommand, CodecError> {
            let payload = match c.kind {
                CommandKind::Unknown { .. } => Vec::new(),
                _ => bitcode::serialize(&c.kind).map_err(|e| CodecError::Encode(e.to_string()))?,
            };
            Ok(WireCommand {
                tick: c.tick,
                player: c.player,
                sequence: c.sequence,
                tag: c.kind.tag(),
                payload,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    bitcode::serialize(&wire).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a batch. Kinds with an unrecognised tag come back as
/// [`CommandKind::Unknown`] so the rest of the batch survives; a corrupt
/// payload under a known tag fails the whole batch.
pub fn decode_batch(data: &[u8]) -> Result<Vec<Command>, CodecError> {
    let wire: Vec<WireCommand> = bitcode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))?;
    wire.into_iter()
        .map(|w| -> Result<Command, CodecError> {
            let kind = if w.tag < KNOWN_TAGS {
                let kind: CommandKind =
                    bitcode::deserialize(&w.payload).map_err(|e| CodecError::Decode(e.to_string()))?;
                if kind.tag() != w.tag {
                    return Err(CodecError::Decode(format!(
                        "payload is a {} but the tag says {}",
                        kind.name(),
                        w.tag
                    )));
                }
                kind
            } else {
                CommandKind::Unknown { tag: w.tag }
            };
            Ok(Command::new(w.tick, w.player, w.sequence, kind))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// Commands waiting for their tick, plus the history of applied ones.
///
/// Delivery may happen at any time between ticks; the engine only drains
/// at tick start.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Vec<Command>,
    /// Applied commands as `(applied_tick, command)`.
    history: Vec<(Ticks, Command)>,
    /// Maximum history entries to retain. 0 = no history.
    max_history: usize,
    /// Entries dropped from the front of the history.
    trimmed: usize,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            max_history,
            ..Self::default()
        }
    }

    pub fn push(&mut self, command: Command) {
        self.pending.push(command);
    }

    pub fn push_batch(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.pending.extend(commands);
    }

    /// Remove and return every command whose tick is at or before `tick`,
    /// in arrival order. Later commands stay buffered.
    pub fn drain_due(&mut self, tick: Ticks) -> Vec<Command> {
        let (due, later): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|c| c.tick <= tick);
        self.pending = later;
        due
    }

    /// Append applied commands to the history, trimming the oldest.
    pub fn record(&mut self, tick: Ticks, applied: &[Command]) {
        if self.max_history == 0 {
            self.trimmed += applied.len();
            return;
        }
        self.history
            .extend(applied.iter().map(|c| (tick, c.clone())));
        let excess = self.history.len().saturating_sub(self.max_history);
        if excess > 0 {
            self.history.drain(..excess);
            self.trimmed += excess;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn history(&self) -> &[(Ticks, Command)] {
        &self.history
    }

    /// Whether the history still holds every command ever applied.
    pub fn history_complete(&self) -> bool {
        self.trimmed == 0
    }

    pub fn clear_history(&mut self) {
        self.trimmed += self.history.len();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(tick: Ticks, player: u8, sequence: u32) -> Command {
        Command::new(tick, PlayerId(player), sequence, CommandKind::PurchaseWorker)
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    #[test]
    fn drain_due_keeps_future_commands() {
        let mut queue = CommandQueue::new();
        queue.push_batch([cmd(5, 0, 0), cmd(3, 1, 0), cmd(9, 0, 1)]);
        let due = queue.drain_due(5);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].tick, 5);
        assert_eq!(due[1].tick, 3);
        assert_eq!(queue.pending_count(), 1);

        assert!(queue.drain_due(8).is_empty());
        assert_eq!(queue.drain_due(9).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn history_disabled_by_default() {
        let mut queue = CommandQueue::new();
        queue.record(1, &[cmd(1, 0, 0)]);
        assert!(queue.history().is_empty());
    }

    #[test]
    fn history_trims_oldest() {
        let mut queue = CommandQueue::with_max_history(2);
        queue.record(1, &[cmd(1, 0, 0), cmd(1, 0, 1)]);
        queue.record(2, &[cmd(2, 0, 2)]);
        let seqs: Vec<u32> = queue.history().iter().map(|(_, c)| c.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(!queue.history_complete());

        queue.clear_history();
        assert!(queue.history().is_empty());
    }

    // -----------------------------------------------------------------------
    // Codec
    // -----------------------------------------------------------------------

    #[test]
    fn batch_survives_the_wire() {
        let batch = vec![
            cmd(3, 1, 7),
            Command::new(
                4,
                PlayerId(0),
                1,
                CommandKind::MoveCore {
                    target: Vec2::new(1.5, -2.0),
                },
            ),
            Command::new(4, PlayerId(0), 2, CommandKind::Unknown { tag: 999 }),
        ];
        let bytes = encode_batch(&batch).unwrap();
        assert_eq!(decode_batch(&bytes).unwrap(), batch);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            decode_batch(&[0xFF, 0x00, 0x13]),
            Err(CodecError::Decode(_))
        ));
    }

    /// A kind only a newer build knows.
    #[derive(Serialize)]
    enum NewerKind {
        Emote { id: u32 },
    }

    #[test]
    fn newer_kind_does_not_sink_the_batch() {
        let worker = cmd(6, 0, 0);
        let known = WireCommand {
            tick: 6,
            player: PlayerId(0),
            sequence: 0,
            tag: worker.kind.tag(),
            payload: bitcode::serialize(&worker.kind).unwrap(),
        };
        let emote = WireCommand {
            tick: 6,
            player: PlayerId(1),
            sequence: 3,
            tag: KNOWN_TAGS,
            payload: bitcode::serialize(&NewerKind::Emote { id: 9 }).unwrap(),
        };
        let bytes = bitcode::serialize(&vec![known, emote]).unwrap();

        let decoded = decode_batch(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], worker);
        assert_eq!(
            decoded[1],
            Command::new(6, PlayerId(1), 3, CommandKind::Unknown { tag: KNOWN_TAGS })
        );
    }

    #[test]
    fn mismatched_tag_is_rejected() {
        let wire = vec![WireCommand {
            tick: 1,
            player: PlayerId(0),
            sequence: 0,
            tag: 13,
            payload: bitcode::serialize(&CommandKind::PurchaseWorker).unwrap(),
        }];
        let bytes = bitcode::serialize(&wire).unwrap();
        assert!(matches!(decode_batch(&bytes), Err(CodecError::Decode(_))));
    }

    #[test]
    fn known_tags_are_distinct() {
        let kinds = [
            CommandKind::PurchaseWorker,
            CommandKind::PurchaseMirror,
            CommandKind::MoveCore { target: Vec2::ZERO },
            CommandKind::SetPatrolPath { waypoints: Vec::new() },
            CommandKind::MoveUnits {
                units: Vec::new(),
                target: Vec2::ZERO,
                formation: Formation::Direct,
            },
        ];
        let mut tags: Vec<u16> = kinds.iter().map(CommandKind::tag).collect();
        assert!(tags.iter().all(|t| *t < KNOWN_TAGS));
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), kinds.len());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(CommandKind::PurchaseMirror.name(), "purchase_mirror");
        assert_eq!(CommandKind::Unknown { tag: 1 }.name(), "unknown");
    }
}
