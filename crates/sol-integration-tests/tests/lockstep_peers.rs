//! Two-peer lockstep runs over a simulated network.
//!
//! Each peer owns an engine. Commands travel as encoded batches with a
//! seeded per-message latency and arrive in arbitrary order. As long as
//! every message lands within the input delay, both peers must agree on
//! every checkpoint.

use sol_core::command::{Command, CommandKind, Formation, decode_batch, encode_batch};
use sol_core::config::{MatchConfig, PlayerSetup};
use sol_core::engine::Engine;
use sol_core::fixed::Ticks;
use sol_core::id::PlayerId;
use sol_core::lockstep::{CommandTransport, DesyncError, DesyncMonitor};
use sol_core::math::Vec2;
use sol_core::rng::SimRng;
use sol_core::validation::diff_engines;

// ===========================================================================
// Simulated network
// ===========================================================================

/// Encodes each sent command into a wire packet.
struct WireTransport {
    player: PlayerId,
    outgoing: Vec<Vec<u8>>,
}

impl CommandTransport for WireTransport {
    fn local_player(&self) -> PlayerId {
        self.player
    }

    fn send_command(&mut self, command: &Command) {
        let packet = encode_batch(std::slice::from_ref(command)).unwrap();
        self.outgoing.push(packet);
    }
}

struct Peer {
    engine: Engine,
    transport: WireTransport,
    /// Packets in flight toward this peer, with their arrival tick.
    inbox: Vec<(Ticks, Vec<u8>)>,
    monitor: DesyncMonitor,
}

impl Peer {
    fn new(config: &MatchConfig, player: u8) -> Self {
        Self {
            engine: Engine::new(config.clone()).unwrap(),
            transport: WireTransport {
                player: PlayerId(player),
                outgoing: Vec::new(),
            },
            inbox: Vec::new(),
            monitor: DesyncMonitor::new(),
        }
    }

    fn issue(&mut self, kind: CommandKind) -> Command {
        self.engine.issue_command(&mut self.transport, kind)
    }

    /// Deliver every packet due by the current tick, newest first.
    fn receive(&mut self) {
        let now = self.engine.tick();
        let (mut due, later): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.inbox).into_iter().partition(|(at, _)| *at <= now);
        self.inbox = later;
        due.reverse();
        for (_, packet) in due {
            self.engine.deliver_command_batch(decode_batch(&packet).unwrap());
        }
    }
}

struct Session {
    peers: [Peer; 2],
    latency: SimRng,
    min_latency: u32,
    max_latency: u32,
    desyncs: Vec<DesyncError>,
}

impl Session {
    fn new(config: &MatchConfig, min_latency: u32, max_latency: u32) -> Self {
        Self {
            peers: [Peer::new(config, 0), Peer::new(config, 1)],
            latency: SimRng::new(0xfeed),
            min_latency,
            max_latency,
            desyncs: Vec::new(),
        }
    }

    fn step(&mut self) {
        for from in 0..2 {
            let to = 1 - from;
            let now = self.peers[from].engine.tick();
            for packet in std::mem::take(&mut self.peers[from].transport.outgoing) {
                let jitter = self.latency.below(self.max_latency - self.min_latency + 1);
                let arrival = now + u64::from(self.min_latency + jitter);
                self.peers[to].inbox.push((arrival, packet));
            }
        }
        for peer in &mut self.peers {
            peer.receive();
            peer.engine.step();
        }

        let tick = self.peers[0].engine.tick();
        let (Some(h0), Some(h1)) = (
            self.peers[0].engine.checkpoint(tick),
            self.peers[1].engine.checkpoint(tick),
        ) else {
            return;
        };
        for (index, local, remote) in [(0usize, h0, h1), (1, h1, h0)] {
            let other = PlayerId(1 - index as u8);
            let monitor = &mut self.peers[index].monitor;
            if let Err(e) = monitor.record_local(tick, local) {
                self.desyncs.push(e);
            }
            if let Err(e) = monitor.record_remote(other, tick, remote) {
                self.desyncs.push(e);
            }
        }
    }

    fn run(&mut self, ticks: Ticks) {
        for _ in 0..ticks {
            self.step();
        }
    }
}

fn duel() -> MatchConfig {
    let mut config = MatchConfig::new(
        4242,
        vec![PlayerSetup::human("alpha", 0), PlayerSetup::human("beta", 1)],
    );
    config.world.asteroid_count = 8;
    config
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn peers_agree_with_jittered_delivery() {
    let config = duel();
    let delay = config.tuning.input_delay_ticks as u32;
    let mut session = Session::new(&config, 0, delay - 1);

    session.peers[0].issue(CommandKind::PurchaseWorker);
    session.peers[1].issue(CommandKind::PurchaseWorker);
    session.peers[1].issue(CommandKind::PurchaseMirror);
    session.run(200);

    let units: Vec<_> = session.peers[0]
        .engine
        .snapshot_units()
        .into_iter()
        .filter(|u| u.owner == PlayerId(0))
        .map(|u| u.id)
        .collect();
    assert!(!units.is_empty());
    session.peers[0].issue(CommandKind::MoveUnits {
        units,
        target: Vec2::new(-250.0, 200.0),
        formation: Formation::Spread,
    });
    session.peers[1].issue(CommandKind::MoveCore {
        target: Vec2::new(450.0, -60.0),
    });
    session.peers[1].issue(CommandKind::SetPatrolPath {
        waypoints: vec![Vec2::new(0.0, 300.0), Vec2::new(0.0, -300.0)],
    });
    session.run(400);

    assert!(session.desyncs.is_empty(), "{:?}", session.desyncs);
    let [a, b] = &session.peers;
    assert_eq!(a.engine.tick(), 600);
    assert_eq!(a.engine.state_hash(), b.engine.state_hash());
    assert_eq!(a.monitor.verified_count(), 20);
    assert!(diff_engines(&a.engine, &b.engine).is_identical);
    assert_eq!(a.engine.command_history(), b.engine.command_history());
}

#[test]
fn late_delivery_is_detected() {
    let mut config = duel();
    config.tuning.countdown_seconds = 0.0;
    let delay = config.tuning.input_delay_ticks as u32;
    let mut session = Session::new(&config, delay + 2, delay + 8);

    for i in 0..5 {
        session.peers[1].issue(CommandKind::MoveCore {
            target: Vec2::new(500.0, 100.0 + 50.0 * i as f32),
        });
        session.run(6);
    }
    session.run(60);

    assert!(!session.desyncs.is_empty());
    let DesyncError::Mismatch { tick, .. } = session.desyncs[0];
    assert_eq!(tick % config.tuning.hash_interval_ticks, 0);
}

#[test]
fn ai_peers_need_no_traffic() {
    let mut config = duel();
    config.players = vec![PlayerSetup::ai("north", 0), PlayerSetup::ai("south", 1)];
    let mut session = Session::new(&config, 0, 0);
    session.run(1200);

    assert!(session.desyncs.is_empty());
    assert!(session.peers.iter().all(|p| p.transport.outgoing.is_empty()));
    assert_eq!(
        session.peers[0].engine.compute_state_hash(),
        session.peers[1].engine.compute_state_hash()
    );
}
