//! Lockstep session walkthrough: two peers, one shared command stream.
//!
//! Each peer runs its own engine. Commands issued on one peer travel
//! through an in-memory transport to the other, both engines apply them on
//! the same tick, and checkpoint hashes are cross-checked with a
//! `DesyncMonitor`. At the end one peer is tampered with to show how a
//! divergence is reported.
//!
//! Run with: `RUST_LOG=debug cargo run -p sol-core --example lockstep_demo --features test-utils`

use sol_core::command::{Command, CommandKind, Formation};
use sol_core::config::{MatchConfig, PlayerSetup};
use sol_core::engine::Engine;
use sol_core::id::PlayerId;
use sol_core::lockstep::{CommandTransport, DesyncMonitor};
use sol_core::math::Vec2;
use sol_core::validation::quick_compare;
use tracing_subscriber::EnvFilter;

/// Outbound mailbox for one peer.
struct Mailbox {
    player: PlayerId,
    outbox: Vec<Command>,
}

impl CommandTransport for Mailbox {
    fn local_player(&self) -> PlayerId {
        self.player
    }

    fn send_command(&mut self, command: &Command) {
        self.outbox.push(command.clone());
    }
}

struct Peer {
    engine: Engine,
    mailbox: Mailbox,
    monitor: DesyncMonitor,
}

impl Peer {
    fn new(config: &MatchConfig, player: u8) -> Self {
        Self {
            engine: Engine::new(config.clone()).expect("valid config"),
            mailbox: Mailbox {
                player: PlayerId(player),
                outbox: Vec::new(),
            },
            monitor: DesyncMonitor::new(),
        }
    }

    fn issue(&mut self, kind: CommandKind) {
        let cmd = self.engine.issue_command(&mut self.mailbox, kind);
        println!("  {} issues {} for tick {}", cmd.player, cmd.kind.name(), cmd.tick);
    }
}

/// Deliver each peer's outbox to the other and step both once.
fn exchange_and_step(a: &mut Peer, b: &mut Peer) {
    let from_a = std::mem::take(&mut a.mailbox.outbox);
    let from_b = std::mem::take(&mut b.mailbox.outbox);
    b.engine.deliver_command_batch(from_a);
    a.engine.deliver_command_batch(from_b);
    a.engine.step();
    b.engine.step();

    let tick = a.engine.tick();
    let (Some(ha), Some(hb)) = (a.engine.checkpoint(tick), b.engine.checkpoint(tick)) else {
        return;
    };
    for (peer, local, remote) in [(&mut *a, ha, hb), (&mut *b, hb, ha)] {
        let other = PlayerId(1 - peer.mailbox.player.0);
        if let Err(e) = peer
            .monitor
            .record_local(tick, local)
            .and_then(|()| peer.monitor.record_remote(other, tick, remote))
        {
            println!("  {e}");
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = MatchConfig::new(
        2024,
        vec![PlayerSetup::human("alpha", 0), PlayerSetup::human("beta", 1)],
    );
    let mut alpha = Peer::new(&config, 0);
    let mut beta = Peer::new(&config, 1);

    // --- Step 1: Countdown and opening orders ---

    println!("Opening:");
    alpha.issue(CommandKind::PurchaseWorker);
    beta.issue(CommandKind::PurchaseMirror);
    for _ in 0..240 {
        exchange_and_step(&mut alpha, &mut beta);
    }

    let workers: Vec<_> = alpha
        .engine
        .snapshot_units()
        .into_iter()
        .filter(|u| u.owner == PlayerId(0))
        .map(|u| u.id)
        .collect();
    alpha.issue(CommandKind::MoveUnits {
        units: workers,
        target: Vec2::new(-300.0, 150.0),
        formation: Formation::Spread,
    });
    for _ in 0..360 {
        exchange_and_step(&mut alpha, &mut beta);
    }

    println!(
        "After {} ticks: alpha {:08x}, beta {:08x}, {} checkpoints verified",
        alpha.engine.tick(),
        alpha.engine.state_hash(),
        beta.engine.state_hash(),
        alpha.monitor.verified_count(),
    );

    // --- Step 2: Tamper with one peer ---

    println!("\nTampering with beta's core health:");
    let core = beta.engine.players[0].core.expect("core alive");
    beta.engine.world.cores[core].health -= 1.0;
    let diff = quick_compare(&alpha.engine, &beta.engine);
    println!("  structures match: {}", diff.structures_match);
    for _ in 0..30 {
        exchange_and_step(&mut alpha, &mut beta);
    }
}
