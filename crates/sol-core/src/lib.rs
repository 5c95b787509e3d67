//! Sol Core -- the deterministic lockstep simulation kernel for a 2D
//! real-time strategy game built around light.
//!
//! Players spend solar energy, collected by mirrors that reflect sunlight
//! onto their core and buildings, to field units and structures. Every peer
//! runs the same engine from the same seed and the same ordered command
//! stream, and checkpoints a rolling state hash so divergence is caught.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::Engine::step`] advances the simulation by one tick:
//!
//! 1. **Commands** -- Apply every buffered command that is due, in a
//!    deterministic order.
//! 2. **Countdown** -- Deploy starting mirrors; the match is not live until
//!    the countdown ends.
//! 3. **Environment** -- Orbit suns, spin asteroids, rebuild occluders.
//! 4. **Knockback** -- Push bodies out of rotating asteroids.
//! 5. **AI** -- Plan commands for AI players.
//! 6. **Players** -- Mirrors, targets, core, buildings and units, player by
//!    player, then production is realized.
//! 7. **Collision** -- Separate units and push them off obstacles; drift dust.
//! 8. **Effects** -- Resolve projectiles, beams and reveals.
//! 9. **Bookkeeping** -- Prune the dead, advance the clock, checkpoint.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns all state and orchestrates the pipeline.
//! - [`command::Command`] -- The one vocabulary for humans, peers and AI.
//! - [`config::MatchConfig`] -- Seed, roster, world generation and tuning.
//! - [`lockstep::CommandTransport`] -- The seam a network session implements.
//! - [`sim::HashAccumulator`] -- Rolling checkpoint hashes for desync checks.
//! - [`replay::ReplayLog`] -- Config plus applied commands, enough to
//!   reproduce a match bit for bit.

pub mod ai;
pub mod collision;
pub mod combat;
pub mod command;
pub mod config;
pub mod effects;
pub mod energy;
pub mod engine;
pub mod entity;
pub mod event;
pub mod fixed;
pub mod id;
pub mod lockstep;
pub mod math;
pub mod player;
pub mod production;
pub mod query;
pub mod replay;
pub mod rng;
pub mod router;
pub mod sim;
pub mod spatial;
pub mod structures;
pub mod validation;
pub mod visibility;
pub mod world;
pub mod world_gen;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
