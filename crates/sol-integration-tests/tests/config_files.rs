//! Matches started from data files behave exactly like matches built in
//! code, whichever file format they came from.

use fixed::types::I32F32;
use sol_core::config::{Faction, MatchConfig, PlayerSetup};
use sol_core::engine::Engine;
use sol_core::test_utils::run_ticks;
use sol_data::{DataLoadError, load_match_config, load_match_dir};
use std::fs;
use std::path::{Path, PathBuf};

fn make_test_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "sol_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = fs::remove_dir_all(dir);
}

const RON: &str = r#"(
    seed: Some(31337),
    players: [
        (name: "alpha", faction: Solari, team: 0),
        (name: "beta", faction: Aurum, team: 1, ai: true),
    ],
    world: (asteroid_count: 5),
    tuning: (starting_energy: 180.0),
)"#;

const TOML: &str = r#"
seed = 31337

[[players]]
name = "alpha"
faction = "Solari"
team = 0

[[players]]
name = "beta"
faction = "Aurum"
team = 1
ai = true

[world]
asteroid_count = 5

[tuning]
starting_energy = 180.0
"#;

const JSON: &str = r#"{
    "seed": 31337,
    "players": [
        { "name": "alpha", "faction": "Solari", "team": 0 },
        { "name": "beta", "faction": "Aurum", "team": 1, "ai": true }
    ],
    "world": { "asteroid_count": 5 },
    "tuning": { "starting_energy": 180.0 }
}"#;

fn in_code() -> MatchConfig {
    let mut alpha = PlayerSetup::human("alpha", 0);
    alpha.faction = Faction::Solari;
    let mut beta = PlayerSetup::ai("beta", 1);
    beta.faction = Faction::Aurum;
    let mut config = MatchConfig::new(31337, vec![alpha, beta]);
    config.world.asteroid_count = 5;
    config.tuning.starting_energy = 180.0;
    config
}

#[test]
fn every_format_yields_the_same_match() {
    let dir = make_test_dir("formats");
    let reference = in_code();

    let mut hashes = Vec::new();
    for (name, body) in [("m.ron", RON), ("m.toml", TOML), ("m.json", JSON)] {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let config = load_match_config(&path).unwrap();
        assert_eq!(config, reference, "{name}");

        let mut engine = Engine::new(config).unwrap();
        assert_eq!(engine.players[0].energy, I32F32::from_num(180));
        run_ticks(&mut engine, 400);
        hashes.push(engine.state_hash());
    }

    let mut engine = Engine::new(reference).unwrap();
    run_ticks(&mut engine, 400);
    assert!(hashes.iter().all(|h| *h == engine.state_hash()));
    cleanup(&dir);
}

#[test]
fn directory_with_tuning_override() {
    let dir = make_test_dir("override");
    fs::write(dir.join("match.json"), JSON).unwrap();
    fs::write(
        dir.join("tuning.ron"),
        "(starting_energy: 60.0, starting_workers: 0, countdown_seconds: 0.0)",
    )
    .unwrap();

    let config = load_match_dir(&dir).unwrap();
    let engine = Engine::new(config).unwrap();
    assert_eq!(engine.players[1].energy, I32F32::from_num(60));
    assert_eq!(engine.unit_count(), 0);
    assert!(!engine.sim_state.in_countdown());
    cleanup(&dir);
}

#[test]
fn single_team_roster_is_rejected_before_the_match() {
    let dir = make_test_dir("oneteam");
    let path = dir.join("match.toml");
    fs::write(
        &path,
        "seed = 1\n[[players]]\nname = \"a\"\nteam = 2\n[[players]]\nname = \"b\"\nteam = 2\n",
    )
    .unwrap();

    let err = load_match_config(&path).unwrap_err();
    assert!(matches!(err, DataLoadError::Invalid { .. }));
    assert!(err.to_string().contains("team 2"));
    cleanup(&dir);
}
