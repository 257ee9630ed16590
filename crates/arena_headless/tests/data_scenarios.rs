//! The scenarios shipped under `data/` load and run.

use std::path::PathBuf;

use arena_headless::batch::verify_determinism;
use arena_headless::runner::{run_scenario, RunOptions};
use arena_headless::scenario::Scenario;

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../data/scenarios")
        .join(name)
}

#[test]
fn test_shipped_scenarios_build() {
    for name in ["duel.ron", "mirror.ron"] {
        let scenario = Scenario::load(scenario_path(name)).unwrap();
        let battle = scenario.build_battle(None).unwrap();
        assert_eq!(battle.world().combatants.len(), 6, "{name}");
    }
}

#[test]
fn test_duel_runs_to_outcome() {
    let scenario = Scenario::load(scenario_path("duel.ron")).unwrap();
    let summary = run_scenario(&scenario, &RunOptions::default()).unwrap();
    assert_eq!(summary.metrics.seed, 42);
    assert!(summary.outcome.tick < scenario.config.max_duration_ticks);
    assert_eq!(summary.metrics.faults, 0);
}

#[test]
fn test_mirror_is_deterministic() {
    let scenario = Scenario::load(scenario_path("mirror.ron")).unwrap();
    let report = verify_determinism(&scenario, 3, 2).unwrap();
    assert!(report.is_deterministic());
}
