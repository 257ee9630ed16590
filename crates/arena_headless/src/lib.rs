//! Headless battle runner for balance testing and CI verification.
//!
//! Battles are described by RON scenario files and run without any
//! front end. This enables:
//!
//! - **Balance testing**: run one scenario over many seeds in parallel and
//!   aggregate win rates, durations and damage
//! - **CI verification**: check that identical seeds produce identical
//!   state hashes on every tick
//! - **Pacing checks**: run a battle against the wall clock and report drift
//!
//! # Example
//!
//! ```bash
//! # Run one battle and print a JSON summary
//! cargo run -p arena_headless -- run --scenario data/scenarios/duel.ron
//!
//! # Run 1000 seeds in parallel
//! cargo run -p arena_headless -- batch --scenario data/scenarios/duel.ron --count 1000
//!
//! # Verify determinism
//! cargo run -p arena_headless -- verify --scenario data/scenarios/duel.ron --runs 5
//! ```

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, VerifyReport};
pub use metrics::{BatchSummary, BattleMetrics, MetricsCollector, PlayerMetrics};
pub use runner::{run_scenario, BattleRunner, RunOptions, RunSummary};
pub use scenario::{CatalogSource, Scenario, ScenarioError, TowerLayout};
