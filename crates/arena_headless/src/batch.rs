//! Batch battle runner for balance testing.
//!
//! Runs one scenario over a range of seeds in parallel using rayon. Every
//! battle is an independent value, so no state is shared between workers
//! besides the read-only catalog and the progress counters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use arena_core::components::PlayerId;
use arena_core::data::UnitCatalog;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{BatchSummary, BattleMetrics};
use crate::runner::BattleRunner;
use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name, for reporting
    pub scenario: String,
    /// Number of battles to run
    pub battle_count: u32,
    /// Maximum parallel battles (0 = use rayon default)
    pub parallel_battles: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Starting seed; battle `i` uses `seed_start + i`
    pub seed_start: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "duel".to_string(),
            battle_count: 100,
            parallel_battles: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, battle_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            battle_count,
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set parallelism
    pub fn with_parallelism(mut self, parallel: u32) -> Self {
        self.parallel_battles = parallel;
        self
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual battle metrics, in seed order
    pub battles: Vec<BattleMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Battle index
    pub battle_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Progress tracking for batch runs
#[derive(Debug)]
pub struct BatchProgress {
    /// Total battles
    pub total: u32,
    /// Completed battles
    pub completed: AtomicU32,
    /// Start time
    pub start_time: Instant,
    partial_wins: Mutex<BTreeMap<PlayerId, u32>>,
}

impl BatchProgress {
    /// Create new progress tracker
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            start_time: Instant::now(),
            partial_wins: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a completed battle
    pub fn record_completion(&self, winner: Option<PlayerId>) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(w) = winner {
            if let Ok(mut wins) = self.partial_wins.lock() {
                *wins.entry(w).or_insert(0) += 1;
            }
        }
    }

    /// Get current completion count
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }

        let elapsed = self.start_time.elapsed();
        let per_battle = elapsed.as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_battle * f64::from(remaining))
    }

    /// Get current win rates
    pub fn current_win_rates(&self) -> BTreeMap<PlayerId, f64> {
        let completed = self.current();
        if completed == 0 {
            return BTreeMap::new();
        }

        if let Ok(wins) = self.partial_wins.lock() {
            wins.iter()
                .map(|(&k, &v)| (k, f64::from(v) / f64::from(completed)))
                .collect()
        } else {
            BTreeMap::new()
        }
    }

    /// Log progress
    pub fn display(&self) {
        let eta = self.eta();
        info!(
            completed = self.current(),
            total = self.total,
            percent = format!("{:.1}", self.percentage()),
            eta = format!("{}m {}s", eta.as_secs() / 60, eta.as_secs() % 60),
            win_rates = ?self.current_win_rates(),
            "Batch progress"
        );
    }
}

fn run_single_battle(
    scenario: &Scenario,
    catalog: &UnitCatalog,
    seed: u64,
) -> Result<BattleMetrics, ScenarioError> {
    let battle = scenario.build_battle_with(catalog, Some(seed))?;
    Ok(BattleRunner::new(&scenario.name, battle).run().metrics)
}

/// Run a batch of battles
///
/// The catalog is resolved once up front; a catalog error fails the whole
/// batch while per-seed errors are collected in [`BatchResults::errors`].
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> Result<BatchResults, ScenarioError> {
    let start = Instant::now();
    let catalog = scenario.load_catalog()?;
    let progress = BatchProgress::new(config.battle_count);

    info!(
        "Starting batch run: {} battles of '{}'",
        config.battle_count, config.scenario
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallel_battles as usize)
        .build()?;

    let results: Vec<Result<BattleMetrics, BatchError>> = pool.install(|| {
        (0..config.battle_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_start.wrapping_add(u64::from(i));
                match run_single_battle(scenario, &catalog, seed) {
                    Ok(metrics) => {
                        progress.record_completion(metrics.winner);

                        let completed = progress.current();
                        if completed % 10 == 0 {
                            debug!("Progress: {}/{}", completed, config.battle_count);
                        }
                        if completed % 100 == 0 {
                            progress.display();
                        }

                        Ok(metrics)
                    }
                    Err(e) => {
                        warn!("Battle {} failed: {}", i, e);
                        Err(BatchError {
                            battle_index: i,
                            seed,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    });

    let (battles, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let battles: Vec<BattleMetrics> = battles.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_battles(&battles);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} battles in {:.1}s ({:.1} battles/sec)",
        battles.len(),
        duration_seconds,
        battles.len() as f64 / duration_seconds.max(f64::EPSILON)
    );

    Ok(BatchResults {
        config,
        battles,
        summary,
        duration_seconds,
        errors,
    })
}

/// Outcome of a determinism check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Seed checked.
    pub seed: u64,
    /// Final state hash of every run.
    pub hashes: Vec<u64>,
    /// First tick at which a run diverged from the first, if any.
    pub first_divergence: Option<u64>,
}

impl VerifyReport {
    /// All runs ended in the same state.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.first_divergence.is_none() && self.hashes.windows(2).all(|w| w[0] == w[1])
    }
}

/// Run the same seed `runs` times in lockstep, comparing state hashes after
/// every tick.
pub fn verify_determinism(
    scenario: &Scenario,
    seed: u64,
    runs: u32,
) -> Result<VerifyReport, ScenarioError> {
    let catalog = scenario.load_catalog()?;
    let mut battles = (0..runs.max(2))
        .map(|_| scenario.build_battle_with(&catalog, Some(seed)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut first_divergence = None;
    while battles.iter().any(|b| !b.is_finished()) {
        let tick = battles[0].current_tick();
        for battle in &mut battles {
            battle.tick();
        }
        let reference = battles[0].state_hash();
        if battles.iter().any(|b| b.state_hash() != reference) {
            warn!(seed, tick, "Runs diverged");
            first_divergence = Some(tick);
            break;
        }
    }

    Ok(VerifyReport {
        seed,
        hashes: battles.iter().map(|b| b.state_hash()).collect(),
        first_divergence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_test_utils::fixtures::TEST_CATALOG_RON;

    fn scenario() -> Scenario {
        let source = format!(
            r#"Scenario(
                name: "duel",
                seed: 5,
                catalog: Inline({TEST_CATALOG_RON}),
                config: (max_duration_ticks: 600),
                towers: Some(TowerLayout(side_tower: "princess_tower", king_tower: "king_tower")),
                setup: (
                    deployments: [
                        (tick: 0, unit: (owner: 0, unit_type: "knight", position: (3.5, 13.0))),
                        (tick: 0, unit: (owner: 1, unit_type: "knight", position: (3.5, 19.0))),
                        (tick: 20, unit: (owner: 1, unit_type: "wizard", position: (4.5, 21.0))),
                    ],
                ),
            )"#
        );
        Scenario::from_ron_str(&source).unwrap()
    }

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.battle_count, 100);
        assert_eq!(config.scenario, "duel");
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("custom_scenario", 500)
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345)
            .with_parallelism(2);

        assert_eq!(config.scenario, "custom_scenario");
        assert_eq!(config.battle_count, 500);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.parallel_battles, 2);
    }

    #[test]
    fn test_progress_tracking() {
        let progress = BatchProgress::new(100);
        assert_eq!(progress.current(), 0);
        assert_eq!(progress.percentage(), 0.0);

        progress.record_completion(Some(0));
        progress.record_completion(Some(1));
        progress.record_completion(Some(0));
        progress.record_completion(None);

        assert_eq!(progress.current(), 4);

        let rates = progress.current_win_rates();
        assert!((rates[&0] - 0.5).abs() < f64::EPSILON);
        assert!((rates[&1] - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_run_batch_small() {
        let results = run_batch(&scenario(), BatchConfig::new("duel", 6).with_parallelism(2)).unwrap();

        assert_eq!(results.battles.len(), 6);
        assert!(results.errors.is_empty());
        assert_eq!(results.summary.total_battles, 6);
        let seeds: Vec<u64> = results.battles.iter().map(|b| b.seed).collect();
        assert_eq!(seeds, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_batch_is_independent_of_parallelism() {
        let serial = run_batch(&scenario(), BatchConfig::new("duel", 4).with_parallelism(1)).unwrap();
        let parallel = run_batch(&scenario(), BatchConfig::new("duel", 4).with_parallelism(4)).unwrap();
        let hashes = |r: &BatchResults| -> Vec<u64> {
            r.battles.iter().map(|b| b.final_state_hash).collect()
        };
        assert_eq!(hashes(&serial), hashes(&parallel));
    }

    #[test]
    fn test_verify_determinism() {
        let report = verify_determinism(&scenario(), 12345, 3).unwrap();
        assert!(report.is_deterministic());
        assert_eq!(report.hashes.len(), 3);
    }

    #[test]
    fn test_batch_results_save_load() {
        let results = run_batch(&scenario(), BatchConfig::new("duel", 3)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.battles.len(), 3);
        assert_eq!(loaded.config.scenario, "duel");
        assert_eq!(loaded.battles[0].final_state_hash, results.battles[0].final_state_hash);
    }
}
