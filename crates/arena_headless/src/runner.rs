//! Single battle execution.
//!
//! Battles normally run as fast as the CPU allows. With realtime pacing the
//! loop sleeps until each tick's wall-clock slot and feeds lateness into a
//! [`DriftTracker`].

use std::time::{Duration, Instant};

use arena_core::pacing::{DriftPolicy, DriftReport, DriftTracker};
use arena_core::scheduler::{Battle, BattleOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{BattleMetrics, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};

/// Options for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Seed override; the scenario seed is used otherwise.
    pub seed: Option<u64>,
    /// Pace ticks against the wall clock under this policy.
    pub realtime: Option<DriftPolicy>,
}

/// Everything reported about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// How the battle ended.
    pub outcome: BattleOutcome,
    /// Collected metrics.
    pub metrics: BattleMetrics,
    /// Pacing quality, for realtime runs.
    pub drift: Option<DriftReport>,
    /// Wall-clock duration of the run in milliseconds.
    pub wall_time_ms: u64,
}

/// Drives one battle to its outcome.
#[derive(Debug)]
pub struct BattleRunner {
    battle: Battle,
    collector: MetricsCollector,
    pacing: Option<DriftTracker>,
}

impl BattleRunner {
    /// Wrap a freshly built battle.
    #[must_use]
    pub fn new(scenario: &str, battle: Battle) -> Self {
        let collector = MetricsCollector::new(scenario, &battle);
        Self {
            battle,
            collector,
            pacing: None,
        }
    }

    /// Pace ticks against the wall clock.
    #[must_use]
    pub fn with_realtime(mut self, policy: DriftPolicy) -> Self {
        let budget = Duration::from_millis(u64::from(self.battle.config().tick_duration_ms()));
        self.pacing = Some(DriftTracker::new(policy, budget));
        self
    }

    /// The battle being run.
    #[must_use]
    pub fn battle(&self) -> &Battle {
        &self.battle
    }

    /// Run to the outcome.
    pub fn run(mut self) -> RunSummary {
        let started = Instant::now();
        let (outcome, drift) = match self.pacing.take() {
            Some(tracker) => self.run_paced(tracker, started),
            None => self.run_unpaced(),
        };

        let wall_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            seed = self.battle.seed(),
            winner = ?outcome.winner,
            reason = ?outcome.reason,
            ticks = outcome.tick + 1,
            wall_time_ms,
            "Battle finished"
        );
        let metrics = self.collector.finish(&outcome, &self.battle);
        RunSummary {
            outcome,
            metrics,
            drift,
            wall_time_ms,
        }
    }

    fn run_unpaced(&mut self) -> (BattleOutcome, Option<DriftReport>) {
        loop {
            if let Some(outcome) = self.step() {
                return (outcome, None);
            }
        }
    }

    fn run_paced(
        &mut self,
        mut tracker: DriftTracker,
        started: Instant,
    ) -> (BattleOutcome, Option<DriftReport>) {
        let budget = tracker.budget();
        let mut slot: u32 = 0;
        loop {
            let scheduled = started + budget * slot;
            let now = Instant::now();
            if now < scheduled {
                std::thread::sleep(scheduled - now);
            }
            let begin = Instant::now();
            let lateness = begin.saturating_duration_since(scheduled);

            let outcome = self.step();
            let missed = tracker.record_tick(lateness, begin.elapsed());
            if missed > 0 {
                warn!(
                    tick = self.battle.current_tick(),
                    missed, "Tick started late, skipping slots"
                );
            }
            if let Some(outcome) = outcome {
                return (outcome, Some(tracker.report()));
            }
            slot = slot
                .saturating_add(1)
                .saturating_add(u32::try_from(missed).unwrap_or(u32::MAX));
        }
    }

    fn step(&mut self) -> Option<BattleOutcome> {
        let report = self.battle.tick();
        self.collector.observe(&report, &self.battle);
        if !report.faults.is_empty() {
            debug!(tick = report.tick, faults = report.faults.len(), "Tick had faults");
        }
        report.outcome
    }
}

/// Build the battle described by `scenario` and run it.
pub fn run_scenario(scenario: &Scenario, options: &RunOptions) -> Result<RunSummary, ScenarioError> {
    let battle = scenario.build_battle(options.seed)?;
    let mut runner = BattleRunner::new(&scenario.name, battle);
    if let Some(policy) = options.realtime {
        runner = runner.with_realtime(policy);
    }
    Ok(runner.run())
}
