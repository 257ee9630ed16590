//! Async battle hosting.
//!
//! [`BattleHost::run`] consumes [`MatchedPair`]s from a channel and runs
//! each as an independent task. A battle task owns its [`Battle`] outright;
//! the only shared state is the semaphore capping concurrency and the
//! cancellation switches held by [`HostHandle`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_core::config::BattleConfig;
use arena_core::data::UnitCatalog;
use arena_core::error::GameError;
use arena_core::pacing::{DriftPolicy, DriftReport, DriftTracker};
use arena_core::scheduler::{Battle, BattleOutcome};
use arena_core::setup::BattleSetup;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ServerConfig;

/// Unpaced battles yield to the runtime this often.
const UNPACED_YIELD_TICKS: u64 = 256;

/// Error type for the battle host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Battle construction or configuration failed.
    #[error("Battle error: {0}")]
    Game(#[from] GameError),
    /// Server configuration is invalid.
    #[error("Invalid server configuration: {0}")]
    Config(String),
    /// File access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// RON parsing failed.
    #[error("Failed to parse RON: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// A battle with this match id is already running.
    #[error("Match {0} is already running")]
    DuplicateMatch(u64),
    /// The host stopped accepting battles.
    #[error("Host is shutting down")]
    ShuttingDown,
}

/// Two players matched into one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    /// Caller-assigned id, unique among running battles.
    pub match_id: u64,
    /// Battle seed.
    pub seed: u64,
    /// Units of both players, placed after the host's towers.
    #[serde(default)]
    pub setup: BattleSetup,
}

/// Emitted once per finished battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleReport {
    /// Match the battle belonged to.
    pub match_id: u64,
    /// Seed used.
    pub seed: u64,
    /// How the battle ended.
    pub outcome: BattleOutcome,
    /// Ticks processed.
    pub ticks: u64,
    /// Combatants that died.
    pub deaths: u64,
    /// Per-entity faults logged.
    pub faults: u64,
    /// Pacing quality; absent for unpaced battles.
    pub drift: Option<DriftReport>,
    /// Final state hash.
    pub final_state_hash: u64,
}

/// Cloneable control surface of a running host.
#[derive(Debug, Clone, Default)]
pub struct HostHandle {
    cancels: Arc<Mutex<BTreeMap<u64, watch::Sender<bool>>>>,
}

impl HostHandle {
    /// Ask a running battle to end. Returns whether the match was found.
    pub fn cancel(&self, match_id: u64) -> bool {
        let Ok(cancels) = self.cancels.lock() else {
            return false;
        };
        match cancels.get(&match_id) {
            Some(switch) => {
                info!(match_id, "Cancelling battle");
                switch.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Cancel every running battle. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let Ok(cancels) = self.cancels.lock() else {
            return 0;
        };
        for switch in cancels.values() {
            switch.send_replace(true);
        }
        cancels.len()
    }

    /// Battles currently running.
    pub fn running(&self) -> usize {
        self.cancels.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn register(&self, match_id: u64) -> Result<watch::Receiver<bool>, HostError> {
        let mut cancels = self.cancels.lock().map_err(|_| HostError::ShuttingDown)?;
        if cancels.contains_key(&match_id) {
            return Err(HostError::DuplicateMatch(match_id));
        }
        let (switch, receiver) = watch::channel(false);
        cancels.insert(match_id, switch);
        Ok(receiver)
    }

    fn release(&self, match_id: u64) {
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.remove(&match_id);
        }
    }
}

/// Runs matched battles as paced tasks.
#[derive(Debug)]
pub struct BattleHost {
    config: ServerConfig,
    battle_config: BattleConfig,
    catalog: Arc<UnitCatalog>,
    permits: Arc<Semaphore>,
    handle: HostHandle,
}

impl BattleHost {
    /// Create a host. Both configurations are validated here.
    pub fn new(
        config: ServerConfig,
        battle_config: BattleConfig,
        catalog: UnitCatalog,
    ) -> Result<Self, HostError> {
        config.validate()?;
        battle_config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_battles)),
            config,
            battle_config,
            catalog: Arc::new(catalog),
            handle: HostHandle::default(),
        })
    }

    /// Create a host from the files named in `config`.
    pub fn from_files(config: ServerConfig) -> Result<Self, HostError> {
        let catalog_path = config.catalog_path.display().to_string();
        let source = std::fs::read_to_string(&config.catalog_path)?;
        let catalog = UnitCatalog::from_ron_str(&source, &catalog_path)?;

        let battle_config = match &config.battle_config_path {
            Some(path) => {
                let source = std::fs::read_to_string(path)?;
                BattleConfig::from_ron_str(&source, &path.display().to_string())?
            }
            None => BattleConfig::default(),
        };

        info!(
            units = catalog.len(),
            tick_rate = battle_config.tick_rate,
            max_concurrent = config.max_concurrent_battles,
            "Battle host configured"
        );
        Self::new(config, battle_config, catalog)
    }

    /// Control handle, usable while [`BattleHost::run`] is running.
    #[must_use]
    pub fn handle(&self) -> HostHandle {
        self.handle.clone()
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the battle for one pair.
    pub fn build_battle(&self, pair: &MatchedPair) -> Result<Battle, HostError> {
        let mut setup = match &self.config.towers {
            Some(towers) => {
                BattleSetup::standard_arena(&towers.side_tower, &towers.king_tower, towers.level)
            }
            None => BattleSetup::default(),
        };
        setup.placements.extend(pair.setup.placements.iter().cloned());
        setup.deployments.extend(pair.setup.deployments.iter().cloned());
        Ok(Battle::from_setup(
            self.battle_config.clone(),
            &self.catalog,
            &setup,
            pair.seed,
        )?)
    }

    /// Host battles until `pairs` closes, then wait for running battles.
    ///
    /// Pairs that fail to build are logged and skipped. Each finished
    /// battle sends one [`BattleReport`]; a dropped report receiver does
    /// not stop the battles.
    pub async fn run(
        self,
        mut pairs: mpsc::Receiver<MatchedPair>,
        reports: mpsc::Sender<BattleReport>,
    ) -> Result<(), HostError> {
        let pacing = self.config.paced.then_some(self.config.drift_policy);

        while let Some(pair) = pairs.recv().await {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| HostError::ShuttingDown)?;

            let battle = match self.build_battle(&pair) {
                Ok(battle) => battle,
                Err(e) => {
                    warn!(match_id = pair.match_id, error = %e, "Rejected matched pair");
                    continue;
                }
            };
            let cancel = match self.handle.register(pair.match_id) {
                Ok(cancel) => cancel,
                Err(e) => {
                    warn!(match_id = pair.match_id, error = %e, "Rejected matched pair");
                    continue;
                }
            };

            let handle = self.handle.clone();
            let reports = reports.clone();
            let match_id = pair.match_id;
            tokio::spawn(async move {
                let report = run_battle(match_id, battle, pacing, cancel).await;
                handle.release(match_id);
                drop(permit);
                if reports.send(report).await.is_err() {
                    debug!(match_id, "Report receiver dropped");
                }
            });
        }

        // Every permit back means every battle task has finished.
        let total = u32::try_from(self.config.max_concurrent_battles).unwrap_or(u32::MAX);
        let _all = self
            .permits
            .acquire_many(total)
            .await
            .map_err(|_| HostError::ShuttingDown)?;
        info!("Battle host drained");
        Ok(())
    }
}

struct Pacer {
    interval: Interval,
    tracker: DriftTracker,
}

impl Pacer {
    fn new(policy: DriftPolicy, budget: Duration) -> Self {
        let mut interval = tokio::time::interval(budget);
        interval.set_missed_tick_behavior(match policy {
            DriftPolicy::AcceptDrift => MissedTickBehavior::Burst,
            DriftPolicy::SkipToPreservePacing => MissedTickBehavior::Skip,
        });
        Self {
            interval,
            tracker: DriftTracker::new(policy, budget),
        }
    }
}

/// Run one battle to its outcome on the current task.
pub async fn run_battle(
    match_id: u64,
    mut battle: Battle,
    pacing: Option<DriftPolicy>,
    cancel: watch::Receiver<bool>,
) -> BattleReport {
    let budget = Duration::from_millis(u64::from(battle.config().tick_duration_ms()));
    let mut pacer = pacing.map(|policy| Pacer::new(policy, budget));
    let mut deaths = 0u64;
    let mut faults = 0u64;

    info!(match_id, seed = battle.seed(), paced = pacer.is_some(), "Battle started");
    let outcome = loop {
        let scheduled = match pacer.as_mut() {
            Some(pacer) => Some(pacer.interval.tick().await),
            None => None,
        };
        let begin = Instant::now();

        if *cancel.borrow() {
            battle.cancel();
        }
        let report = battle.tick();
        deaths += report.deaths.len() as u64;
        faults += report.faults.len() as u64;

        match (pacer.as_mut(), scheduled) {
            (Some(pacer), Some(scheduled)) => {
                let lateness = begin.saturating_duration_since(scheduled);
                let missed = pacer.tracker.record_tick(lateness, begin.elapsed());
                if missed > 0 {
                    debug!(match_id, tick = report.tick, missed, "Late tick");
                }
            }
            _ => {
                if report.tick % UNPACED_YIELD_TICKS == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }

        if let Some(outcome) = report.outcome {
            break outcome;
        }
    };

    let drift = pacer.map(|pacer| pacer.tracker.report());
    if let Some(drift) = &drift {
        if drift.late_ticks > 0 {
            warn!(
                match_id,
                late_ticks = drift.late_ticks,
                max_lateness_us = drift.max_lateness_us,
                "Battle fell behind its tick rate"
            );
        }
    }
    info!(
        match_id,
        winner = ?outcome.winner,
        reason = ?outcome.reason,
        tick = outcome.tick,
        "Battle finished"
    );

    BattleReport {
        match_id,
        seed: battle.seed(),
        ticks: battle.current_tick(),
        outcome,
        deaths,
        faults,
        drift,
        final_state_hash: battle.state_hash(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::scheduler::OutcomeReason;
    use arena_core::setup::Placement;
    use arena_test_utils::fixtures::{duel_setup, test_catalog, tile};

    fn host(paced: bool, battle_config: BattleConfig) -> BattleHost {
        let config = ServerConfig {
            max_concurrent_battles: 4,
            paced,
            towers: None,
            battle_config_path: None,
            ..ServerConfig::default()
        };
        BattleHost::new(config, battle_config, test_catalog()).unwrap()
    }

    fn pair(match_id: u64, seed: u64) -> MatchedPair {
        MatchedPair {
            match_id,
            seed,
            setup: duel_setup(),
        }
    }

    async fn collect(host: BattleHost, pairs: Vec<MatchedPair>) -> Vec<BattleReport> {
        let (pair_tx, pair_rx) = mpsc::channel(8);
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let running = tokio::spawn(host.run(pair_rx, report_tx));
        for pair in pairs {
            pair_tx.send(pair).await.unwrap();
        }
        drop(pair_tx);
        running.await.unwrap().unwrap();

        let mut reports = Vec::new();
        while let Some(report) = report_rx.recv().await {
            reports.push(report);
        }
        reports.sort_by_key(|r| r.match_id);
        reports
    }

    #[tokio::test]
    async fn test_hosts_pair_to_report() {
        let reports = collect(host(false, BattleConfig::default()), vec![pair(1, 5)]).await;
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.match_id, 1);
        assert_eq!(report.seed, 5);
        assert_eq!(report.ticks, report.outcome.tick + 1);
        assert!(report.drift.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_battles_are_independent() {
        let pairs = (1..=4).map(|id| pair(id, 99)).collect();
        let reports = collect(host(false, BattleConfig::default()), pairs).await;
        assert_eq!(reports.len(), 4);
        for report in &reports[1..] {
            assert_eq!(report.final_state_hash, reports[0].final_state_hash);
            assert_eq!(report.outcome, reports[0].outcome);
        }
    }

    #[tokio::test]
    async fn test_invalid_pair_is_skipped() {
        let mut bad = pair(2, 1);
        bad.setup = bad
            .setup
            .with_deployment(0, Placement::new(0, "dragon", 1, tile(9.0, 9.0)));
        let reports = collect(host(false, BattleConfig::default()), vec![bad, pair(3, 1)]).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].match_id, 3);
    }

    #[tokio::test]
    async fn test_paced_battle_tracks_drift() {
        let config = BattleConfig {
            tick_rate: 1000,
            max_duration_ticks: 10,
            ..BattleConfig::default()
        };
        let reports = collect(host(true, config), vec![pair(7, 1)]).await;
        let report = &reports[0];
        assert_eq!(report.outcome.reason, OutcomeReason::Timeout);
        assert_eq!(report.drift.unwrap().ticks, 10);
    }

    #[tokio::test]
    async fn test_cancel_running_battle() {
        let host = host(true, BattleConfig::default());
        let handle = host.handle();
        let (pair_tx, pair_rx) = mpsc::channel(1);
        let (report_tx, mut report_rx) = mpsc::channel(1);
        let running = tokio::spawn(host.run(pair_rx, report_tx));

        pair_tx.send(pair(11, 3)).await.unwrap();
        while handle.running() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.cancel(11));
        assert!(!handle.cancel(12));

        let report = report_rx.recv().await.unwrap();
        assert_eq!(report.outcome.reason, OutcomeReason::Cancelled);
        assert_eq!(report.outcome.winner, None);

        drop(pair_tx);
        running.await.unwrap().unwrap();
        assert_eq!(handle.running(), 0);
    }

    #[test]
    fn test_duplicate_match_id_rejected() {
        let handle = HostHandle::default();
        let _first = handle.register(4).unwrap();
        assert!(matches!(handle.register(4), Err(HostError::DuplicateMatch(4))));
        handle.release(4);
        assert!(handle.register(4).is_ok());
    }
}
