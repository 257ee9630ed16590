//! Battle metrics collection for balance analysis.

use std::collections::BTreeMap;

use arena_core::components::{EntityId, PlayerId};
use arena_core::scheduler::{Battle, BattleOutcome, OutcomeReason, TickReport};
use serde::{Deserialize, Serialize};

/// Complete metrics for a single battle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BattleMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Ticks simulated until the outcome.
    pub duration_ticks: u64,
    /// Winning player, if any.
    pub winner: Option<PlayerId>,
    /// How the battle ended.
    pub reason: Option<OutcomeReason>,
    /// Crowns earned per player.
    pub crowns: BTreeMap<PlayerId, u32>,
    /// Per-player statistics.
    pub players: BTreeMap<PlayerId, PlayerMetrics>,
    /// Attacks resolved, including projectile impacts.
    pub attacks_resolved: u64,
    /// Projectiles that lost their target in flight.
    pub orphaned_projectiles: u64,
    /// Highest number of projectiles deferred in one tick.
    pub peak_deferred_projectiles: usize,
    /// Per-entity faults logged during the battle.
    pub faults: u32,
    /// Final state hash for determinism checks.
    pub final_state_hash: u64,
}

/// Statistics for one player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMetrics {
    /// Combatants that entered the battle.
    pub units_deployed: u32,
    /// Own combatants that died.
    pub units_lost: u32,
    /// Enemy combatants killed.
    pub kills: u32,
    /// Damage dealt to enemies.
    pub damage_dealt: u64,
    /// Damage taken from enemies.
    pub damage_taken: u64,
    /// Tick of this player's first resolved attack.
    pub first_attack_tick: Option<u64>,
}

/// Observes tick reports and accumulates [`BattleMetrics`].
///
/// Owners are remembered at spawn time so that damage and kills are
/// attributed correctly after the combatants involved have died.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: BattleMetrics,
    owners: BTreeMap<EntityId, PlayerId>,
}

impl MetricsCollector {
    /// Start collecting for `battle`, recording everything already placed.
    #[must_use]
    pub fn new(scenario: &str, battle: &Battle) -> Self {
        let mut collector = Self {
            metrics: BattleMetrics {
                scenario: scenario.to_string(),
                seed: battle.seed(),
                ..BattleMetrics::default()
            },
            owners: BTreeMap::new(),
        };
        let ids: Vec<EntityId> = battle.world().combatants.iter().map(|c| c.id).collect();
        collector.track_spawns(battle, &ids);
        collector
    }

    /// Fold one tick into the metrics.
    pub fn observe(&mut self, report: &TickReport, battle: &Battle) {
        self.track_spawns(battle, &report.spawned);

        for result in &report.results {
            self.metrics.attacks_resolved += 1;
            let attacker_owner = self.owners.get(&result.attacker).copied();
            if let Some(owner) = attacker_owner {
                let player = self.metrics.players.entry(owner).or_default();
                player.first_attack_tick.get_or_insert(report.tick);
                player.damage_dealt += u64::from(result.total_damage);
            }
            for hit in &result.hits {
                if let Some(&owner) = self.owners.get(&hit.target) {
                    self.metrics.players.entry(owner).or_default().damage_taken +=
                        u64::from(hit.damage);
                }
            }
        }

        for death in &report.deaths {
            self.metrics.players.entry(death.owner).or_default().units_lost += 1;
            if let Some(killer_owner) = death.killer_owner {
                self.metrics.players.entry(killer_owner).or_default().kills += 1;
            }
        }

        self.metrics.orphaned_projectiles += report.orphaned_projectiles as u64;
        self.metrics.peak_deferred_projectiles = self
            .metrics
            .peak_deferred_projectiles
            .max(report.deferred_projectiles);
        self.metrics.faults += report.faults.len() as u32;
    }

    /// Close the metrics with the battle outcome.
    #[must_use]
    pub fn finish(mut self, outcome: &BattleOutcome, battle: &Battle) -> BattleMetrics {
        self.metrics.duration_ticks = outcome.tick + 1;
        self.metrics.winner = outcome.winner;
        self.metrics.reason = Some(outcome.reason);
        self.metrics.crowns.clone_from(&outcome.crowns);
        self.metrics.final_state_hash = battle.state_hash();
        self.metrics
    }

    fn track_spawns(&mut self, battle: &Battle, ids: &[EntityId]) {
        for &id in ids {
            if let Some(combatant) = battle.world().combatants.get(id) {
                self.owners.insert(id, combatant.owner);
                self.metrics
                    .players
                    .entry(combatant.owner)
                    .or_default()
                    .units_deployed += 1;
            }
        }
    }
}

/// Summary statistics across multiple battles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total battles played.
    pub total_battles: u32,
    /// Battles won by each player.
    pub wins_by_player: BTreeMap<PlayerId, u32>,
    /// Win rates by player.
    pub win_rates: BTreeMap<PlayerId, f64>,
    /// Draws, including timeouts with equal crowns.
    pub draws: u32,
    /// Battles decided by the clock.
    pub timeouts: u32,
    /// Average battle duration in ticks.
    pub avg_duration_ticks: f64,
    /// Shortest battle.
    pub min_duration_ticks: u64,
    /// Longest battle.
    pub max_duration_ticks: u64,
    /// Average crowns per battle by player.
    pub avg_crowns: BTreeMap<PlayerId, f64>,
    /// Average damage dealt per battle by player.
    pub avg_damage_dealt: BTreeMap<PlayerId, f64>,
}

impl BatchSummary {
    /// Calculate summary from a list of battle metrics.
    #[must_use]
    pub fn from_battles(battles: &[BattleMetrics]) -> Self {
        if battles.is_empty() {
            return Self::default();
        }

        let count = battles.len() as f64;
        let mut summary = Self {
            total_battles: battles.len() as u32,
            min_duration_ticks: u64::MAX,
            ..Default::default()
        };

        let mut duration_sum = 0u64;
        let mut crowns: BTreeMap<PlayerId, u64> = BTreeMap::new();
        let mut damage: BTreeMap<PlayerId, u64> = BTreeMap::new();

        for battle in battles {
            duration_sum += battle.duration_ticks;
            summary.min_duration_ticks = summary.min_duration_ticks.min(battle.duration_ticks);
            summary.max_duration_ticks = summary.max_duration_ticks.max(battle.duration_ticks);

            match battle.winner {
                Some(winner) => *summary.wins_by_player.entry(winner).or_default() += 1,
                None => summary.draws += 1,
            }
            if battle.reason == Some(OutcomeReason::Timeout) {
                summary.timeouts += 1;
            }

            for (&player, &earned) in &battle.crowns {
                *crowns.entry(player).or_default() += u64::from(earned);
            }
            for (&player, stats) in &battle.players {
                *damage.entry(player).or_default() += stats.damage_dealt;
            }
        }

        summary.avg_duration_ticks = duration_sum as f64 / count;
        for (&player, &wins) in &summary.wins_by_player {
            summary
                .win_rates
                .insert(player, f64::from(wins) / f64::from(summary.total_battles));
        }
        summary.avg_crowns = crowns
            .into_iter()
            .map(|(player, total)| (player, total as f64 / count))
            .collect();
        summary.avg_damage_dealt = damage
            .into_iter()
            .map(|(player, total)| (player, total as f64 / count))
            .collect();

        summary
    }

    /// Check whether every player's win rate is within `threshold` of even.
    #[must_use]
    pub fn is_balanced(&self, threshold: f64) -> bool {
        let players = self.avg_crowns.len().max(2) as f64;
        let even = (1.0 - self.draw_rate()) / players;
        self.win_rates
            .values()
            .all(|rate| (rate - even).abs() <= threshold)
    }

    /// Fraction of battles without a winner.
    #[must_use]
    pub fn draw_rate(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.0;
        }
        f64::from(self.draws) / f64::from(self.total_battles)
    }
}
