//! Fixed-tick battle loop.
//!
//! A [`Battle`] owns everything one match needs: the combatant and
//! projectile registries, one targeting engine, one combat engine and a
//! controller per combatant. Nothing is shared between battles, so separate
//! battles can run on separate threads.
//!
//! # Tick phases
//!
//! 0. spawn deployments due this tick
//! 1. advance projectiles (capped, excess deferred)
//! 2. expire stun and invulnerability
//! 3. update units in id order, resolving their intents immediately
//! 4. orphan projectiles whose target is gone
//! 5. evaluate the outcome
//!
//! # Example
//!
//! ```
//! use arena_core::components::{AttackProfile, Combatant, EntityKind};
//! use arena_core::config::BattleConfig;
//! use arena_core::math::{Fixed, Vec2Fixed};
//! use arena_core::scheduler::Battle;
//!
//! let mut battle = Battle::new(BattleConfig::default(), 7).unwrap();
//! let attack = AttackProfile {
//!     can_attack: true,
//!     range: Fixed::from_num(2),
//!     damage: 100,
//!     ..AttackProfile::default()
//! };
//! battle
//!     .register_combatant(
//!         Combatant::new(1, 0, EntityKind::Unit, Vec2Fixed::from_tiles(0, 0), 500)
//!             .with_attack(attack),
//!     )
//!     .unwrap();
//! battle
//!     .register_combatant(Combatant::new(2, 1, EntityKind::Unit, Vec2Fixed::from_tiles(1, 0), 500))
//!     .unwrap();
//!
//! let report = battle.tick();
//! assert_eq!(report.results[0].total_damage, 100);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::combat::{CombatEngine, CombatResult, DeathEvent};
use crate::components::{Combatant, EntityId, PlayerId, TargetView};
use crate::config::BattleConfig;
use crate::data::{UnitCatalog, UnitStats};
use crate::error::{GameError, Result};
use crate::math::Vec2Fixed;
use crate::projectile::ProjectileTarget;
use crate::registry::BattleWorld;
use crate::setup::BattleSetup;
use crate::targeting::TargetingEngine;
use crate::unit::{CombatInfo, UnitContext, UnitSimulation};

/// Receives every death exactly once, in the order deaths happen.
pub trait DeathListener: Send {
    /// Called once per death.
    fn on_death(&mut self, event: &DeathEvent);
}

impl<F> DeathListener for F
where
    F: FnMut(&DeathEvent) + Send,
{
    fn on_death(&mut self, event: &DeathEvent) {
        self(event);
    }
}

/// Why a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeReason {
    /// A player lost every crown tower.
    AllCrownTowersDestroyed,
    /// The duration limit was reached.
    Timeout,
    /// The battle was cancelled by its host.
    Cancelled,
}

/// Final result of a battle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleOutcome {
    /// Winning player, `None` for a draw or a cancelled battle.
    pub winner: Option<PlayerId>,
    /// Why the battle ended.
    pub reason: OutcomeReason,
    /// Crowns earned per player.
    pub crowns: BTreeMap<PlayerId, u32>,
    /// Tick on which the battle ended.
    pub tick: u64,
}

/// An entity whose update failed this tick and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFault {
    /// Faulting entity.
    pub entity: EntityId,
    /// Error description.
    pub message: String,
}

/// Everything that happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick that was processed.
    pub tick: u64,
    /// Combatants spawned from deployments.
    pub spawned: Vec<EntityId>,
    /// Combat results: projectile impacts first, then unit attacks in id order.
    pub results: Vec<CombatResult>,
    /// Deaths in the order they happened.
    pub deaths: Vec<DeathEvent>,
    /// Due projectiles pushed to the next tick by the cap.
    pub deferred_projectiles: usize,
    /// Projectiles redirected to their last known position.
    pub orphaned_projectiles: usize,
    /// Status effects that expired.
    pub expired_statuses: u32,
    /// Entities skipped because their update failed.
    pub faults: Vec<EntityFault>,
    /// Set once the battle has ended.
    pub outcome: Option<BattleOutcome>,
}

impl TickReport {
    fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Total damage dealt this tick.
    #[must_use]
    pub fn total_damage(&self) -> u64 {
        self.results.iter().map(|r| u64::from(r.total_damage)).sum()
    }
}

/// A deployment waiting for its tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct PendingSpawn {
    tick: u64,
    template: Combatant,
}

/// Serialized form of a battle. Listeners are not part of it.
#[derive(Serialize, Deserialize)]
struct BattleSnapshot {
    config: BattleConfig,
    seed: u64,
    tick: u64,
    world: BattleWorld,
    units: BTreeMap<EntityId, UnitSimulation>,
    targeting: TargetingEngine,
    combat: CombatEngine,
    pending: Vec<PendingSpawn>,
    crowns: BTreeMap<PlayerId, u32>,
    crown_towers: BTreeMap<PlayerId, u32>,
    outcome: Option<BattleOutcome>,
}

/// One battle instance.
pub struct Battle {
    config: BattleConfig,
    seed: u64,
    tick: u64,
    world: BattleWorld,
    units: BTreeMap<EntityId, UnitSimulation>,
    targeting: TargetingEngine,
    combat: CombatEngine,
    /// Sorted by tick, FIFO within a tick.
    pending: Vec<PendingSpawn>,
    crowns: BTreeMap<PlayerId, u32>,
    /// Live crown towers per player.
    crown_towers: BTreeMap<PlayerId, u32>,
    outcome: Option<BattleOutcome>,
    listeners: Vec<Box<dyn DeathListener>>,
}

impl fmt::Debug for Battle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Battle")
            .field("seed", &self.seed)
            .field("tick", &self.tick)
            .field("combatants", &self.world.combatants.len())
            .field("projectiles", &self.world.projectiles.len())
            .field("crowns", &self.crowns)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl Battle {
    /// Create an empty battle. Configuration errors fail here, never mid-tick.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: BattleConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            targeting: TargetingEngine::new(config.targeting.clone()),
            combat: CombatEngine::new(
                config.combat.clone(),
                config.tick_rate,
                config.max_projectile_resolutions_per_tick,
                seed,
            ),
            config,
            seed,
            tick: 0,
            world: BattleWorld::new(),
            units: BTreeMap::new(),
            pending: Vec::new(),
            crowns: BTreeMap::new(),
            crown_towers: BTreeMap::new(),
            outcome: None,
            listeners: Vec::new(),
        })
    }

    /// Build a battle from a setup, resolving every type through `catalog`.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or unknown unit types.
    pub fn from_setup(
        config: BattleConfig,
        catalog: &UnitCatalog,
        setup: &BattleSetup,
        seed: u64,
    ) -> Result<Self> {
        setup.validate(catalog)?;
        let mut battle = Self::new(config, seed)?;
        for player in setup.players() {
            battle.crowns.insert(player, 0);
        }
        for placement in &setup.placements {
            let stats = catalog.get(&placement.unit_type, placement.level)?;
            battle.spawn_unit(stats, placement.owner, placement.position)?;
        }
        for deployment in &setup.deployments {
            let unit = &deployment.unit;
            let stats = catalog.get(&unit.unit_type, unit.level)?;
            battle.schedule_deployment(deployment.tick, stats, unit.owner, unit.position);
        }
        tracing::info!(
            seed,
            combatants = battle.world.combatants.len(),
            deployments = battle.pending.len(),
            "Battle created"
        );
        Ok(battle)
    }

    /// Add a combatant under its own id and give it a controller.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DuplicateEntity`] if the id is taken and
    /// [`GameError::InvalidState`] if the combatant is already dead.
    pub fn register_combatant(&mut self, combatant: Combatant) -> Result<EntityId> {
        if !combatant.is_alive() {
            return Err(GameError::InvalidState(format!(
                "cannot register dead combatant {}",
                combatant.id
            )));
        }
        let owner = combatant.owner;
        let crown_tower = combatant.classification.crown_tower;
        let id = self.world.combatants.insert(combatant)?;
        self.units.insert(id, UnitSimulation::new(id));
        self.crowns.entry(owner).or_insert(0);
        if crown_tower {
            *self.crown_towers.entry(owner).or_insert(0) += 1;
        }
        Ok(id)
    }

    /// Remove a combatant and its controller. Projectiles aimed at it are
    /// orphaned and still detonate at their captured position.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the id is unknown.
    pub fn unregister_combatant(&mut self, id: EntityId) -> Result<Combatant> {
        let combatant = self.world.combatants.remove(id)?;
        self.units.remove(&id);
        if combatant.is_alive() && combatant.classification.crown_tower {
            if let Some(count) = self.crown_towers.get_mut(&combatant.owner) {
                *count = count.saturating_sub(1);
            }
        }
        self.orphan_projectiles();
        Ok(combatant)
    }

    /// Spawn a catalog unit with a fresh id.
    ///
    /// # Errors
    ///
    /// Propagates registration errors.
    pub fn spawn_unit(
        &mut self,
        stats: &UnitStats,
        owner: PlayerId,
        position: Vec2Fixed,
    ) -> Result<EntityId> {
        let id = self.world.combatants.allocate_id();
        self.register_combatant(stats.spawn(id, owner, position))
    }

    /// Queue a catalog unit to enter at `tick`. Ticks already past spawn on
    /// the next processed tick.
    pub fn schedule_deployment(
        &mut self,
        tick: u64,
        stats: &UnitStats,
        owner: PlayerId,
        position: Vec2Fixed,
    ) {
        let index = self.pending.partition_point(|p| p.tick <= tick);
        self.pending.insert(
            index,
            PendingSpawn {
                tick,
                template: stats.spawn(0, owner, position),
            },
        );
    }

    /// Subscribe to death events.
    pub fn add_death_listener(&mut self, listener: impl DeathListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Apply raw damage outside the pipeline. Returns whether it killed.
    ///
    /// Invulnerable combatants are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the id is unknown.
    pub fn take_damage(&mut self, id: EntityId, amount: u32) -> Result<bool> {
        let tick = self.tick;
        let combatant = self
            .world
            .combatants
            .get_mut(id)
            .ok_or(GameError::EntityNotFound(id))?;
        if combatant.status.is_invulnerable(tick) {
            return Ok(false);
        }
        let outcome = combatant.take_damage(amount);
        if outcome.killed {
            let event = DeathEvent {
                entity: id,
                owner: combatant.owner,
                killer: None,
                killer_owner: None,
                tick,
                structure: combatant.is_structure(),
                crown_tower: combatant.classification.crown_tower,
            };
            self.record_death(event, None);
        }
        Ok(outcome.killed)
    }

    /// Position, state, hit points and target of one combatant.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the id is unknown.
    pub fn combat_info(&self, id: EntityId) -> Result<CombatInfo> {
        let combatant = self
            .world
            .combatants
            .get(id)
            .ok_or(GameError::EntityNotFound(id))?;
        let unit = self.units.get(&id).ok_or(GameError::EntityNotFound(id))?;
        Ok(unit.combat_info(combatant))
    }

    /// Process one tick. After the battle has ended this is a no-op that
    /// repeats the outcome.
    pub fn tick(&mut self) -> TickReport {
        let tick = self.tick;
        let mut report = TickReport::new(tick);
        if let Some(outcome) = &self.outcome {
            report.outcome = Some(outcome.clone());
            return report;
        }

        // 0. Deployments
        self.spawn_due(tick, &mut report);

        // 1. Projectiles
        let phase = self.combat.update(tick, &mut self.world);
        report.deferred_projectiles = phase.deferred;
        report.results.extend(phase.results);
        self.dispatch_deaths(&mut report);

        // 2. Status expiry
        for combatant in self.world.combatants.iter_mut() {
            report.expired_statuses += combatant.status.expire(tick);
        }

        // 3. Units
        self.run_units(tick, &mut report);

        // 4. Orphans
        report.orphaned_projectiles = self.orphan_projectiles();

        // 5. Outcome
        self.evaluate_outcome(tick);
        report.outcome.clone_from(&self.outcome);

        #[cfg(feature = "debug-validation")]
        self.check_invariants();

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Battle state hash");
        }

        report
    }

    /// Tick until the battle ends.
    pub fn run_to_end(&mut self) -> BattleOutcome {
        loop {
            if let Some(outcome) = self.tick().outcome {
                return outcome;
            }
        }
    }

    /// End the battle now. Has no effect once an outcome exists.
    pub fn cancel(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        tracing::info!(tick = self.tick, "Battle cancelled");
        self.outcome = Some(BattleOutcome {
            winner: None,
            reason: OutcomeReason::Cancelled,
            crowns: self.crowns.clone(),
            tick: self.tick,
        });
    }

    fn spawn_due(&mut self, tick: u64, report: &mut TickReport) {
        let due = self.pending.partition_point(|p| p.tick <= tick);
        let spawns: Vec<PendingSpawn> = self.pending.drain(..due).collect();
        for spawn in spawns {
            let mut combatant = spawn.template;
            combatant.id = self.world.combatants.allocate_id();
            match self.register_combatant(combatant) {
                Ok(id) => report.spawned.push(id),
                Err(err) => {
                    tracing::warn!(tick, error = %err, "Deployment failed");
                    report.faults.push(EntityFault {
                        entity: 0,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn run_units(&mut self, tick: u64, report: &mut TickReport) {
        let tick_ms = self.config.tick_duration_ms();
        let mut views = self.world.combatants.views();
        let ids: Vec<EntityId> = self.units.keys().copied().collect();

        for id in ids {
            let Some(unit) = self.units.get_mut(&id) else {
                continue;
            };
            if unit.is_dead() {
                continue;
            }
            let Some(combatant) = self.world.combatants.get_mut(id) else {
                tracing::warn!(entity = id, tick, "Controller without combatant");
                report.faults.push(EntityFault {
                    entity: id,
                    message: GameError::EntityNotFound(id).to_string(),
                });
                continue;
            };

            let mut ctx = UnitContext {
                targeting: &mut self.targeting,
                candidates: &views,
            };
            let intent = match unit.update(combatant, &mut ctx, tick, tick_ms) {
                Ok(intent) => intent,
                Err(err) => {
                    tracing::warn!(entity = id, tick, error = %err, "Unit update failed, skipping");
                    report.faults.push(EntityFault {
                        entity: id,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            refresh_view(&mut views, combatant.view());

            let Some(intent) = intent else {
                continue;
            };
            if let Some(result) = self.combat.resolve_attack(&intent, &mut self.world, tick) {
                let touched = result
                    .hits
                    .iter()
                    .map(|h| h.target)
                    .chain(result.knocked_back.iter().copied())
                    .chain(std::iter::once(result.attacker));
                for touched_id in touched {
                    if let Some(c) = self.world.combatants.get(touched_id) {
                        refresh_view(&mut views, c.view());
                    }
                }
                report.results.push(result);
            }
            self.dispatch_deaths(report);
        }
    }

    /// Redirect projectiles whose target is dead or gone.
    fn orphan_projectiles(&mut self) -> usize {
        let combatants = &self.world.combatants;
        let mut orphaned = 0;
        for projectile in self.world.projectiles.iter_mut() {
            if let ProjectileTarget::Entity(target) = projectile.target {
                if !combatants.is_alive(target) {
                    projectile.orphan();
                    orphaned += 1;
                    tracing::trace!(projectile = projectile.id, target, "Projectile orphaned");
                }
            }
        }
        orphaned
    }

    fn dispatch_deaths(&mut self, report: &mut TickReport) {
        for event in self.combat.take_deaths() {
            self.record_death(event, Some(report));
        }
    }

    fn record_death(&mut self, event: DeathEvent, report: Option<&mut TickReport>) {
        tracing::debug!(
            entity = event.entity,
            owner = event.owner,
            killer = ?event.killer,
            tick = event.tick,
            "Combatant died"
        );
        if event.crown_tower {
            if let Some(count) = self.crown_towers.get_mut(&event.owner) {
                *count = count.saturating_sub(1);
            }
            match event.killer_owner.filter(|&p| p != event.owner) {
                Some(player) => *self.crowns.entry(player).or_insert(0) += 1,
                None => {
                    for (player, crowns) in &mut self.crowns {
                        if *player != event.owner {
                            *crowns += 1;
                        }
                    }
                }
            }
            tracing::info!(tower = event.entity, owner = event.owner, crowns = ?self.crowns, "Crown tower destroyed");
        }
        for listener in &mut self.listeners {
            listener.on_death(&event);
        }
        if let Some(report) = report {
            report.deaths.push(event);
        }
    }

    fn evaluate_outcome(&mut self, tick: u64) {
        if self.outcome.is_some() {
            return;
        }
        let defeated: Vec<PlayerId> = self
            .crown_towers
            .iter()
            .filter(|&(_, &remaining)| remaining == 0)
            .map(|(&player, _)| player)
            .collect();

        let (winner, reason) = if !defeated.is_empty() {
            let mut standing = self.crowns.keys().filter(|p| !defeated.contains(p));
            let winner = match (standing.next(), standing.next()) {
                (Some(&player), None) => Some(player),
                _ => None,
            };
            (winner, OutcomeReason::AllCrownTowersDestroyed)
        } else if tick + 1 >= self.config.max_duration_ticks {
            (self.crown_leader(), OutcomeReason::Timeout)
        } else {
            return;
        };

        tracing::info!(tick, winner = ?winner, reason = ?reason, crowns = ?self.crowns, "Battle finished");
        self.outcome = Some(BattleOutcome {
            winner,
            reason,
            crowns: self.crowns.clone(),
            tick,
        });
    }

    #[cfg(feature = "debug-validation")]
    fn check_invariants(&self) {
        for combatant in self.world.combatants.iter() {
            debug_assert!(
                combatant.vitals.hp <= combatant.vitals.max_hp,
                "combatant {} above max hp",
                combatant.id
            );
            debug_assert!(
                combatant.is_alive() || combatant.vitals.hp == 0,
                "dead combatant {} has hit points",
                combatant.id
            );
        }
        for projectile in self.world.projectiles.iter() {
            debug_assert!(projectile.expected_hit_tick >= projectile.launch_tick);
        }
    }

    /// Player with strictly the most crowns, if any.
    fn crown_leader(&self) -> Option<PlayerId> {
        let best = self.crowns.values().copied().max()?;
        let mut leaders = self.crowns.iter().filter(|&(_, &c)| c == best);
        match (leaders.next(), leaders.next()) {
            (Some((&player, _)), None) => Some(player),
            _ => None,
        }
    }

    /// Outcome, once the battle has ended.
    #[must_use]
    pub fn outcome(&self) -> Option<&BattleOutcome> {
        self.outcome.as_ref()
    }

    /// Whether the battle has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Next tick to be processed.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Seed the battle was created with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Read-only world view.
    #[must_use]
    pub fn world(&self) -> &BattleWorld {
        &self.world
    }

    /// Crowns earned so far.
    #[must_use]
    pub fn crowns(&self) -> &BTreeMap<PlayerId, u32> {
        &self.crowns
    }

    /// Deployments not yet spawned.
    #[must_use]
    pub fn pending_deployments(&self) -> usize {
        self.pending.len()
    }

    /// Hash of all simulation state. Equal states hash equally across runs
    /// and machines.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.world.hash(&mut hasher);
        self.units.hash(&mut hasher);
        self.targeting.hash_state(&mut hasher);
        self.combat.hash_state(&mut hasher);
        self.pending.hash(&mut hasher);
        self.crowns.hash(&mut hasher);
        self.crown_towers.hash(&mut hasher);
        self.outcome.hash(&mut hasher);
        hasher.finish()
    }

    /// Compare against a hash computed elsewhere for the same tick.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DesyncDetected`] on mismatch.
    pub fn verify_hash(&self, remote_hash: u64) -> Result<()> {
        let local_hash = self.state_hash();
        if local_hash == remote_hash {
            return Ok(());
        }
        Err(GameError::DesyncDetected {
            tick: self.tick,
            local_hash,
            remote_hash,
        })
    }

    /// Serialize the battle. Death listeners are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = BattleSnapshot {
            config: self.config.clone(),
            seed: self.seed,
            tick: self.tick,
            world: self.world.clone(),
            units: self.units.clone(),
            targeting: self.targeting.clone(),
            combat: self.combat.clone(),
            pending: self.pending.clone(),
            crowns: self.crowns.clone(),
            crown_towers: self.crown_towers.clone(),
            outcome: self.outcome.clone(),
        };
        bincode::serialize(&snapshot)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize battle: {e}")))
    }

    /// Rebuild a battle from [`Battle::snapshot`] bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode or the embedded
    /// configuration is invalid.
    pub fn restore(data: &[u8]) -> Result<Self> {
        let snapshot: BattleSnapshot = bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize battle: {e}")))?;
        snapshot.config.validate()?;

        let mut targeting = snapshot.targeting;
        targeting.set_config(snapshot.config.targeting.clone());
        let mut combat = snapshot.combat;
        combat.set_config(
            snapshot.config.combat.clone(),
            snapshot.config.tick_rate,
            snapshot.config.max_projectile_resolutions_per_tick,
        );

        Ok(Self {
            config: snapshot.config,
            seed: snapshot.seed,
            tick: snapshot.tick,
            world: snapshot.world,
            units: snapshot.units,
            targeting,
            combat,
            pending: snapshot.pending,
            crowns: snapshot.crowns,
            crown_towers: snapshot.crown_towers,
            outcome: snapshot.outcome,
            listeners: Vec::new(),
        })
    }
}

/// Replace the view with the same id in an id-sorted slice.
fn refresh_view(views: &mut [TargetView], view: TargetView) {
    if let Ok(index) = views.binary_search_by_key(&view.id, |v| v.id) {
        views[index] = view;
    }
}
